use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use tribune_core::error::{Result, RelayError};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub relay: RelaySection,

    pub auth: AuthSection,

    #[serde(default)]
    pub directory: DirectorySection,

    #[serde(default)]
    pub internal: InternalSection,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(RelayError::UnsupportedVersion);
        }

        self.gateway.validate()?;
        self.relay.validate()?;
        self.auth.validate()?;
        self.directory.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Per-connection outbound queue depth.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,

    /// How long fan-out waits on a full queue before evicting the connection.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            ping_interval_ms: default_ping_interval_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            outbound_queue: default_outbound_queue(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        if !(5000..=120000).contains(&self.ping_interval_ms) {
            return Err(RelayError::BadRequest(
                "gateway.ping_interval_ms must be between 5000 and 120000".into(),
            ));
        }
        if !(10000..=600000).contains(&self.idle_timeout_ms) {
            return Err(RelayError::BadRequest(
                "gateway.idle_timeout_ms must be between 10000 and 600000".into(),
            ));
        }
        if self.idle_timeout_ms <= self.ping_interval_ms {
            return Err(RelayError::BadRequest(
                "gateway.idle_timeout_ms must be greater than ping_interval_ms".into(),
            ));
        }
        if self.outbound_queue == 0 {
            return Err(RelayError::BadRequest("gateway.outbound_queue must be >= 1".into()));
        }
        if self.write_timeout_ms == 0 {
            return Err(RelayError::BadRequest("gateway.write_timeout_ms must be >= 1".into()));
        }
        Ok(())
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_ping_interval_ms() -> u64 {
    20000
}
fn default_idle_timeout_ms() -> u64 {
    60000
}
fn default_outbound_queue() -> usize {
    256
}
fn default_write_timeout_ms() -> u64 {
    1500
}

/// Whether the sender receives its own fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EchoPolicy {
    /// Every member connection, including the originating one.
    #[default]
    All,
    /// Every connection except the one the envelope arrived on.
    ExceptOrigin,
    /// None of the sender's connections (other tabs included).
    ExceptPrincipal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelaySection {
    #[serde(default)]
    pub echo: EchoPolicy,

    #[serde(default = "default_typing_timeout_ms")]
    pub typing_timeout_ms: u64,

    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    #[serde(default = "default_inbound_rps")]
    pub inbound_rps: u32,

    #[serde(default = "default_inbound_burst")]
    pub inbound_burst: u32,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            echo: EchoPolicy::default(),
            typing_timeout_ms: default_typing_timeout_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            max_frame_bytes: default_max_frame_bytes(),
            inbound_rps: default_inbound_rps(),
            inbound_burst: default_inbound_burst(),
        }
    }
}

impl RelaySection {
    pub fn validate(&self) -> Result<()> {
        if !(100..=60000).contains(&self.typing_timeout_ms) {
            return Err(RelayError::BadRequest(
                "relay.typing_timeout_ms must be between 100 and 60000".into(),
            ));
        }
        if !(10..=self.typing_timeout_ms).contains(&self.sweep_interval_ms) {
            return Err(RelayError::BadRequest(
                "relay.sweep_interval_ms must be between 10 and typing_timeout_ms".into(),
            ));
        }
        if self.max_frame_bytes < 64 {
            return Err(RelayError::BadRequest("relay.max_frame_bytes must be >= 64".into()));
        }
        if self.inbound_rps == 0 || self.inbound_burst == 0 {
            return Err(RelayError::BadRequest(
                "relay.inbound_rps and relay.inbound_burst must be >= 1".into(),
            ));
        }
        Ok(())
    }

    pub fn typing_timeout(&self) -> Duration {
        Duration::from_millis(self.typing_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

fn default_typing_timeout_ms() -> u64 {
    3000
}
fn default_sweep_interval_ms() -> u64 {
    500
}
fn default_max_frame_bytes() -> usize {
    8192
}
fn default_inbound_rps() -> u32 {
    20
}
fn default_inbound_burst() -> u32 {
    40
}

/// How handshake tokens are turned into principals.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case", deny_unknown_fields)]
pub enum AuthSection {
    /// HS256 JWT; the `sub` claim is the principal.
    Jwt {
        secret: String,
        #[serde(default)]
        issuer: Option<String>,
    },
    /// Fixed token -> principal table (development only).
    Static { tokens: HashMap<String, String> },
}

impl AuthSection {
    pub fn validate(&self) -> Result<()> {
        match self {
            AuthSection::Jwt { secret, .. } if secret.len() < 16 => Err(RelayError::BadRequest(
                "auth.secret must be at least 16 bytes".into(),
            )),
            AuthSection::Static { tokens } if tokens.is_empty() => {
                Err(RelayError::BadRequest("auth.tokens must not be empty".into()))
            }
            _ => Ok(()),
        }
    }
}

/// Where conversation membership and read receipts live.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case", deny_unknown_fields)]
pub enum DirectorySection {
    /// In-process table, seeded from config.
    Memory {
        #[serde(default)]
        conversations: HashMap<String, Vec<String>>,
    },
    /// The CMS REST API.
    Http {
        base_url: String,
        #[serde(default)]
        service_token: Option<String>,
        #[serde(default = "default_http_timeout_ms")]
        timeout_ms: u64,
    },
}

impl Default for DirectorySection {
    fn default() -> Self {
        DirectorySection::Memory {
            conversations: HashMap::new(),
        }
    }
}

impl DirectorySection {
    pub fn validate(&self) -> Result<()> {
        if let DirectorySection::Http { base_url, timeout_ms, .. } = self {
            if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
                return Err(RelayError::BadRequest(
                    "directory.base_url must be an http(s) URL".into(),
                ));
            }
            if *timeout_ms == 0 {
                return Err(RelayError::BadRequest("directory.timeout_ms must be >= 1".into()));
            }
        }
        Ok(())
    }
}

fn default_http_timeout_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InternalSection {
    /// Bearer token for the internal publish endpoint; unset disables it.
    #[serde(default)]
    pub publish_token: Option<String>,
}
