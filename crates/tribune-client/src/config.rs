use std::time::Duration;

use serde::Deserialize;
use tribune_core::error::{Result, RelayError};
use url::Url;

use crate::backoff::Backoff;

/// Client-side connection policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// WebSocket endpoint, e.g. `ws://relay.local:8080/v1/ws`. The session
    /// token is appended as a form-encoded `token` query pair.
    pub url: String,

    #[serde(default = "default_backoff_floor_ms")]
    pub backoff_floor_ms: u64,

    #[serde(default = "default_backoff_ceiling_ms")]
    pub backoff_ceiling_ms: u64,

    /// Consecutive failed attempts before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            backoff_floor_ms: default_backoff_floor_ms(),
            backoff_ceiling_ms: default_backoff_ceiling_ms(),
            max_attempts: default_max_attempts(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.endpoint()?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(RelayError::BadRequest("client.url must be ws:// or wss://".into()));
        }
        if self.backoff_floor_ms == 0 {
            return Err(RelayError::BadRequest("client.backoff_floor_ms must be > 0".into()));
        }
        if self.backoff_ceiling_ms < self.backoff_floor_ms {
            return Err(RelayError::BadRequest(
                "client.backoff_ceiling_ms must be >= backoff_floor_ms".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(RelayError::BadRequest("client.max_attempts must be >= 1".into()));
        }
        if self.connect_timeout_ms == 0 {
            return Err(RelayError::BadRequest("client.connect_timeout_ms must be > 0".into()));
        }
        Ok(())
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.backoff_floor_ms),
            Duration::from_millis(self.backoff_ceiling_ms),
        )
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Endpoint with the token attached as a query parameter.
    pub(crate) fn url_with_token(&self, token: &str) -> Result<String> {
        let mut url = self.endpoint()?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url.into())
    }

    fn endpoint(&self) -> Result<Url> {
        Url::parse(&self.url).map_err(|e| RelayError::BadRequest(format!("client.url is invalid: {e}")))
    }
}

fn default_backoff_floor_ms() -> u64 {
    1000
}
fn default_backoff_ceiling_ms() -> u64 {
    30_000
}
fn default_max_attempts() -> u32 {
    10
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_appended_as_query() {
        let c = ClientConfig::new("ws://h/v1/ws");
        assert_eq!(c.url_with_token("abc").unwrap(), "ws://h/v1/ws?token=abc");

        let c = ClientConfig::new("ws://h/v1/ws?v=1");
        assert_eq!(c.url_with_token("abc").unwrap(), "ws://h/v1/ws?v=1&token=abc");
    }

    #[test]
    fn token_is_form_encoded() {
        let c = ClientConfig::new("ws://h/v1/ws");
        assert_eq!(c.url_with_token("a&b c+#").unwrap(), "ws://h/v1/ws?token=a%26b+c%2B%23");
    }

    #[test]
    fn yaml_fills_defaults() {
        let c: ClientConfig = serde_yaml::from_str("url: ws://h/v1/ws\nmax_attempts: 3\n").unwrap();
        assert_eq!(c.max_attempts, 3);
        assert_eq!(c.backoff_floor_ms, 1000);
        assert_eq!(c.backoff_ceiling_ms, 30_000);
        assert!(c.validate().is_ok());

        assert!(serde_yaml::from_str::<ClientConfig>("url: ws://h\nretries: 3\n").is_err());
    }

    #[test]
    fn rejects_inverted_backoff() {
        let mut c = ClientConfig::new("ws://h/v1/ws");
        c.backoff_ceiling_ms = 10;
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_http_url() {
        assert!(ClientConfig::new("http://h/v1/ws").validate().is_err());
        assert!(ClientConfig::new("ws://").validate().is_err());
    }
}
