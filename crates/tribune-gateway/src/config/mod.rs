//! Gateway config loader (strict parsing).

pub mod schema;

use std::fs;

use tribune_core::error::{Result, RelayError};

pub use schema::{
    AuthSection, DirectorySection, EchoPolicy, GatewayConfig, GatewaySection, InternalSection,
    RelaySection,
};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "TRIBUNE_CONFIG";

/// Default config path when `TRIBUNE_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "tribune.yaml";

pub fn load_from_env() -> Result<GatewayConfig> {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_from_file(&path)
}

pub fn load_from_file(path: &str) -> Result<GatewayConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| RelayError::Internal(format!("read config {path} failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<GatewayConfig> {
    let cfg: GatewayConfig = serde_yaml::from_str(s)
        .map_err(|e| RelayError::BadRequest(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
