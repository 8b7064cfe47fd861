//! Environment-driven configuration.

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;

/// Application configuration, sourced from the process environment.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Shared bearer token guarding every non-health route.
    pub sandbox_secret: String,
    /// HTTP control-plane port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// External TCP proxy port.
    #[serde(default = "default_proxy_port")]
    pub proxy_port: u16,
}

fn default_port() -> u16 {
    3030
}

fn default_proxy_port() -> u16 {
    3031
}

/// Load configuration from the environment.
///
/// `SANDBOX_SECRET` is required; `PORT` and `PROXY_PORT` fall back to their
/// defaults when unset.
pub fn load_config() -> Result<AppConfig> {
    let config = Config::builder()
        .add_source(Environment::default().try_parsing(true))
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to load configuration (is SANDBOX_SECRET set?)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_defaults_apply() {
        let config: AppConfig =
            serde_json::from_value(serde_json::json!({"sandbox_secret": "s3cret"})).unwrap();
        assert_eq!(config.sandbox_secret, "s3cret");
        assert_eq!(config.port, 3030);
        assert_eq!(config.proxy_port, 3031);
    }

    #[test]
    fn test_explicit_ports_override_defaults() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "sandbox_secret": "s3cret",
            "port": 8080,
            "proxy_port": 8081,
        }))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.proxy_port, 8081);
    }

    #[test]
    fn test_missing_secret_is_rejected() {
        let result = serde_json::from_value::<AppConfig>(serde_json::json!({}));
        assert!(result.is_err());
    }
}
