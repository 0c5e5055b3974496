//! Application configuration loading from config.toml
//!
//! Settings are read from a TOML file and then overridden from the environment, so
//! deployments can keep secrets out of the file. A missing file is not an error:
//! every field has a development default.

use crate::config::database::DEFAULT_DATABASE_URL;
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info, warn};

/// Environment variable naming the config file to read
pub const CONFIG_PATH_ENV: &str = "STAR_EVENTS_CONFIG";

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SeaORM connection string
    pub database_url: String,
    /// Socket address the HTTP server listens on
    pub bind_addr: String,
    /// Browser origins allowed by CORS; any origin when empty
    pub cors_origins: Vec<String>,
    /// QR code signing settings
    pub qr: QrConfig,
    /// Hosted checkout settings
    pub checkout: CheckoutConfig,
}

/// QR code signing settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QrConfig {
    /// Secret for the HMAC appended to scannable codes; unsigned codes if None
    pub signing_secret: Option<String>,
    /// Reject codes without a signature (turn on once legacy prints are gone)
    pub require_signature: bool,
}

/// Hosted checkout settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckoutConfig {
    /// Page of the payment provider customers are redirected to
    pub provider_url: String,
    /// Where the provider sends the customer back after paying
    pub return_url: String,
    /// Secret shared with the provider to sign intents and callbacks
    pub secret: String,
    /// Method label stored on payments created through checkout
    pub payment_method: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            bind_addr: "0.0.0.0:3001".to_string(),
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
            qr: QrConfig::default(),
            checkout: CheckoutConfig::default(),
        }
    }
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            provider_url: "https://checkout.example.com/pay".to_string(),
            return_url: "http://localhost:3001/api/checkout/callback".to_string(),
            secret: "dev-checkout-secret".to_string(),
            payment_method: "Card".to_string(),
        }
    }
}

impl AppConfig {
    /// Replaces file values with environment values where `lookup` has one.
    ///
    /// Recognised keys: `DATABASE_URL`, `BIND_ADDR`, `QR_SIGNING_SECRET`,
    /// `CHECKOUT_SECRET`, `CORS_ALLOWED_ORIGINS` (comma separated).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(addr) = lookup("BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(secret) = lookup("QR_SIGNING_SECRET") {
            self.qr.signing_secret = Some(secret);
        }
        if let Some(secret) = lookup("CHECKOUT_SECRET") {
            self.checkout.secret = secret;
        }
        if let Some(origins) = lookup("CORS_ALLOWED_ORIGINS") {
            self.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(ToString::to_string)
                .collect();
        }
    }
}

/// Loads configuration from a TOML file
///
/// # Errors
/// Returns an error if the file cannot be read or the TOML is invalid.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })
}

/// Loads the file named by `STAR_EVENTS_CONFIG` (or `./config.toml`), falls back to
/// defaults when it does not exist, then applies environment overrides.
pub fn load_app_configuration() -> Result<AppConfig> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.toml".to_string());

    let mut config = if Path::new(&path).exists() {
        debug!("Loading configuration from {}", path);
        load_config(&path)?
    } else {
        warn!("Config file {} not found, using defaults", path);
        AppConfig::default()
    };

    config.apply_overrides(|key| std::env::var(key).ok());

    info!("Configuration loaded (bind address {})", config.bind_addr);
    Ok(config)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_app_config() {
        let toml_str = r#"
            database_url = "sqlite::memory:"
            bind_addr = "127.0.0.1:8080"

            [qr]
            signing_secret = "s3cret"
            require_signature = true

            [checkout]
            provider_url = "https://pay.example.org/checkout"
            secret = "shared"
        "#;

        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.qr.signing_secret.as_deref(), Some("s3cret"));
        assert!(config.qr.require_signature);
        assert_eq!(config.checkout.provider_url, "https://pay.example.org/checkout");
        assert_eq!(config.checkout.secret, "shared");
        // Unset fields keep their defaults
        assert_eq!(config.checkout.payment_method, "Card");
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert!(config.qr.signing_secret.is_none());
        assert!(!config.qr.require_signature);
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = AppConfig::default();
        config.apply_overrides(|key| match key {
            "DATABASE_URL" => Some("sqlite::memory:".to_string()),
            "QR_SIGNING_SECRET" => Some("from-env".to_string()),
            "CORS_ALLOWED_ORIGINS" => Some("https://a.example, ,https://b.example".to_string()),
            _ => None,
        });

        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.qr.signing_secret.as_deref(), Some("from-env"));
        assert_eq!(config.bind_addr, "0.0.0.0:3001");
        assert_eq!(config.cors_origins, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("/nonexistent/star-events/config.toml");
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
