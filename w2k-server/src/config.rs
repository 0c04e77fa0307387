//! Server configuration read from the environment

use anyhow::{bail, Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use w2k_core::SmtpSettings;

/// Default SMTP relay port
pub const DEFAULT_SMTP_PORT: u16 = 25;

/// Allowed CORS origins
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
    /// Any origin (`*`)
    Any,
    /// An explicit list of origins
    List(Vec<String>),
    /// Localhost origins used during development
    Localhost,
}

/// Where packaged books are sent once an export finishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryConfig {
    /// Multipart upload to a webhook (`W2K_WEBHOOK_URL`)
    Webhook { url: String },

    /// Mail through an SMTP relay (`W2K_SMTP_*`, `W2K_SEND_TO`)
    Smtp(SmtpSettings),
}

/// Server settings
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to listen on (`W2K_BIND`)
    pub bind: SocketAddr,

    /// Data directory for the catalog, chapters and exports (`W2K_STORAGE_PATH`)
    pub storage_path: PathBuf,

    /// Bearer token required on mutating routes (`W2K_API_TOKEN`).
    /// When unset, mutating routes are open.
    pub api_token: Option<String>,

    /// CORS policy (`W2K_CORS_ORIGINS`)
    pub cors_origins: CorsOrigins,

    /// Maximum request body size in bytes (`W2K_BODY_LIMIT`)
    pub body_limit: usize,

    /// Per-request timeout (`W2K_REQUEST_TIMEOUT_SECS`)
    pub request_timeout: Duration,

    /// Delivery of finished exports; None keeps them download-only
    pub delivery: Option<DeliveryConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            storage_path: PathBuf::from("./w2k_data"),
            api_token: None,
            cors_origins: CorsOrigins::Localhost,
            body_limit: 5 * 1024 * 1024,
            request_timeout: Duration::from_secs(5),
            delivery: None,
        }
    }
}

impl Config {
    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(bind) = lookup("W2K_BIND") {
            config.bind = bind
                .parse()
                .with_context(|| format!("W2K_BIND is not a socket address: {}", bind))?;
        }
        if let Some(path) = lookup("W2K_STORAGE_PATH") {
            config.storage_path = PathBuf::from(path);
        }
        config.api_token = lookup("W2K_API_TOKEN").filter(|t| !t.trim().is_empty());
        if let Some(origins) = lookup("W2K_CORS_ORIGINS") {
            config.cors_origins = parse_origins(&origins);
        }
        if let Some(limit) = lookup("W2K_BODY_LIMIT") {
            config.body_limit = limit
                .parse()
                .with_context(|| format!("W2K_BODY_LIMIT must be a number of bytes: {}", limit))?;
        }
        if let Some(secs) = lookup("W2K_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .with_context(|| format!("W2K_REQUEST_TIMEOUT_SECS must be a number: {}", secs))?;
            config.request_timeout = Duration::from_secs(secs);
        }
        config.delivery = delivery_from_lookup(&lookup)?;

        Ok(config)
    }
}

fn delivery_from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Option<DeliveryConfig>> {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
    let webhook = get("W2K_WEBHOOK_URL");
    let server = get("W2K_SMTP_SERVER");

    match (webhook, server) {
        (Some(_), Some(_)) => bail!("Set either W2K_WEBHOOK_URL or W2K_SMTP_SERVER, not both"),
        (Some(url), None) => Ok(Some(DeliveryConfig::Webhook { url })),
        (None, Some(server)) => {
            let require = |key: &str| {
                get(key).with_context(|| format!("{} must be set when W2K_SMTP_SERVER is", key))
            };
            let port = match get("W2K_SMTP_PORT") {
                Some(port) => port
                    .parse()
                    .with_context(|| format!("W2K_SMTP_PORT must be a port number: {}", port))?,
                None => DEFAULT_SMTP_PORT,
            };
            let username = require("W2K_SMTP_USER")?;
            Ok(Some(DeliveryConfig::Smtp(SmtpSettings {
                server,
                port,
                password: require("W2K_SMTP_PASSWORD")?,
                send_to: require("W2K_SEND_TO")?,
                from: get("W2K_SMTP_FROM").unwrap_or_else(|| username.clone()),
                username,
            })))
        }
        (None, None) => Ok(None),
    }
}

fn parse_origins(value: &str) -> CorsOrigins {
    if value.trim() == "*" {
        return CorsOrigins::Any;
    }
    let origins: Vec<String> = value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if origins.is_empty() {
        CorsOrigins::Localhost
    } else {
        CorsOrigins::List(origins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind.port(), 3000);
        assert_eq!(config.body_limit, 5_242_880);
        assert!(config.api_token.is_none());
        assert_eq!(config.cors_origins, CorsOrigins::Localhost);
        assert!(config.delivery.is_none());
    }

    #[test]
    fn test_webhook_delivery() {
        let config =
            Config::from_lookup(lookup(&[("W2K_WEBHOOK_URL", "https://discord.example/hook")]))
                .unwrap();
        assert_eq!(
            config.delivery,
            Some(DeliveryConfig::Webhook {
                url: "https://discord.example/hook".to_string()
            })
        );
    }

    #[test]
    fn test_smtp_delivery() {
        let config = Config::from_lookup(lookup(&[
            ("W2K_SMTP_SERVER", "smtp.example.com"),
            ("W2K_SMTP_USER", "reader@example.com"),
            ("W2K_SMTP_PASSWORD", "hunter2"),
            ("W2K_SEND_TO", "reader@kindle.com"),
        ]))
        .unwrap();

        match config.delivery {
            Some(DeliveryConfig::Smtp(settings)) => {
                assert_eq!(settings.port, DEFAULT_SMTP_PORT);
                assert_eq!(settings.from, "reader@example.com");
                assert_eq!(settings.send_to, "reader@kindle.com");
            }
            other => panic!("unexpected delivery {:?}", other),
        }
    }

    #[test]
    fn test_incomplete_or_conflicting_delivery() {
        let missing_recipient = Config::from_lookup(lookup(&[
            ("W2K_SMTP_SERVER", "smtp.example.com"),
            ("W2K_SMTP_USER", "reader"),
            ("W2K_SMTP_PASSWORD", "hunter2"),
        ]));
        assert!(missing_recipient.unwrap_err().to_string().contains("W2K_SEND_TO"));

        assert!(Config::from_lookup(lookup(&[
            ("W2K_WEBHOOK_URL", "https://discord.example/hook"),
            ("W2K_SMTP_SERVER", "smtp.example.com"),
        ]))
        .is_err());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("W2K_BIND", "0.0.0.0:8080"),
            ("W2K_STORAGE_PATH", "/var/lib/w2k"),
            ("W2K_API_TOKEN", "secret"),
            ("W2K_CORS_ORIGINS", "https://a.example, https://www.wuxiaworld.com"),
            ("W2K_REQUEST_TIMEOUT_SECS", "30"),
        ]))
        .unwrap();

        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.storage_path, PathBuf::from("/var/lib/w2k"));
        assert_eq!(config.api_token.as_deref(), Some("secret"));
        assert_eq!(
            config.cors_origins,
            CorsOrigins::List(vec![
                "https://a.example".to_string(),
                "https://www.wuxiaworld.com".to_string()
            ])
        );
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_blank_token_disables_auth() {
        let config = Config::from_lookup(lookup(&[("W2K_API_TOKEN", "  ")])).unwrap();
        assert!(config.api_token.is_none());
    }

    #[test]
    fn test_invalid_values() {
        assert!(Config::from_lookup(lookup(&[("W2K_BIND", "nope")])).is_err());
        assert!(Config::from_lookup(lookup(&[("W2K_BODY_LIMIT", "lots")])).is_err());
        assert_eq!(parse_origins("*"), CorsOrigins::Any);
    }
}
