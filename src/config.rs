//! Runtime configuration from the environment
//!
//! | Variable            | Default                        |
//! |---------------------|--------------------------------|
//! | `BIND_ADDRESS`      | `0.0.0.0`                      |
//! | `WEBHOOK_PORT`      | `8443`                         |
//! | `HEALTH_PORT`       | `8080`                         |
//! | `WEBHOOK_CERT_PATH` | `/etc/webhook/certs/tls.crt`   |
//! | `WEBHOOK_KEY_PATH`  | `/etc/webhook/certs/tls.key`   |
//! | `ADMISSION_PATH`    | `/admission`                   |

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use thiserror::Error;

/// Default path to webhook TLS certificate
pub const WEBHOOK_CERT_PATH: &str = "/etc/webhook/certs/tls.crt";
/// Default path to webhook TLS private key
pub const WEBHOOK_KEY_PATH: &str = "/etc/webhook/certs/tls.key";
/// Default webhook server port
pub const WEBHOOK_PORT: u16 = 8443;
/// Default health/metrics port
pub const HEALTH_PORT: u16 = 8080;
/// Default route for AdmissionReview POSTs
pub const ADMISSION_PATH: &str = "/admission";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid port in {var}: '{value}'")]
    InvalidPort { var: &'static str, value: String },

    #[error("Invalid address in {var}: '{value}'")]
    InvalidAddress { var: &'static str, value: String },

    #[error("Invalid admission path '{0}': must start with '/'")]
    InvalidAdmissionPath(String),
}

/// Webhook listener settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub bind_address: IpAddr,
    pub port: u16,
    pub health_port: u16,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub admission_path: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: WEBHOOK_PORT,
            health_port: HEALTH_PORT,
            cert_path: PathBuf::from(WEBHOOK_CERT_PATH),
            key_path: PathBuf::from(WEBHOOK_KEY_PATH),
            admission_path: ADMISSION_PATH.to_string(),
        }
    }
}

impl WebhookConfig {
    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value
    /// if set. Unset variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("BIND_ADDRESS") {
            config.bind_address = value.parse().map_err(|_| ConfigError::InvalidAddress {
                var: "BIND_ADDRESS",
                value,
            })?;
        }
        if let Some(value) = lookup("WEBHOOK_PORT") {
            config.port = parse_port("WEBHOOK_PORT", value)?;
        }
        if let Some(value) = lookup("HEALTH_PORT") {
            config.health_port = parse_port("HEALTH_PORT", value)?;
        }
        if let Some(value) = lookup("WEBHOOK_CERT_PATH") {
            config.cert_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("WEBHOOK_KEY_PATH") {
            config.key_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("ADMISSION_PATH") {
            if !value.starts_with('/') {
                return Err(ConfigError::InvalidAdmissionPath(value));
            }
            config.admission_path = value;
        }

        Ok(config)
    }

    /// TLS is served only when both the certificate and key exist
    pub fn tls_enabled(&self) -> bool {
        self.cert_path.exists() && self.key_path.exists()
    }

    pub fn webhook_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn health_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.health_port)
    }
}

fn parse_port(var: &'static str, value: String) -> Result<u16, ConfigError> {
    match value.parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ConfigError::InvalidPort { var, value }),
    }
}
