//! Registry configuration.
//!
//! Settings come from an optional YAML file and are then overridden by
//! command-line flags and environment variables (see the `svcreg` binary).
//! Every field has a default, so an empty file is a valid configuration.
//!
//! Validation only rejects settings the server cannot start with. TLS
//! material is deliberately not checked here: a missing or unreadable key
//! or certificate disables the secure listener at startup instead.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod validation;

/// Environment variable for the plain HTTP port.
pub const ENV_PORT: &str = "PORT";
/// Environment variable for the TLS port.
pub const ENV_SECURE_PORT: &str = "SECURE_PORT";
/// Environment variable for the TLS private key path.
pub const ENV_SECURE_KEY_PATH: &str = "SECURE_KEY_PATH";
/// Environment variable for the TLS certificate path.
pub const ENV_SECURE_CERT_PATH: &str = "SECURE_CERT_PATH";

/// Top-level configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub http: HttpOptions,
    #[serde(default)]
    pub tls: TlsOptions,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Plain HTTP listener options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpOptions {
    #[serde(default = "default_http_port")]
    pub port: u16,
}

/// TLS listener options
///
/// The TLS listener starts only when `enabled` is set and both files are
/// readable at startup. Otherwise the server logs why and keeps serving
/// plain HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TlsOptions {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_secure_port")]
    pub port: u16,
    #[serde(default = "default_key_path")]
    pub key_path: PathBuf,
    #[serde(default = "default_cert_path")]
    pub cert_path: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            http: HttpOptions::default(),
            tls: TlsOptions::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            port: default_http_port(),
        }
    }
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            port: default_secure_port(),
            key_path: default_key_path(),
            cert_path: default_cert_path(),
        }
    }
}

impl RegistryConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::load_from_string(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: RegistryConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// Plain HTTP on `port` with TLS switched off.
    ///
    /// Handy for tests and embedding, where no certificate is around.
    pub fn plain_http(port: u16) -> Self {
        Self {
            http: HttpOptions { port },
            tls: TlsOptions {
                enabled: false,
                ..TlsOptions::default()
            },
            ..Self::default()
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_http_port() -> u16 {
    8001
}

fn default_secure_port() -> u16 {
    3443
}

fn default_key_path() -> PathBuf {
    PathBuf::from("server.key")
}

fn default_cert_path() -> PathBuf {
    PathBuf::from("server.pem")
}

fn default_true() -> bool {
    true
}
