//! Standalone service registry server.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use svcreg_registry::config::{
    RegistryConfig, ENV_PORT, ENV_SECURE_CERT_PATH, ENV_SECURE_KEY_PATH, ENV_SECURE_PORT,
};
use svcreg_registry::RegistryServer;

/// svcreg - minimal service registry
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Plain HTTP port (overrides config)
    #[arg(short, long, env = ENV_PORT)]
    port: Option<u16>,

    /// TLS port (overrides config)
    #[arg(long, env = ENV_SECURE_PORT)]
    secure_port: Option<u16>,

    /// TLS private key path (overrides config)
    #[arg(long, env = ENV_SECURE_KEY_PATH, value_name = "FILE")]
    secure_key_path: Option<PathBuf>,

    /// TLS certificate path (overrides config)
    #[arg(long, env = ENV_SECURE_CERT_PATH, value_name = "FILE")]
    secure_cert_path: Option<PathBuf>,

    /// Do not start the TLS listener
    #[arg(long)]
    no_tls: bool,
}

impl Args {
    fn into_config(self) -> Result<(RegistryConfig, bool)> {
        let mut config = match &self.config {
            Some(path) => RegistryConfig::load_from_file(path)?,
            None => RegistryConfig::default(),
        };

        if let Some(port) = self.port {
            config.http.port = port;
        }
        if let Some(port) = self.secure_port {
            config.tls.port = port;
        }
        if let Some(path) = self.secure_key_path {
            config.tls.key_path = path;
        }
        if let Some(path) = self.secure_cert_path {
            config.tls.cert_path = path;
        }
        if self.no_tls {
            config.tls.enabled = false;
        }

        config.validate().context("Invalid configuration")?;
        Ok((config, self.debug))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let (config, debug) = Args::parse().into_config()?;

    initialize_logging(&config, debug);

    info!("svcreg service registry starting...");
    info!(
        "HTTP port {}, TLS {} (port {})",
        config.http.port,
        if config.tls.enabled { "enabled" } else { "disabled" },
        config.tls.port
    );

    RegistryServer::new(config).run().await?;

    info!("svcreg stopped");
    Ok(())
}

fn initialize_logging(config: &RegistryConfig, debug: bool) {
    let level = if debug { "debug" } else { config.log_level.as_str() };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .init();
}
