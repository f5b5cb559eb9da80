use super::*;
use anyhow::{anyhow, Result};

/// Validate the complete configuration
pub fn validate_config(config: &RegistryConfig) -> Result<()> {
    validate_log_level(&config.log_level)?;
    validate_ports(config)?;

    Ok(())
}

fn validate_log_level(level: &str) -> Result<()> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(anyhow!(
            "Invalid log level: {}, must be one of: trace, debug, info, warn, error",
            level
        )),
    }
}

/// Port 0 asks the OS for an ephemeral port, so only fixed ports can clash.
fn validate_ports(config: &RegistryConfig) -> Result<()> {
    if config.tls.enabled && config.http.port != 0 && config.http.port == config.tls.port {
        return Err(anyhow!(
            "HTTP and TLS listeners cannot share port {}",
            config.http.port
        ));
    }

    Ok(())
}
