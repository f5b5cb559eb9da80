//! TLS material loading.
//!
//! Reads a PEM certificate chain and private key and builds the rustls
//! server configuration for the secure listener. Any failure here is
//! recoverable: the server logs it and keeps serving plain HTTP.

use crate::config::TlsOptions;
use rustls::{Certificate, PrivateKey, ServerConfig};
use rustls_pemfile::{certs, ec_private_keys, pkcs8_private_keys, rsa_private_keys};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use svcreg_common::{Error, Result};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info};

/// Builds a TLS acceptor from the configured key and certificate.
pub fn load_acceptor(options: &TlsOptions) -> Result<TlsAcceptor> {
    let config = load_server_config(&options.cert_path, &options.key_path)?;
    Ok(TlsAcceptor::from(config))
}

/// Builds a rustls server configuration from PEM files.
pub fn load_server_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>> {
    info!(
        "Loading TLS certificate {} and key {}",
        cert_path.display(),
        key_path.display()
    );

    let certs = load_certificates(cert_path)?;
    let key = load_private_key(key_path)?;

    let config = ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| Error::Tls(format!("Failed to create TLS config: {}", e)))?;

    Ok(Arc::new(config))
}

fn open(path: &Path, what: &str) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| Error::Tls(format!("Failed to open {} {}: {}", what, path.display(), e)))
}

fn load_certificates(path: &Path) -> Result<Vec<Certificate>> {
    let mut reader = open(path, "certificate file")?;
    let certs = certs(&mut reader)
        .map_err(|e| Error::Tls(format!("Failed to parse certificates: {}", e)))?;

    if certs.is_empty() {
        return Err(Error::Tls(format!(
            "No certificates found in {}",
            path.display()
        )));
    }

    debug!("Loaded {} certificate(s) from {}", certs.len(), path.display());
    Ok(certs.into_iter().map(Certificate).collect())
}

/// Accepts PKCS#8 keys first, then PKCS#1 (RSA), then SEC1 (EC) keys.
fn load_private_key(path: &Path) -> Result<PrivateKey> {
    type KeyParser = fn(&mut dyn std::io::BufRead) -> std::io::Result<Vec<Vec<u8>>>;
    let parsers: [KeyParser; 3] = [pkcs8_private_keys, rsa_private_keys, ec_private_keys];

    let mut keys = Vec::new();
    for parse in parsers {
        let mut reader = open(path, "private key file")?;
        keys = parse(&mut reader)
            .map_err(|e| Error::Tls(format!("Failed to parse private key: {}", e)))?;
        if !keys.is_empty() {
            break;
        }
    }

    keys.into_iter()
        .next()
        .map(PrivateKey)
        .ok_or_else(|| Error::Tls(format!("No private key found in {}", path.display())))
}
