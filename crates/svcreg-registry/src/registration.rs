//! Registration protocol.
//!
//! Turns a raw [`RegisterRequest`] into a [`Registration`]: the version
//! suffix is split off the name, a missing host is filled from the caller's
//! remote address, and required fields are checked. Only a validated
//! `Registration` can be inserted into the [`Registry`].

use crate::naming::ServiceName;
use crate::storage::Registry;
use std::net::IpAddr;
use svcreg_common::{Error, Instance, RegisterRequest, Result};
use tracing::debug;

/// A validated, normalized registration ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub name: String,
    pub version: Option<String>,
    pub host: String,
    pub port: u16,
    pub meta: Option<serde_json::Value>,
}

impl Registration {
    /// Validates an explicit `(name, host, port)` triple.
    pub fn new(name: &str, host: &str, port: u16) -> Result<Self> {
        Self::from_request(
            RegisterRequest {
                name: Some(name.to_string()),
                host: Some(host.to_string()),
                port: Some(port),
                meta: None,
            },
            None,
        )
    }

    /// Validates a request body.
    ///
    /// `remote` is the address of the connection the request arrived on. It
    /// is only consulted when the body carries no host, so a missing host is
    /// an error only when neither source is available.
    pub fn from_request(req: RegisterRequest, remote: Option<IpAddr>) -> Result<Self> {
        let name = non_empty(req.name);
        let host = non_empty(req.host).or_else(|| remote.map(|ip| ip.to_canonical().to_string()));
        let port = req.port.filter(|port| *port != 0);

        let (name, host, port) = match (name, host, port) {
            (Some(name), Some(host), Some(port)) => (name, host, port),
            (name, host, port) => {
                let missing: Vec<&str> = [
                    ("name", name.is_none()),
                    ("host", host.is_none()),
                    ("port", port.is_none()),
                ]
                .into_iter()
                .filter_map(|(field, absent)| absent.then_some(field))
                .collect();

                return Err(Error::validation(format!(
                    "Either host, port or name missing: {}",
                    missing.join(", ")
                )));
            }
        };

        let (name, version) = ServiceName::parse(&name).into_parts();
        if name.is_empty() {
            return Err(Error::validation(
                "Service name must not be empty before the version separator",
            ));
        }

        Ok(Self {
            name,
            version,
            host,
            port,
            meta: req.meta,
        })
    }

    /// Attaches opaque metadata.
    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Whitespace-only values count as missing; anything else is kept verbatim.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Validates `req` and inserts it into `registry`.
///
/// On success exactly one new record exists in the store and the fully
/// materialized instance (id and heartbeat included) is returned.
pub fn register(
    registry: &Registry,
    req: RegisterRequest,
    remote: Option<IpAddr>,
) -> Result<Instance> {
    let registration = Registration::from_request(req, remote)?;
    debug!(
        "Registering {}@{:?} at {}:{}",
        registration.name, registration.version, registration.host, registration.port
    );
    Ok(registry.insert(registration))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn localhost() -> Option<IpAddr> {
        Some(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    #[test]
    fn test_registration_splits_version() {
        let reg = Registration::new("web@1.2.3", "10.0.0.1", 18803).unwrap();
        assert_eq!(reg.name, "web");
        assert_eq!(reg.version.as_deref(), Some("1.2.3"));
        assert_eq!(reg.host, "10.0.0.1");
        assert_eq!(reg.port, 18803);
    }

    #[test]
    fn test_host_filled_from_remote_address() {
        let reg = Registration::from_request(RegisterRequest::new("web", 18803), localhost()).unwrap();
        assert_eq!(reg.host, "127.0.0.1");
    }

    #[test]
    fn test_ipv4_mapped_remote_is_canonicalized() {
        let mapped = Ipv4Addr::LOCALHOST.to_ipv6_mapped();
        let reg =
            Registration::from_request(RegisterRequest::new("web", 1), Some(IpAddr::V6(mapped)))
                .unwrap();
        assert_eq!(reg.host, "127.0.0.1");

        let reg = Registration::from_request(
            RegisterRequest::new("web", 1),
            Some(IpAddr::V6(Ipv6Addr::LOCALHOST)),
        )
        .unwrap();
        assert_eq!(reg.host, "::1");
    }

    #[test]
    fn test_explicit_host_wins_over_remote() {
        let req = RegisterRequest::new("web", 18803).with_host("172.167.155.21");
        let reg = Registration::from_request(req, localhost()).unwrap();
        assert_eq!(reg.host, "172.167.155.21");
    }

    #[test]
    fn test_missing_port_is_rejected() {
        let req = RegisterRequest {
            name: Some("web".to_string()),
            ..Default::default()
        };
        let err = Registration::from_request(req, localhost()).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("port"));
    }

    #[test]
    fn test_missing_name_is_rejected() {
        let req = RegisterRequest {
            port: Some(18803),
            host: Some("127.0.0.1".to_string()),
            ..Default::default()
        };
        let err = Registration::from_request(req, None).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn test_missing_host_without_remote_is_rejected() {
        let err = Registration::from_request(RegisterRequest::new("web", 18803), None).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("host"));
    }

    #[test]
    fn test_blank_fields_count_as_missing() {
        assert!(Registration::new("  ", "127.0.0.1", 1).is_err());
        assert!(Registration::new("web", "", 1).is_err());
        assert!(Registration::new("web", "127.0.0.1", 0).is_err());
    }

    #[test]
    fn test_values_are_stored_as_given() {
        let reg = Registration::new("web @1.0", " 10.0.0.1", 80).unwrap();
        assert_eq!(reg.name, "web ");
        assert_eq!(reg.version.as_deref(), Some("1.0"));
        assert_eq!(reg.host, " 10.0.0.1");
    }

    #[test]
    fn test_empty_canonical_name_is_rejected() {
        let err = Registration::new("@1.0", "127.0.0.1", 80).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_meta_is_carried_through() {
        let req = RegisterRequest::new("web", 80).with_meta(json!({ "weight": 3 }));
        let reg = Registration::from_request(req, localhost()).unwrap();
        assert_eq!(reg.meta, Some(json!({ "weight": 3 })));
    }

    #[test]
    fn test_register_inserts_exactly_one_record() {
        let registry = Registry::new();
        let instance = register(&registry, RegisterRequest::new("web@1.2.3", 18803), localhost()).unwrap();

        assert_eq!(registry.count(), 1);
        assert_eq!(instance.name, "web");
        assert_eq!(instance.version.as_deref(), Some("1.2.3"));
        assert_eq!(instance.host, "127.0.0.1");

        let invalid = register(&registry, RegisterRequest::default(), localhost());
        assert!(invalid.is_err());
        assert_eq!(registry.count(), 1);
    }
}
