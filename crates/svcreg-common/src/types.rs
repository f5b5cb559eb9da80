//! Core domain and wire types.
//!
//! [`Instance`] is both the stored record and the JSON document returned by
//! the API, so the server and the client agree on a single definition.

use crate::errors::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a registered instance.
///
/// Ids are assigned by the registry store in strictly increasing order and
/// are never reused, even after the instance is deleted.
///
/// # Example
/// ```
/// use svcreg_common::InstanceId;
///
/// let id: InstanceId = "17".parse().unwrap();
/// assert_eq!(id.get(), 17);
/// assert!("abc".parse::<InstanceId>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Creates an InstanceId from its numeric value.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the numeric value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Path segments arrive as strings; anything that is not a plain unsigned
/// integer cannot name an instance, so it parses to `NotFound`.
impl FromStr for InstanceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| Error::not_found(format!("instance '{}'", s)))
    }
}

impl From<u64> for InstanceId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered microservice endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// Store-assigned identity.
    pub id: InstanceId,

    /// Canonical service name (version suffix stripped).
    pub name: String,

    /// Version parsed from a `name@version` registration, or `null`.
    pub version: Option<String>,

    /// IP address or hostname the service listens on.
    pub host: String,

    /// Port the service listens on.
    pub port: u16,

    /// Opaque attributes supplied by the registrant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,

    /// Time of registration or of the last heartbeat.
    pub heartbeat: DateTime<Utc>,
}

/// Body of `POST /services`.
///
/// Every field is optional on the wire so that a missing field is reported
/// as a validation error by the registration protocol instead of a parse
/// failure. `port` accepts either a JSON number or a numeric string, which
/// also lets the same type decode URL-encoded form bodies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_port"
    )]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl RegisterRequest {
    /// Creates a request for `name` listening on `port`, host left to the server.
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: Some(name.into()),
            port: Some(port),
            ..Default::default()
        }
    }

    /// Sets an explicit host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Attaches opaque metadata.
    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortRepr {
        Number(u64),
        Text(String),
    }

    let repr = Option::<PortRepr>::deserialize(deserializer)?;
    match repr {
        None => Ok(None),
        Some(PortRepr::Number(n)) => u16::try_from(n)
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("port out of range: {}", n))),
        Some(PortRepr::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(PortRepr::Text(s)) => s
            .trim()
            .parse::<u16>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid port: {}", s))),
    }
}

/// Response of `POST /services/:id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatAck {
    pub success: bool,
    pub message: String,
    pub doc: Instance,
}

/// Response of `DELETE /services/:id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeregisterResponse {
    pub success: bool,
}

/// Response of `GET /`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiIndex {
    #[serde(rename = "self")]
    pub self_path: String,
    pub services: String,
}

impl Default for ApiIndex {
    fn default() -> Self {
        Self {
            self_path: "/".to_string(),
            services: "/services".to_string(),
        }
    }
}

/// Error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}
