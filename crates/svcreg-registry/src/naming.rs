//! Service name and version parsing.
//!
//! Registrants may append a version to the service name, separated by `@`
//! (`sentimentAnalysis@0.1.4`). The registry stores the two parts
//! separately so lookups can filter on either.

use std::fmt;

/// Separator between a service name and its version.
pub const VERSION_SEPARATOR: char = '@';

/// A service name split into its canonical name and optional version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceName {
    name: String,
    version: Option<String>,
}

impl ServiceName {
    /// Splits `raw` on the first `@`.
    ///
    /// Everything after the first separator is the version, including any
    /// further `@` characters. An empty suffix (`"svc@"`) yields no version.
    ///
    /// ```
    /// use svcreg_registry::ServiceName;
    ///
    /// let parsed = ServiceName::parse("a@b@c");
    /// assert_eq!(parsed.name(), "a");
    /// assert_eq!(parsed.version(), Some("b@c"));
    /// ```
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(VERSION_SEPARATOR) {
            Some((name, version)) => Self {
                name: name.to_string(),
                version: (!version.is_empty()).then(|| version.to_string()),
            },
            None => Self {
                name: raw.to_string(),
                version: None,
            },
        }
    }

    /// Canonical name, never containing the consumed separator.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version suffix, if one was given.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Consumes self and returns `(name, version)`.
    pub fn into_parts(self) -> (String, Option<String>) {
        (self.name, self.version)
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}{}{}", self.name, VERSION_SEPARATOR, version),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Splits a raw registration name into `(canonical_name, version)`.
pub fn normalize(raw: &str) -> (String, Option<String>) {
    ServiceName::parse(raw).into_parts()
}
