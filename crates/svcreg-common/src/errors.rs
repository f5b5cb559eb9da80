//! Error types for the service registry.
//!
//! Every fallible operation in the workspace returns [`Result<T>`]. Errors
//! carry enough context to pick an HTTP status at the API boundary:
//! validation failures become 400, lookups that miss become 404, anything
//! else is a 500.
//!
//! ```
//! use svcreg_common::{Error, InstanceId, Result};
//!
//! fn lookup(id: InstanceId) -> Result<()> {
//!     Err(Error::instance_not_found(id))
//! }
//!
//! assert!(lookup(InstanceId::new(7)).unwrap_err().is_not_found());
//! ```

use crate::types::InstanceId;
use thiserror::Error;

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for registry operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A requested resource was not found.
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// No instance is registered under the given id.
    #[error("Instance not found: {id}")]
    InstanceNotFound { id: InstanceId },

    /// A registration request is missing a required field.
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// TLS material could not be loaded.
    #[error("TLS error: {0}")]
    Tls(String),

    /// HTTP protocol error (e.g., request to the registry failed).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Internal error (shouldn't happen in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error (wraps std::io::Error).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context.
    #[error("{message}: {source}")]
    WithContext {
        message: String,
        source: Box<Error>,
    },
}

impl Error {
    /// Creates a NotFound error.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Creates an InstanceNotFound error.
    pub fn instance_not_found(id: InstanceId) -> Self {
        Self::InstanceNotFound { id }
    }

    /// Creates a Validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Adds context to an error.
    ///
    /// # Example
    /// ```
    /// use svcreg_common::{Error, Result};
    ///
    /// fn inner() -> Result<()> {
    ///     Err(Error::not_found("instance 3"))
    /// }
    ///
    /// fn outer() -> Result<()> {
    ///     inner().map_err(|e| e.context("Heartbeat failed"))
    /// }
    ///
    /// assert!(outer().unwrap_err().to_string().starts_with("Heartbeat failed"));
    /// ```
    pub fn context(self, message: impl Into<String>) -> Self {
        Self::WithContext {
            message: message.into(),
            source: Box::new(self),
        }
    }

    /// Returns true if this error (or the error it wraps) is a failed lookup.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } | Self::InstanceNotFound { .. } => true,
            Self::WithContext { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Returns true if this error (or the error it wraps) is a validation failure.
    pub fn is_validation(&self) -> bool {
        match self {
            Self::Validation { .. } => true,
            Self::WithContext { source, .. } => source.is_validation(),
            _ => false,
        }
    }
}

// Convenience methods for Result types
pub trait ResultExt<T> {
    /// Adds context to an error result.
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::not_found("test");
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_error_context() {
        let err = Error::validation("port missing").context("Registration failed");

        let error_message = err.to_string();
        assert!(error_message.contains("Registration failed"));
        assert!(error_message.contains("port missing"));
        assert!(err.is_validation());
    }

    #[test]
    fn test_instance_not_found_message() {
        let err = Error::instance_not_found(InstanceId::new(42));

        assert_eq!(err.to_string(), "Instance not found: 42");
        assert!(err.is_not_found());
        assert!(!err.is_validation());
    }

    #[test]
    fn test_result_ext_context() {
        let result: Result<()> = Err(Error::instance_not_found(InstanceId::new(1)));
        let err = result.context("Deregistration failed").unwrap_err();

        assert!(err.is_not_found());
        match err {
            Error::WithContext { message, .. } => assert_eq!(message, "Deregistration failed"),
            other => panic!("Expected WithContext, got {:?}", other),
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
