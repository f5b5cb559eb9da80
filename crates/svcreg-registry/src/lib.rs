//! # svcreg registry
//!
//! Minimal service registry: microservice instances register their network
//! location and can later be queried, refreshed via heartbeat, or removed.
//!
//! This crate provides:
//! - Name/version normalization and the registration protocol
//! - In-memory registry storage (single lock around the whole collection)
//! - HTTP API for registering, discovering and deregistering instances
//! - Plain HTTP and optional TLS listeners
//! - Standalone server executable (`svcreg`)

pub mod api;
pub mod clock;
pub mod config;
pub mod naming;
pub mod registration;
pub mod server;
pub mod storage;
pub mod tls;

// Re-export commonly used items
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RegistryConfig;
pub use naming::{normalize, ServiceName};
pub use registration::Registration;
pub use server::RegistryServer;
pub use storage::Registry;
