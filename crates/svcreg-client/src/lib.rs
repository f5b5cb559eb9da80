//! # svcreg client
//!
//! Async client for the svcreg registry HTTP API, for services that want to
//! register themselves, send heartbeats, and discover their peers.

pub mod client;

// Re-export commonly used items
pub use client::RegistryClient;
pub use svcreg_common::{Instance, InstanceId, RegisterRequest};
