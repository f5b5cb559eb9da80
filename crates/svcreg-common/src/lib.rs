//! # svcreg common
//!
//! Types shared between the registry server and its clients.
//!
//! This crate provides:
//! - The [`Error`] type and [`Result`] alias used across the workspace
//! - The [`Instance`] record and its [`InstanceId`] identity
//! - Request and response bodies of the registry's HTTP API

pub mod errors;
pub mod types;

// Re-export commonly used items
pub use errors::{Error, Result, ResultExt};
pub use types::{
    ApiIndex, DeregisterResponse, ErrorResponse, HeartbeatAck, Instance, InstanceId,
    RegisterRequest,
};
