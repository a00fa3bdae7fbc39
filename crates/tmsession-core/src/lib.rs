//! Session core - platform-independent contracts for telemetry session control
//!
//! This crate provides the configuration, error types, service registry, message
//! channel and process traits shared by the session orchestrator and the
//! platform-specific process launchers.

mod config;
mod context;
mod dictionary;
mod error;
mod message;
mod output;
mod process;
mod service;

pub use config::*;
pub use context::*;
pub use dictionary::*;
pub use error::*;
pub use message::*;
pub use output::*;
pub use process::*;
pub use service::*;
