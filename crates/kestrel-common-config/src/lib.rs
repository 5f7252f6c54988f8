//! Configuration types for Kestrel.
//!
//! This crate provides the client configuration read from
//! `.kestrel/config.yaml`, with `${VAR}` expansion and environment overrides.

pub mod env;
pub mod loader;
pub mod types;

pub use env::*;
pub use loader::*;
pub use types::*;
