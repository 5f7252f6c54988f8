//! Command implementations.

mod call;
mod config;

pub use call::{CallCommand, MethodArg};
pub use config::ConfigCommand;
