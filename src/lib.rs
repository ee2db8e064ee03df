#![forbid(unsafe_code)]

//! Allowlisted tool gateway that calls a stdio JSON-RPC helper process.

pub mod config;
pub mod errors;
pub mod gateway;

pub use config::{ConfigSource, FileConfigSource, GatewayConfig};
pub use errors::{AppError, Result};
pub use gateway::ToolGateway;
