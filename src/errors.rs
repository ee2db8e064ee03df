//! Error types shared across the gateway.

use std::fmt::{Display, Formatter};

/// Shared gateway result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Gateway error enumeration covering every way a tool call can fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The gateway is switched off in configuration.
    Disabled(String),
    /// Caller-supplied input was rejected before any work started.
    InvalidInput(String),
    /// Requested tool is not in the resolved allowlist.
    Unauthorized(String),
    /// The operating system could not start the helper process.
    Spawn(String),
    /// The helper returned a JSON-RPC `error` object.
    Protocol {
        /// JSON-RPC error code, when the helper supplied one.
        code: Option<i64>,
        /// Error message taken from the helper's payload.
        message: String,
    },
    /// No terminal response arrived before the deadline.
    Timeout(String),
    /// The helper exited with a non-zero status before responding.
    Exit {
        /// Exit status code; `-1` when the process was killed by a signal.
        code: i32,
        /// Everything the helper wrote to stderr.
        stderr: String,
    },
    /// Pipe or framing failure.
    Io(String),
}

impl AppError {
    /// Stable short label for the failure kind.
    ///
    /// Callers map these to their own response codes.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Disabled(_) => "disabled",
            Self::InvalidInput(_) => "invalid_input",
            Self::Unauthorized(_) => "unauthorized",
            Self::Spawn(_) => "spawn",
            Self::Protocol { .. } => "protocol",
            Self::Timeout(_) => "timeout",
            Self::Exit { .. } => "exit",
            Self::Io(_) => "io",
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Disabled(msg) => write!(f, "disabled: {msg}"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Protocol {
                code: Some(code),
                message,
            } => write!(f, "protocol: {message} (code {code})"),
            Self::Protocol {
                code: None,
                message,
            } => write!(f, "protocol: {message}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Exit { code, stderr } => {
                let stderr = stderr.trim();
                if stderr.is_empty() {
                    write!(f, "exit: helper exited with code {code}")
                } else {
                    write!(f, "exit: helper exited with code {code}: {stderr}")
                }
            }
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}
