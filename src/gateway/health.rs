//! Health reporting.
//!
//! Health is probed by calling the trusted `kernel_version` and `self_check`
//! tools concurrently. Any failure from either probe is folded into the
//! report; [`aggregate`] never returns an error.

use std::future::Future;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::{AppError, Result};

/// Tool reporting the helper's version.
pub const KERNEL_VERSION_TOOL: &str = "kernel_version";
/// Tool running the helper's internal diagnostics.
pub const SELF_CHECK_TOOL: &str = "self_check";

/// Gateway health, serialised with camel-case keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Whether the gateway is enabled.
    pub enabled: bool,
    /// Whether both probes succeeded.
    pub connected: bool,
    /// Result of `kernel_version`, when connected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernel_version: Option<Value>,
    /// Result of `self_check`, when connected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_check: Option<Value>,
    /// Failure message, when not connected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthReport {
    /// Report for a gateway switched off in configuration.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            connected: false,
            kernel_version: None,
            self_check: None,
            error: None,
        }
    }

    /// Report for an enabled gateway whose probes failed.
    #[must_use]
    pub fn unreachable(err: &AppError) -> Self {
        Self {
            enabled: true,
            connected: false,
            kernel_version: None,
            self_check: None,
            error: Some(err.to_string()),
        }
    }

    /// Report for an enabled gateway whose probes both succeeded.
    #[must_use]
    pub fn connected(kernel_version: Value, self_check: Value) -> Self {
        Self {
            enabled: true,
            connected: true,
            kernel_version: Some(kernel_version),
            self_check: Some(self_check),
            error: None,
        }
    }
}

/// Run both probes concurrently and fold their outcomes into one report.
///
/// When both fail, the `kernel_version` failure is reported.
pub async fn aggregate<K, S>(kernel_version: K, self_check: S) -> HealthReport
where
    K: Future<Output = Result<Value>>,
    S: Future<Output = Result<Value>>,
{
    match tokio::join!(kernel_version, self_check) {
        (Ok(version), Ok(check)) => HealthReport::connected(version, check),
        (Err(err), _) | (_, Err(err)) => {
            warn!(kind = err.kind(), %err, "health probe failed");
            HealthReport::unreachable(&err)
        }
    }
}
