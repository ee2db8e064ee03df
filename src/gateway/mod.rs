//! Tool-invocation gateway.
//!
//! Every call launches a fresh helper process, performs the JSON-RPC
//! handshake over its stdio, issues one `tools/call`, and settles exactly once
//! on success, failure, or deadline. Nothing is pooled or reused between calls,
//! and configuration is re-read at the start of each operation.
//!
//! Submodules:
//! - `framer`: newline framing of the helper's stdout.
//! - `protocol`: JSON-RPC message types and result extraction.
//! - `session`: the per-call state machine.
//! - `launcher`: argument building, process start, termination.
//! - `writer`: fire-and-forget stdin writer task.
//! - `runner`: the event loop joining the above.
//! - `allowlist`: tool-name authorization.
//! - `health`: concurrent health probes.

pub mod allowlist;
pub mod framer;
pub mod health;
pub mod launcher;
pub mod protocol;
pub mod runner;
pub mod session;
pub mod writer;

use std::sync::Arc;

use serde_json::Value;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::config::{ConfigSource, GatewayConfig};
use crate::gateway::allowlist::{Allowlist, DEFAULT_ALLOWED_TOOLS};
use crate::gateway::health::{HealthReport, KERNEL_VERSION_TOOL, SELF_CHECK_TOOL};
use crate::gateway::launcher::{LaunchSpec, Launcher, TokioLauncher};
use crate::gateway::protocol::ClientInfo;
use crate::gateway::session::CallSession;
use crate::{AppError, Result};

/// Entry point used by the rest of the application.
///
/// Cheap to clone; clones share the configuration source and launcher.
#[derive(Clone)]
pub struct ToolGateway {
    config: Arc<dyn ConfigSource>,
    launcher: Arc<dyn Launcher>,
    client: ClientInfo,
    default_tools: Vec<String>,
}

impl std::fmt::Debug for ToolGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolGateway")
            .field("client", &self.client)
            .field("default_tools", &self.default_tools)
            .finish_non_exhaustive()
    }
}

impl ToolGateway {
    /// Create a gateway that starts helpers with [`TokioLauncher`].
    #[must_use]
    pub fn new(config: Arc<dyn ConfigSource>) -> Self {
        Self::with_launcher(config, Arc::new(TokioLauncher))
    }

    /// Create a gateway with a custom [`Launcher`].
    #[must_use]
    pub fn with_launcher(config: Arc<dyn ConfigSource>, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            config,
            launcher,
            client: ClientInfo::default(),
            default_tools: DEFAULT_ALLOWED_TOOLS.iter().map(|&s| s.to_owned()).collect(),
        }
    }

    /// Replace the default allowlist used when no override is configured.
    #[must_use]
    pub fn with_default_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the client identity announced in `initialize`.
    #[must_use]
    pub fn with_client_info(mut self, client: ClientInfo) -> Self {
        self.client = client;
        self
    }

    /// Whether the gateway is enabled; `false` if configuration cannot be read.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.load().is_ok_and(|config| config.enabled)
    }

    /// Allowlist in effect for the current configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if configuration cannot be read.
    pub fn allowed_tools(&self) -> Result<Allowlist> {
        let config = self.config.load()?;
        Ok(Allowlist::resolve(&config.allowlist, &self.default_tools))
    }

    /// Call `name` after checking it against the allowlist.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidInput` — blank tool name.
    /// - `AppError::Config` / `AppError::Disabled` — before any process starts.
    /// - `AppError::Unauthorized` — tool not permitted; no process starts.
    /// - `Spawn`, `Protocol`, `Exit`, `Timeout` — from the call itself.
    pub async fn call_allowed_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        let name = validate_name(name)?;
        let config = self.enabled_config()?;

        Allowlist::resolve(&config.allowlist, &self.default_tools).authorize(name)?;

        self.invoke(&config, name, arguments).await
    }

    /// Call `name` without consulting the allowlist.
    ///
    /// Reserved for trusted, fixed tool names.
    ///
    /// # Errors
    ///
    /// As [`call_allowed_tool`](Self::call_allowed_tool), minus `Unauthorized`.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        let name = validate_name(name)?;
        let config = self.enabled_config()?;
        self.invoke(&config, name, arguments).await
    }

    /// Probe the helper. Never fails; problems are reported in the result.
    pub async fn health(&self) -> HealthReport {
        let config = match self.config.load() {
            Ok(config) => config,
            Err(err) => {
                return HealthReport {
                    enabled: false,
                    ..HealthReport::unreachable(&err)
                };
            }
        };

        if !config.enabled {
            return HealthReport::disabled();
        }

        health::aggregate(
            self.invoke(&config, KERNEL_VERSION_TOOL, Value::Object(serde_json::Map::new())),
            self.invoke(&config, SELF_CHECK_TOOL, Value::Object(serde_json::Map::new())),
        )
        .await
    }

    fn enabled_config(&self) -> Result<GatewayConfig> {
        let config = self.config.load()?;
        if config.enabled {
            Ok(config)
        } else {
            Err(AppError::Disabled("tool gateway is disabled".into()))
        }
    }

    async fn invoke(&self, config: &GatewayConfig, name: &str, arguments: Value) -> Result<Value> {
        let call_id = Uuid::new_v4().to_string();
        let span = info_span!("tool_call", call_id = %call_id, tool = %name);

        async {
            let spec = LaunchSpec::from_config(config)?;
            let session = CallSession::new(name, arguments, self.client.clone(), config.timeout());
            runner::run_call(self.launcher.as_ref(), &spec, session, &call_id).await
        }
        .instrument(span)
        .await
    }
}

fn validate_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        Err(AppError::InvalidInput("tool name must not be empty".into()))
    } else {
        Ok(name)
    }
}
