//! Gateway configuration parsing, environment overrides, and validation.
//!
//! Configuration is never cached by the gateway: every operation asks its
//! [`ConfigSource`] for a fresh [`GatewayConfig`] and treats the result as
//! immutable for the rest of that call.

use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::{AppError, Result};

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "TOOL_GATEWAY_";

fn default_executable() -> String {
    "kernel-mcp".into()
}

fn default_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_profile() -> String {
    "default".into()
}

fn default_timeout_ms() -> u64 {
    30_000
}

/// Settings for the tool gateway, usually read from `gateway.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GatewayConfig {
    /// Master switch; a disabled gateway never starts a process.
    #[serde(default)]
    pub enabled: bool,
    /// Helper executable to launch.
    #[serde(default = "default_executable")]
    pub executable: String,
    /// Workspace root passed to the helper via `--workspace-root`.
    #[serde(default = "default_dir")]
    pub workspace_root: PathBuf,
    /// Profile name passed to the helper via `--profile`.
    #[serde(default = "default_profile")]
    pub profile: String,
    /// Optional policy file passed via `--policy`.
    #[serde(default)]
    pub policy_path: Option<PathBuf>,
    /// Working directory the helper runs in.
    #[serde(default = "default_dir")]
    pub working_dir: PathBuf,
    /// Per-call deadline in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Raw operator-supplied arguments, split with shell quoting rules.
    #[serde(default)]
    pub extra_args: String,
    /// Comma-separated allowlist override; blank means the built-in set.
    #[serde(default)]
    pub allowlist: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            executable: default_executable(),
            workspace_root: default_dir(),
            profile: default_profile(),
            policy_path: None,
            working_dir: default_dir(),
            timeout_ms: default_timeout_ms(),
            extra_args: String::new(),
            allowlist: String::new(),
        }
    }
}

impl GatewayConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TOOL_GATEWAY_*` overrides from `lookup`, then re-validate.
    ///
    /// `lookup` receives the full variable name (e.g. `TOOL_GATEWAY_TIMEOUT_MS`)
    /// and returns its value if set.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if an override cannot be parsed or the
    /// resulting configuration is invalid.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));

        if let Some(raw) = var("ENABLED") {
            self.enabled = parse_flag(&raw)?;
        }
        if let Some(raw) = var("EXECUTABLE") {
            self.executable = raw;
        }
        if let Some(raw) = var("WORKSPACE_ROOT") {
            self.workspace_root = PathBuf::from(raw);
        }
        if let Some(raw) = var("PROFILE") {
            self.profile = raw;
        }
        if let Some(raw) = var("POLICY_PATH") {
            self.policy_path = if raw.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(raw))
            };
        }
        if let Some(raw) = var("WORKING_DIR") {
            self.working_dir = PathBuf::from(raw);
        }
        if let Some(raw) = var("TIMEOUT_MS") {
            self.timeout_ms = raw.trim().parse().map_err(|err| {
                AppError::Config(format!("{ENV_PREFIX}TIMEOUT_MS is not a number: {err}"))
            })?;
        }
        if let Some(raw) = var("EXTRA_ARGS") {
            self.extra_args = raw;
        }
        if let Some(raw) = var("ALLOWLIST") {
            self.allowlist = raw;
        }

        self.validate()
    }

    /// Per-call deadline.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Split [`extra_args`](Self::extra_args) into argv tokens.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` on unbalanced quotes.
    pub fn extra_args(&self) -> Result<Vec<String>> {
        shell_words::split(&self.extra_args)
            .map_err(|err| AppError::Config(format!("extra_args could not be parsed: {err}")))
    }

    fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(AppError::Config(
                "timeout_ms must be greater than zero".into(),
            ));
        }

        if self.enabled && self.executable.trim().is_empty() {
            return Err(AppError::Config(
                "executable must not be empty when the gateway is enabled".into(),
            ));
        }

        self.extra_args()?;
        Ok(())
    }
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AppError::Config(format!(
            "{ENV_PREFIX}ENABLED has unrecognised value '{other}'"
        ))),
    }
}

/// Source of a fresh [`GatewayConfig`] for each gateway operation.
pub trait ConfigSource: Send + Sync {
    /// Produce the configuration to use for one call.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the configuration cannot be produced.
    fn load(&self) -> Result<GatewayConfig>;
}

impl ConfigSource for GatewayConfig {
    fn load(&self) -> Result<GatewayConfig> {
        Ok(self.clone())
    }
}

/// Re-reads a TOML file and the process environment on every call.
///
/// A missing file is not an error: defaults are used and environment
/// overrides still apply, so a deployment can be configured from the
/// environment alone.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    /// Create a source backed by the file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path this source reads from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&self) -> Result<GatewayConfig> {
        let mut config = match fs::read_to_string(&self.path) {
            Ok(raw) => toml::from_str(&raw)?,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "config file missing, using defaults");
                GatewayConfig::default()
            }
            Err(err) => {
                return Err(AppError::Config(format!("failed to read config: {err}")));
            }
        };

        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }
}
