//! Helper process launching and termination.
//!
//! The helper inherits the gateway's environment, runs in the configured
//! working directory, and has all three standard streams piped. Its argument
//! list is the operator's `extra_args` followed by the workspace, profile, and
//! policy flags, each appended only when the operator has not already supplied
//! it.
//!
//! The child is **not** spawned with `kill_on_drop`: termination is an explicit
//! [`terminate`] call made once per settled call, and the runner hands the
//! child to a reaper task afterwards.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use crate::config::GatewayConfig;
use crate::{AppError, Result};

/// Flag carrying the workspace root.
pub const WORKSPACE_ROOT_FLAG: &str = "--workspace-root";
/// Flag carrying the profile name.
pub const PROFILE_FLAG: &str = "--profile";
/// Flag carrying the policy file path.
pub const POLICY_FLAG: &str = "--policy";

/// Everything needed to start one helper process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Executable to run.
    pub program: String,
    /// Full argument list.
    pub args: Vec<String>,
    /// Working directory for the child.
    pub working_dir: PathBuf,
}

impl LaunchSpec {
    /// Derive the launch parameters from a configuration snapshot.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `extra_args` cannot be split.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        Ok(Self {
            program: config.executable.clone(),
            args: build_args(config)?,
            working_dir: config.working_dir.clone(),
        })
    }
}

/// Build the helper's argument list.
///
/// # Errors
///
/// Returns `AppError::Config` if `extra_args` has unbalanced quotes.
pub fn build_args(config: &GatewayConfig) -> Result<Vec<String>> {
    let mut args = config.extra_args()?;

    let mut append = |flag: &str, value: String| {
        if has_flag(&args, flag) {
            debug!(flag, "launcher: flag already supplied in extra_args");
        } else {
            args.push(flag.to_owned());
            args.push(value);
        }
    };

    append(
        WORKSPACE_ROOT_FLAG,
        config.workspace_root.to_string_lossy().into_owned(),
    );
    append(PROFILE_FLAG, config.profile.clone());
    if let Some(policy) = &config.policy_path {
        append(POLICY_FLAG, policy.to_string_lossy().into_owned());
    }

    Ok(args)
}

/// Whether `flag` appears as its own token or in `--flag=value` form.
fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|arg| {
        arg == flag
            || arg
                .strip_prefix(flag)
                .is_some_and(|rest| rest.starts_with('='))
    })
}

/// A started helper with its three standard streams detached.
#[derive(Debug)]
pub struct LaunchedProcess {
    /// Process handle, used for exit status and termination.
    pub child: Child,
    /// Helper's stdin.
    pub stdin: ChildStdin,
    /// Helper's stdout.
    pub stdout: ChildStdout,
    /// Helper's stderr.
    pub stderr: ChildStderr,
}

/// Starts helper processes.
///
/// The gateway depends on this trait rather than on [`Command`] directly so
/// callers can observe or replace process creation.
pub trait Launcher: Send + Sync {
    /// Start one helper.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` if the process cannot be started or its
    /// streams cannot be captured.
    fn launch(&self, spec: &LaunchSpec) -> Result<LaunchedProcess>;
}

/// [`Launcher`] backed by [`tokio::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioLauncher;

impl Launcher for TokioLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<LaunchedProcess> {
        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| AppError::Spawn(format!("failed to start {}: {err}", spec.program)))?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            if let Err(err) = child.start_kill() {
                warn!(%err, "launcher: failed to kill helper with missing stdio");
            }
            return Err(AppError::Spawn(format!(
                "failed to capture stdio of {}",
                spec.program
            )));
        };

        debug!(program = %spec.program, pid = ?child.id(), "launcher: helper started");

        Ok(LaunchedProcess {
            child,
            stdin,
            stdout,
            stderr,
        })
    }
}

/// Send the helper a single termination signal.
///
/// Idempotent: a child that has already been reaped, or that has already
/// vanished, is left alone and `Ok(())` is returned. There is no escalation
/// to a harder kill.
///
/// # Errors
///
/// Returns `AppError::Io` if the signal cannot be delivered for any reason
/// other than the process being gone.
pub fn terminate(child: &mut Child) -> Result<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };
    send_terminate(child, pid)
}

#[cfg(unix)]
fn send_terminate(_child: &mut Child, pid: u32) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid)
        .map_err(|err| AppError::Io(format!("pid {pid} out of range: {err}")))?;

    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => Err(AppError::Io(format!("failed to signal helper {pid}: {err}"))),
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child, pid: u32) -> Result<()> {
    match child.start_kill() {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
        Err(err) => Err(AppError::Io(format!("failed to kill helper {pid}: {err}"))),
    }
}
