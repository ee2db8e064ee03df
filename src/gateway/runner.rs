//! Drives one [`CallSession`] against a live helper process.
//!
//! The runner owns the process for the duration of the call and races four
//! event sources in a single `select!` loop:
//!
//! | Source            | Event fed to the session                  |
//! |-------------------|-------------------------------------------|
//! | stdout frames     | [`SessionEvent::Line`], [`SessionEvent::Oversized`] |
//! | stderr reads      | [`SessionEvent::Stderr`]                  |
//! | `child.wait()`    | [`SessionEvent::Exited`], once both pipes hit EOF |
//! | deadline          | [`SessionEvent::DeadlineElapsed`]         |
//!
//! The exit event is held back until stdout and stderr are drained so that a
//! response written just before exit is still seen and the captured stderr is
//! complete. Once the session settles, the helper receives one termination
//! signal and is handed to a detached reaper task.

use std::time::Instant;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use crate::gateway::framer::{Frame, LineFramer};
use crate::gateway::launcher::{terminate, LaunchSpec, Launcher};
use crate::gateway::protocol::OutboundMessage;
use crate::gateway::session::{CallSession, SessionEvent, Transition};
use crate::gateway::writer::run_writer;
use crate::{AppError, Result};

const STDERR_CHUNK: usize = 4096;

/// Launch a helper and run `session` to settlement.
///
/// The deadline covers everything after this function is entered, including
/// the handshake.
///
/// # Errors
///
/// Returns whichever failure settled the session: `Spawn`, `Protocol`,
/// `Exit`, or `Timeout`.
pub async fn run_call(
    launcher: &dyn Launcher,
    spec: &LaunchSpec,
    mut session: CallSession,
    call_id: &str,
) -> Result<Value> {
    let started = Instant::now();
    let deadline = tokio::time::Instant::now() + session.timeout();

    let process = match launcher.launch(spec) {
        Ok(process) => process,
        Err(err) => {
            let reason = match err {
                AppError::Spawn(reason) => reason,
                other => other.to_string(),
            };
            let outcome = session_outcome(&mut session, SessionEvent::SpawnFailed(reason));
            return finish(&session, outcome, started);
        }
    };

    let mut child = process.child;
    let mut stdout = FramedRead::new(process.stdout, LineFramer::new());
    let mut stderr = process.stderr;
    let mut stderr_buf = vec![0_u8; STDERR_CHUNK];

    let (msg_tx, msg_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(run_writer(call_id.to_owned(), process.stdin, msg_rx));

    let sleep = tokio::time::sleep_until(deadline);
    tokio::pin!(sleep);

    let mut stdout_open = true;
    let mut stderr_open = true;
    let mut running = true;
    let mut pending_exit: Option<Option<i32>> = None;

    let mut transition = session.handle(SessionEvent::Started);

    let outcome = loop {
        match transition {
            Transition::Settled(outcome) => break outcome,
            Transition::Send(messages) => dispatch(&msg_tx, messages, call_id),
            Transition::Ignored => {}
        }

        if !stdout_open && !stderr_open {
            if let Some(code) = pending_exit.take() {
                transition = session.handle(SessionEvent::Exited(code));
                continue;
            }
        }

        transition = tokio::select! {
            () = &mut sleep => session.handle(SessionEvent::DeadlineElapsed),

            frame = stdout.next(), if stdout_open => match frame {
                Some(Ok(Frame::Line(line))) => {
                    debug!(call_id, raw = line.as_str(), "runner: frame received");
                    session.handle(SessionEvent::Line(line))
                }
                Some(Ok(Frame::Oversized(limit))) => {
                    session.handle(SessionEvent::Oversized(limit))
                }
                Some(Err(err)) => {
                    warn!(call_id, %err, "runner: stdout failed");
                    stdout_open = false;
                    Transition::Ignored
                }
                None => {
                    debug!(call_id, "runner: stdout closed");
                    stdout_open = false;
                    Transition::Ignored
                }
            },

            read = stderr.read(&mut stderr_buf), if stderr_open => match read {
                Ok(0) => {
                    stderr_open = false;
                    Transition::Ignored
                }
                Ok(n) => session.handle(SessionEvent::Stderr(stderr_buf[..n].to_vec())),
                Err(err) => {
                    warn!(call_id, %err, "runner: stderr failed");
                    stderr_open = false;
                    Transition::Ignored
                }
            },

            status = child.wait(), if running => {
                running = false;
                let code = match status {
                    Ok(status) => status.code(),
                    Err(err) => {
                        warn!(call_id, %err, "runner: error waiting for helper");
                        None
                    }
                };
                debug!(call_id, ?code, "runner: helper exited");
                pending_exit = Some(code);
                Transition::Ignored
            },
        };
    };

    drop(msg_tx);
    writer.abort();
    shut_down(child, call_id);

    finish(&session, outcome, started)
}

fn dispatch(
    msg_tx: &mpsc::UnboundedSender<OutboundMessage>,
    messages: Vec<OutboundMessage>,
    call_id: &str,
) {
    for message in messages {
        let method = message.method;
        if msg_tx.send(message).is_err() {
            warn!(call_id, method, "runner: writer gone, message dropped");
        }
    }
}

fn session_outcome(session: &mut CallSession, event: SessionEvent) -> Result<Value> {
    match session.handle(event) {
        Transition::Settled(outcome) => outcome,
        other => Err(AppError::Io(format!(
            "session did not settle as expected: {other:?}"
        ))),
    }
}

/// Signal the helper once, then reap it in the background.
fn shut_down(mut child: Child, call_id: &str) {
    if let Err(err) = terminate(&mut child) {
        warn!(call_id, %err, "runner: failed to terminate helper");
    }

    let call_id = call_id.to_owned();
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => debug!(call_id, ?status, "runner: helper reaped"),
            Err(err) => warn!(call_id, %err, "runner: failed to reap helper"),
        }
    });
}

fn finish(session: &CallSession, outcome: Result<Value>, started: Instant) -> Result<Value> {
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    match &outcome {
        Ok(_) => info!(tool = session.tool(), elapsed_ms, "tool call succeeded"),
        Err(err) => info!(
            tool = session.tool(),
            elapsed_ms,
            kind = err.kind(),
            %err,
            "tool call failed"
        ),
    }
    outcome
}
