//! Per-call protocol state machine.
//!
//! A [`CallSession`] owns one tool invocation from spawn to settlement. It
//! performs no I/O: the runner feeds it [`SessionEvent`]s from every source
//! (stdout frames, stderr bytes, process exit, the deadline) and acts on the
//! returned [`Transition`].
//!
//! ```text
//! Spawned ──Started──▶ AwaitingInit ──result id 1──▶ Initialized ──▶ AwaitingResult
//!    │                      │                                            │
//!    └──────────────────────┴─ error / oversized / exit != 0 / deadline ─┴──▶ Settled
//!                                                          result id 2 ──────▶ Settled
//! ```
//!
//! `Initialized` is passed through while the `notifications/initialized`
//! notification and the `tools/call` request are emitted together.
//!
//! [`Transition::Settled`] is returned exactly once per session; every event
//! after that is [`Transition::Ignored`].

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::gateway::protocol::{
    extract_tool_result, ClientInfo, InboundMessage, OutboundMessage, CALL_ID, INIT_ID,
};
use crate::{AppError, Result};

/// Lifecycle phase of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Process launched; nothing sent yet.
    Spawned,
    /// `initialize` sent; waiting for its response.
    AwaitingInit,
    /// Handshake acknowledged.
    Initialized,
    /// `tools/call` sent; waiting for its response.
    AwaitingResult,
    /// Outcome delivered. Terminal.
    Settled,
}

/// Everything that can happen to a running call.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The process started; the handshake may begin.
    Started,
    /// The process could not be started.
    SpawnFailed(String),
    /// One framed line from stdout.
    Line(String),
    /// A stdout line over the framing limit (in bytes) was discarded.
    Oversized(usize),
    /// A chunk of stderr output.
    Stderr(Vec<u8>),
    /// The process exited; `None` when killed by a signal.
    Exited(Option<i32>),
    /// The call deadline elapsed.
    DeadlineElapsed,
}

/// What the runner must do after an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Nothing to do.
    Ignored,
    /// Write these messages to the helper, in order.
    Send(Vec<OutboundMessage>),
    /// The call is over; deliver this outcome and terminate the helper.
    Settled(Result<Value>),
}

/// State of one tool invocation.
#[derive(Debug)]
pub struct CallSession {
    tool: String,
    arguments: Option<Value>,
    client: ClientInfo,
    timeout: Duration,
    phase: Phase,
    stderr: Vec<u8>,
}

impl CallSession {
    /// Create a session for calling `tool` with `arguments`.
    #[must_use]
    pub fn new(tool: &str, arguments: Value, client: ClientInfo, timeout: Duration) -> Self {
        Self {
            tool: tool.to_owned(),
            arguments: Some(arguments),
            client,
            timeout,
            phase: Phase::Spawned,
            stderr: Vec::new(),
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Tool this session invokes.
    #[must_use]
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Deadline measured from call start.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether the outcome has already been delivered.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.phase == Phase::Settled
    }

    /// Stderr captured so far, lossily decoded.
    #[must_use]
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Advance the state machine by one event.
    pub fn handle(&mut self, event: SessionEvent) -> Transition {
        if self.is_settled() {
            debug!(tool = %self.tool, ?event, "session: event after settlement ignored");
            return Transition::Ignored;
        }

        match event {
            SessionEvent::Started => self.on_started(),
            SessionEvent::SpawnFailed(reason) => self.settle(Err(AppError::Spawn(reason))),
            SessionEvent::Line(line) => self.on_line(&line),
            SessionEvent::Oversized(limit) => {
                self.settle(Err(AppError::Io(format!("response exceeded {limit} bytes"))))
            }
            SessionEvent::Stderr(chunk) => {
                self.stderr.extend_from_slice(&chunk);
                Transition::Ignored
            }
            SessionEvent::Exited(code) => self.on_exit(code),
            SessionEvent::DeadlineElapsed => {
                let millis = self.timeout.as_millis();
                let err = AppError::Timeout(format!(
                    "tool '{}' did not respond within {millis} ms",
                    self.tool
                ));
                self.settle(Err(err))
            }
        }
    }

    fn on_started(&mut self) -> Transition {
        if self.phase != Phase::Spawned {
            return Transition::Ignored;
        }
        self.phase = Phase::AwaitingInit;
        Transition::Send(vec![OutboundMessage::initialize(&self.client)])
    }

    fn on_line(&mut self, line: &str) -> Transition {
        let Some(message) = InboundMessage::parse(line) else {
            debug!(tool = %self.tool, raw = line, "session: non-json line discarded");
            return Transition::Ignored;
        };

        match message {
            InboundMessage::Failure { error, .. } => self.settle(Err(AppError::Protocol {
                code: error.code,
                message: error.message,
            })),
            InboundMessage::Success { id: Some(INIT_ID), .. }
                if matches!(self.phase, Phase::Spawned | Phase::AwaitingInit) =>
            {
                self.phase = Phase::Initialized;
                let arguments = self.arguments.take().unwrap_or(Value::Null);
                let outbound = vec![
                    OutboundMessage::initialized(),
                    OutboundMessage::tools_call(&self.tool, arguments),
                ];
                self.phase = Phase::AwaitingResult;
                Transition::Send(outbound)
            }
            InboundMessage::Success {
                id: Some(CALL_ID),
                result,
            } if matches!(self.phase, Phase::Initialized | Phase::AwaitingResult) => {
                self.settle(Ok(extract_tool_result(result)))
            }
            InboundMessage::Success { id, .. } => {
                debug!(
                    tool = %self.tool,
                    ?id,
                    phase = ?self.phase,
                    "session: unexpected response ignored"
                );
                Transition::Ignored
            }
            InboundMessage::Other => Transition::Ignored,
        }
    }

    fn on_exit(&mut self, code: Option<i32>) -> Transition {
        match code {
            Some(0) => {
                debug!(tool = %self.tool, "session: helper exited cleanly before responding");
                Transition::Ignored
            }
            code => {
                let err = AppError::Exit {
                    code: code.unwrap_or(-1),
                    stderr: self.stderr_text(),
                };
                self.settle(Err(err))
            }
        }
    }

    fn settle(&mut self, outcome: Result<Value>) -> Transition {
        self.phase = Phase::Settled;
        Transition::Settled(outcome)
    }
}
