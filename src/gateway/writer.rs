//! Outbound writer task.
//!
//! Receives [`OutboundMessage`]s from an unbounded channel, serialises each to
//! one compact JSON line, and writes it to the helper's stdin. Sends are
//! fire-and-forget from the session's point of view: a failed write is logged
//! and ends the task, but never settles the call. The deadline still does.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::gateway::protocol::OutboundMessage;

/// Write every message from `msg_rx` to `stdin` as NDJSON.
///
/// Exits when the channel closes or a write fails.
pub async fn run_writer<W>(
    call_id: String,
    stdin: W,
    mut msg_rx: mpsc::UnboundedReceiver<OutboundMessage>,
) where
    W: AsyncWrite + Unpin,
{
    let mut stdin = stdin;

    while let Some(message) = msg_rx.recv().await {
        let mut bytes = match serde_json::to_vec(&message) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(
                    call_id,
                    method = message.method,
                    %err,
                    "writer: failed to serialise message"
                );
                continue;
            }
        };
        bytes.push(b'\n');

        if let Err(err) = write_line(&mut stdin, &bytes).await {
            warn!(call_id, method = message.method, %err, "writer: helper stdin unavailable");
            return;
        }
        debug!(call_id, method = message.method, "writer: message sent");
    }

    debug!(call_id, "writer: channel closed, stopping");
}

async fn write_line<W>(stdin: &mut W, bytes: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    stdin.write_all(bytes).await?;
    stdin.flush().await
}
