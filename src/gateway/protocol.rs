//! JSON-RPC 2.0 wire types for the helper protocol.
//!
//! Each call exchanges exactly these messages, one per line:
//!
//! | Direction        | Message                                  |
//! |------------------|------------------------------------------|
//! | gateway → helper | `initialize` request, id [`INIT_ID`]     |
//! | helper → gateway | response to [`INIT_ID`]                  |
//! | gateway → helper | `notifications/initialized` (no id)      |
//! | gateway → helper | `tools/call` request, id [`CALL_ID`]     |
//! | helper → gateway | response to [`CALL_ID`]                  |
//!
//! Inbound lines are decoded into the closed [`InboundMessage`] union; the
//! payload of a successful `tools/call` is reduced by [`ToolPayload`].

use serde::Serialize;
use serde_json::{json, Value};

/// Request id of the `initialize` request.
pub const INIT_ID: u64 = 1;

/// Request id of the `tools/call` request.
pub const CALL_ID: u64 = 2;

/// Protocol revision announced in `initialize`.
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Client identity announced in `initialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "tool-gateway".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// A JSON-RPC request or notification sent to the helper.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    jsonrpc: &'static str,
    /// Request id; `None` for notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Method name.
    pub method: &'static str,
    /// Method parameters.
    pub params: Value,
}

impl OutboundMessage {
    /// The opening `initialize` request.
    #[must_use]
    pub fn initialize(client: &ClientInfo) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Some(INIT_ID),
            method: "initialize",
            params: json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": client,
            }),
        }
    }

    /// The `notifications/initialized` notification that closes the handshake.
    #[must_use]
    pub fn initialized() -> Self {
        Self {
            jsonrpc: "2.0",
            id: None,
            method: "notifications/initialized",
            params: json!({}),
        }
    }

    /// The single functional `tools/call` request.
    #[must_use]
    pub fn tools_call(name: &str, arguments: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Some(CALL_ID),
            method: "tools/call",
            params: json!({ "name": name, "arguments": arguments }),
        }
    }

    /// Whether this message expects a response.
    #[must_use]
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// A JSON-RPC `error` object.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcError {
    /// Error code, if supplied.
    pub code: Option<i64>,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    pub data: Option<Value>,
}

impl RpcError {
    /// Interpret whatever the helper put under `error`.
    ///
    /// A bare string is taken as the message; an object without a message
    /// is rendered as JSON so the caller still sees something descriptive.
    fn from_value(value: Value) -> Self {
        match value {
            Value::String(message) => Self {
                code: None,
                message,
                data: None,
            },
            Value::Object(mut fields) => {
                let code = fields.get("code").and_then(Value::as_i64);
                let data = fields.remove("data");
                let message = match fields.remove("message") {
                    Some(Value::String(message)) => message,
                    Some(other) => other.to_string(),
                    None => Value::Object(fields).to_string(),
                };
                Self {
                    code,
                    message,
                    data,
                }
            }
            other => Self {
                code: None,
                message: other.to_string(),
                data: None,
            },
        }
    }
}

/// A decoded line from the helper.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// A response carrying `error`, whatever else it carries.
    Failure {
        /// Numeric id, if present.
        id: Option<u64>,
        /// The error payload.
        error: RpcError,
    },
    /// A response carrying a `result` key, possibly `null`, and no `error`.
    Success {
        /// Numeric id, if present.
        id: Option<u64>,
        /// The result payload.
        result: Value,
    },
    /// Anything else: server notifications, requests, or stray objects.
    Other,
}

impl InboundMessage {
    /// Decode one framed line.
    ///
    /// Returns `None` for lines that are not JSON objects; those are
    /// discarded by the session, never treated as failures. A present
    /// `result` key makes a success even when its value is `null`; an
    /// `error` of `null` counts as absent.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let Value::Object(mut fields) = serde_json::from_str::<Value>(line).ok()? else {
            return None;
        };
        let id = fields.get("id").and_then(Value::as_u64);

        if let Some(error) = fields.remove("error").filter(|error| !error.is_null()) {
            return Some(Self::Failure {
                id,
                error: RpcError::from_value(error),
            });
        }

        Some(match fields.remove("result") {
            Some(result) => Self::Success { id, result },
            None => Self::Other,
        })
    }
}

/// The possible shapes of a successful `tools/call` result.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolPayload {
    /// `structuredContent` was present and is returned unchanged.
    Structured(Value),
    /// The text of the first `content` item.
    Text(String),
    /// Neither of the above; the whole result is returned.
    Raw(Value),
}

impl ToolPayload {
    /// Classify a result payload, in precedence order.
    #[must_use]
    pub fn classify(result: Value) -> Self {
        if let Some(structured) = result
            .get("structuredContent")
            .filter(|value| !value.is_null())
        {
            return Self::Structured(structured.clone());
        }

        if let Some(text) = first_content_text(&result) {
            return Self::Text(text);
        }

        Self::Raw(result)
    }

    /// Reduce to the value handed back to the caller.
    ///
    /// Text that parses as JSON is returned parsed; otherwise it is wrapped
    /// as `{"raw": text}`.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Structured(value) | Self::Raw(value) => value,
            Self::Text(text) => match serde_json::from_str(&text) {
                Ok(parsed) => parsed,
                Err(_) => json!({ "raw": text }),
            },
        }
    }
}

fn first_content_text(result: &Value) -> Option<String> {
    result
        .get("content")?
        .as_array()?
        .first()?
        .get("text")?
        .as_str()
        .map(str::to_owned)
}

/// Extract the caller-facing value from a `tools/call` result.
#[must_use]
pub fn extract_tool_result(result: Value) -> Value {
    ToolPayload::classify(result).into_value()
}
