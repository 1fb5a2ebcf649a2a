//! Wire protocol encoding: canonical output events and their SSE frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events emitted to clients over the SSE stream.
///
/// This is a closed set; the protocol never emits an unrecognized kind.
/// Each event serializes as `{"type": ..., "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental assistant text.
    Token { text: String },

    /// The agent invoked a tool.
    ToolCall { tool: String, input: Value },

    /// A tool produced a result. Tool-reported failure payloads arrive here
    /// too; they are data, not protocol errors.
    ToolResult { tool: String, result: Value },

    /// Stream-level failure surfaced to the client.
    Error { message: String },

    /// End of stream. The final event on every non-cancelled stream.
    Done {},
}

impl StreamEvent {
    /// Envelope JSON: `{"type": ..., "data": {...}}`.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Full SSE frame: `data: <json>\n\n`.
    pub fn to_sse(&self) -> String {
        format!("data: {}\n\n", self.to_json())
    }
}
