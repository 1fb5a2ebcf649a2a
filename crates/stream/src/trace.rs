//! Request tracing: correlation ids, per-tool timings, and error records.
//!
//! One [`TraceContext`] exists per inbound request. It is owned by the
//! request's processing lifetime and produces exactly one [`TraceSummary`]
//! when that lifetime ends, on every exit path.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of one tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    InProgress,
    Success,
    Error,
}

/// Timing record for a single tool execution.
///
/// Created by [`TraceContext::start_tool`]; completed at most once by
/// [`TraceContext::end_tool`], which is the only mutation path.
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    call_id: u64,
    tool_name: String,
    start_time: Instant,
    end_time: Option<Instant>,
    status: CallStatus,
    error_code: Option<String>,
}

impl ToolCallRecord {
    pub fn call_id(&self) -> u64 {
        self.call_id
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn status(&self) -> CallStatus {
        self.status
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error_code.as_deref()
    }

    /// Milliseconds between start and end; `None` while in progress.
    pub fn latency_ms(&self) -> Option<f64> {
        self.end_time
            .map(|end| end.duration_since(self.start_time).as_secs_f64() * 1000.0)
    }
}

/// One recorded error with a wall-clock timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub error_code: String,
    pub message: String,
    pub tool_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Context for a single request trace.
#[derive(Debug)]
pub struct TraceContext {
    request_id: String,
    start_time: Instant,
    user_id: Option<String>,
    tool_calls: Vec<ToolCallRecord>,
    errors: Vec<ErrorRecord>,
    next_call_id: u64,
}

impl TraceContext {
    pub fn new(user_id: Option<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            start_time: Instant::now(),
            user_id,
            tool_calls: Vec::new(),
            errors: Vec::new(),
            next_call_id: 1,
        }
    }

    /// Correlation token exposed to the caller via the `X-Request-ID` header.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Record tool execution start; returns the call id for [`end_tool`].
    ///
    /// Overlapping in-flight calls to the same tool produce distinct records.
    ///
    /// [`end_tool`]: TraceContext::end_tool
    pub fn start_tool(&mut self, tool_name: &str) -> u64 {
        let call_id = self.next_call_id;
        self.next_call_id += 1;

        self.tool_calls.push(ToolCallRecord {
            call_id,
            tool_name: tool_name.to_string(),
            start_time: Instant::now(),
            end_time: None,
            status: CallStatus::InProgress,
            error_code: None,
        });
        call_id
    }

    /// Record tool execution end.
    ///
    /// Unknown call ids and repeated ends are no-ops; the first end wins.
    pub fn end_tool(&mut self, call_id: u64, status: CallStatus, error_code: Option<String>) {
        let Some(record) = self.tool_calls.iter_mut().find(|r| r.call_id == call_id) else {
            return;
        };
        if record.end_time.is_some() {
            return;
        }
        record.end_time = Some(Instant::now());
        record.status = status;
        record.error_code = error_code;
    }

    /// Record an error. All errors for the request are retained.
    pub fn add_error(&mut self, error_code: &str, message: &str, tool_name: Option<&str>) {
        self.errors.push(ErrorRecord {
            error_code: error_code.to_string(),
            message: message.to_string(),
            tool_name: tool_name.map(String::from),
            timestamp: Utc::now(),
        });
    }

    /// Tool names in call order.
    pub fn tools_called(&self) -> Vec<String> {
        self.tool_calls.iter().map(|r| r.tool_name.clone()).collect()
    }

    pub fn tool_calls(&self) -> &[ToolCallRecord] {
        &self.tool_calls
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    /// Elapsed milliseconds since the request started.
    pub fn total_latency_ms(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64() * 1000.0
    }

    /// Produce the one-per-request structured summary.
    pub fn summary(&self) -> TraceSummary {
        TraceSummary {
            request_id: self.request_id.clone(),
            user_id: self.user_id.clone(),
            tools_called: self.tools_called(),
            tool_details: self.tool_calls.iter().map(ToolCallDetail::from_record).collect(),
            total_latency_ms: round2(self.total_latency_ms()),
            success: self.errors.is_empty(),
            errors: if self.errors.is_empty() {
                None
            } else {
                Some(self.errors.clone())
            },
        }
    }
}

/// One tool call as reported in the summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallDetail {
    pub call_id: u64,
    pub tool: String,
    /// Rounded to two decimals; `None` while the call is in progress.
    pub latency_ms: Option<f64>,
    pub status: CallStatus,
    pub error_code: Option<String>,
}

impl ToolCallDetail {
    fn from_record(record: &ToolCallRecord) -> Self {
        Self {
            call_id: record.call_id,
            tool: record.tool_name.clone(),
            latency_ms: record.latency_ms().map(round2),
            status: record.status,
            error_code: record.error_code.clone(),
        }
    }
}

/// The single structured record describing a request's timings, tool calls,
/// and errors. Handed to the logging collaborator exactly once per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceSummary {
    pub request_id: String,
    pub user_id: Option<String>,
    pub tools_called: Vec<String>,
    pub tool_details: Vec<ToolCallDetail>,
    pub total_latency_ms: f64,
    pub success: bool,
    pub errors: Option<Vec<ErrorRecord>>,
}

fn round2(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}

/// Emit the summary as a single structured log line.
pub fn log_summary(summary: &TraceSummary) {
    let json = serde_json::to_string(summary).unwrap_or_else(|_| "{}".to_string());
    tracing::info!(
        request_id = %summary.request_id,
        success = summary.success,
        total_latency_ms = summary.total_latency_ms,
        summary = %json,
        "request_complete"
    );
}
