//! Stream translator: upstream engine events into canonical protocol events.
//!
//! One translator instance exists per request. It pulls upstream events one
//! at a time, so it never buffers the stream or runs ahead of the transport,
//! and it owns the request-scoped correlation table pairing tool-end events
//! with the records their tool-start created.

use std::collections::{HashMap, VecDeque};

use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;
use tracing::debug;

use crate::engine::{EngineError, EventStream, UpstreamEvent};
use crate::normalize::extract_chunk_text;
use crate::sse::StreamEvent;
use crate::trace::{CallStatus, TraceContext, TraceSummary};

/// Error code recorded when the engine reports a tool crashed.
const TOOL_EXCEPTION: &str = "TOOL_EXCEPTION";
/// Error code recorded when the upstream sequence itself fails.
const STREAM_ERROR: &str = "STREAM_ERROR";

type SummarySink = Box<dyn FnOnce(TraceSummary) + Send>;

/// Releases the trace on every exit path: explicitly when the stream ends,
/// via `Drop` when the consumer disconnects mid-flight.
struct TraceGuard {
    trace: Option<TraceContext>,
    sink: Option<SummarySink>,
}

impl TraceGuard {
    fn new(trace: Option<TraceContext>, sink: SummarySink) -> Self {
        Self {
            trace,
            sink: Some(sink),
        }
    }

    fn trace_mut(&mut self) -> Option<&mut TraceContext> {
        self.trace.as_mut()
    }

    /// Hand off the summary. Idempotent; later calls (and `Drop`) are no-ops.
    fn finish(&mut self) {
        if let (Some(trace), Some(sink)) = (self.trace.take(), self.sink.take()) {
            sink(trace.summary());
        }
    }
}

impl Drop for TraceGuard {
    fn drop(&mut self) {
        self.finish();
    }
}

struct State {
    upstream: EventStream,
    guard: TraceGuard,
    /// run_id -> call_id for in-flight tool invocations, this request only.
    /// Entries are removed on the first matching end; misses are ignored.
    active_calls: HashMap<String, u64>,
    pending: VecDeque<StreamEvent>,
    finished: bool,
}

/// Translate an upstream event sequence into the client-facing protocol.
///
/// The output preserves upstream arrival order and always ends with `done`
/// unless the stream is cancelled. The trace summary is handed to
/// `on_summary` exactly once on every exit path — normal completion, stream
/// failure, and the consumer dropping the stream mid-flight.
pub fn stream_agent_response(
    upstream: EventStream,
    trace: Option<TraceContext>,
    on_summary: impl FnOnce(TraceSummary) + Send + 'static,
) -> impl Stream<Item = StreamEvent> + Send {
    let state = State {
        upstream,
        guard: TraceGuard::new(trace, Box::new(on_summary)),
        active_calls: HashMap::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((event, state));
            }
            if state.finished {
                state.guard.finish();
                return None;
            }

            match state.upstream.next().await {
                Some(Ok(event)) => {
                    if let Some(out) = translate_event(event, &mut state) {
                        state.pending.push_back(out);
                    }
                }
                Some(Err(EngineError::Cancelled)) => {
                    // Client gone: no error, no done. The guard still
                    // releases the trace.
                    debug!("stream cancelled by consumer");
                    state.finished = true;
                    state.guard.finish();
                    return None;
                }
                Some(Err(err)) => {
                    let message = err.to_string();
                    if let Some(trace) = state.guard.trace_mut() {
                        trace.add_error(STREAM_ERROR, &message, None);
                    }
                    state.pending.push_back(StreamEvent::Error { message });
                    state.pending.push_back(StreamEvent::Done {});
                    state.finished = true;
                }
                None => {
                    state.pending.push_back(StreamEvent::Done {});
                    state.finished = true;
                }
            }
        }
    })
}

/// Map one upstream event to at most one protocol event, updating the trace
/// and correlation table along the way.
fn translate_event(event: UpstreamEvent, state: &mut State) -> Option<StreamEvent> {
    match event {
        UpstreamEvent::ModelStreamChunk { chunk } => {
            let text = extract_chunk_text(&chunk);
            if text.is_empty() {
                None
            } else {
                Some(StreamEvent::Token { text })
            }
        }

        UpstreamEvent::ToolStart { run_id, name, input } => {
            if let Some(trace) = state.guard.trace_mut() {
                let call_id = trace.start_tool(&name);
                state.active_calls.insert(run_id, call_id);
            }
            Some(StreamEvent::ToolCall { tool: name, input })
        }

        UpstreamEvent::ToolEnd { run_id, name, output } => {
            let failure = tool_failure(&output);
            if let Some(trace) = state.guard.trace_mut() {
                if let Some(call_id) = state.active_calls.remove(&run_id) {
                    match &failure {
                        Some((code, message)) => {
                            trace.end_tool(call_id, CallStatus::Error, Some(code.clone()));
                            trace.add_error(code, message, Some(name.as_str()));
                        }
                        None => trace.end_tool(call_id, CallStatus::Success, None),
                    }
                }
            }
            Some(StreamEvent::ToolResult {
                tool: name,
                result: normalize_result(output),
            })
        }

        UpstreamEvent::ToolError { run_id, name, error } => {
            if let Some(trace) = state.guard.trace_mut() {
                if let Some(call_id) = state.active_calls.remove(&run_id) {
                    trace.end_tool(call_id, CallStatus::Error, Some(TOOL_EXCEPTION.to_string()));
                    trace.add_error(TOOL_EXCEPTION, &error, Some(name.as_str()));
                }
            }
            // Intentionally no client-visible event; the trace carries it.
            None
        }

        UpstreamEvent::Other => None,
    }
}

/// A tool result payload marks its own failure with `success: false` plus
/// optional `error_code`/`error_message` fields.
fn tool_failure(output: &Value) -> Option<(String, String)> {
    let fields = output.as_object()?;
    if fields.get("success").and_then(Value::as_bool) != Some(false) {
        return None;
    }
    let code = fields
        .get("error_code")
        .and_then(Value::as_str)
        .unwrap_or("UNKNOWN")
        .to_string();
    let message = fields
        .get("error_message")
        .and_then(Value::as_str)
        .unwrap_or("Unknown error")
        .to_string();
    Some((code, message))
}

/// Objects and strings pass through; anything else is stringified.
fn normalize_result(output: Value) -> Value {
    match output {
        Value::Object(_) | Value::String(_) => output,
        other => Value::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;

    fn upstream(items: Vec<Result<UpstreamEvent, EngineError>>) -> EventStream {
        Box::pin(stream::iter(items))
    }

    fn events(items: Vec<UpstreamEvent>) -> EventStream {
        upstream(items.into_iter().map(Ok).collect())
    }

    /// Collect the full output stream and the summary it hands off.
    async fn run_traced(source: EventStream) -> (Vec<StreamEvent>, TraceSummary) {
        let slot: Arc<Mutex<Option<TraceSummary>>> = Arc::new(Mutex::new(None));
        let sink = slot.clone();
        let out: Vec<StreamEvent> = stream_agent_response(
            source,
            Some(TraceContext::new(None)),
            move |summary| *sink.lock().unwrap() = Some(summary),
        )
        .collect()
        .await;
        let summary = slot.lock().unwrap().take().expect("summary should be produced");
        (out, summary)
    }

    fn chunk(payload: Value) -> UpstreamEvent {
        UpstreamEvent::ModelStreamChunk { chunk: payload }
    }

    fn tool_start(run_id: &str, name: &str) -> UpstreamEvent {
        UpstreamEvent::ToolStart {
            run_id: run_id.to_string(),
            name: name.to_string(),
            input: json!({"query": "aspirin"}),
        }
    }

    fn tool_end(run_id: &str, name: &str, output: Value) -> UpstreamEvent {
        UpstreamEvent::ToolEnd {
            run_id: run_id.to_string(),
            name: name.to_string(),
            output,
        }
    }

    #[tokio::test]
    async fn test_single_tool_round_trip() {
        let source = events(vec![
            tool_start("r1", "get_medication_by_name"),
            tool_end("r1", "get_medication_by_name", json!({"success": true, "med_id": 7})),
        ]);
        let (out, summary) = run_traced(source).await;

        assert_eq!(
            out,
            vec![
                StreamEvent::ToolCall {
                    tool: "get_medication_by_name".to_string(),
                    input: json!({"query": "aspirin"}),
                },
                StreamEvent::ToolResult {
                    tool: "get_medication_by_name".to_string(),
                    result: json!({"success": true, "med_id": 7}),
                },
                StreamEvent::Done {},
            ]
        );

        assert_eq!(summary.tool_details.len(), 1);
        assert_eq!(summary.tool_details[0].status, CallStatus::Success);
        assert!(summary.tool_details[0].latency_ms.is_some());
        assert!(summary.success);
    }

    #[tokio::test]
    async fn test_overlapping_calls_complete_out_of_order() {
        // r2 finishes before r1; each end must update its own record.
        let source = events(vec![
            tool_start("r1", "get_medication_by_name"),
            tool_start("r2", "check_inventory"),
            tool_end(
                "r2",
                "check_inventory",
                json!({"success": false, "error_code": "NOT_FOUND", "error_message": "No stock row"}),
            ),
            tool_end("r1", "get_medication_by_name", json!({"success": true})),
        ]);
        let (out, summary) = run_traced(source).await;

        assert_eq!(out.len(), 5); // 2 tool_call + 2 tool_result + done
        assert_eq!(
            summary.tools_called,
            vec!["get_medication_by_name", "check_inventory"]
        );

        let details = &summary.tool_details;
        assert_eq!(details[0].call_id, 1);
        assert_eq!(details[0].status, CallStatus::Success);
        assert_eq!(details[0].error_code, None);
        assert_eq!(details[1].call_id, 2);
        assert_eq!(details[1].status, CallStatus::Error);
        assert_eq!(details[1].error_code.as_deref(), Some("NOT_FOUND"));

        // The tool-reported failure is data, not a protocol error.
        assert!(!out.iter().any(|e| matches!(e, StreamEvent::Error { .. })));
        assert!(!summary.success);
        let errors = summary.errors.unwrap();
        assert_eq!(errors[0].error_code, "NOT_FOUND");
        assert_eq!(errors[0].tool_name.as_deref(), Some("check_inventory"));
    }

    #[tokio::test]
    async fn test_consumer_drop_still_hands_off_summary() {
        let slot: Arc<Mutex<Option<TraceSummary>>> = Arc::new(Mutex::new(None));
        let sink = slot.clone();

        let source = events(vec![
            chunk(json!("Hel")),
            tool_start("r1", "check_inventory"),
            chunk(json!("lo")),
        ]);
        let mut stream = Box::pin(stream_agent_response(
            source,
            Some(TraceContext::new(None)),
            move |summary| *sink.lock().unwrap() = Some(summary),
        ));

        assert_eq!(
            stream.next().await,
            Some(StreamEvent::Token {
                text: "Hel".to_string()
            })
        );
        assert!(matches!(
            stream.next().await,
            Some(StreamEvent::ToolCall { .. })
        ));

        // Client disconnects: drop the output stream mid-flight.
        drop(stream);

        let summary = slot.lock().unwrap().take().expect("summary despite cancellation");
        assert_eq!(summary.tools_called, vec!["check_inventory"]);
        assert_eq!(summary.tool_details[0].status, CallStatus::InProgress);
        assert!(summary.tool_details[0].latency_ms.is_none());
        assert!(summary.success);
    }

    #[tokio::test]
    async fn test_engine_cancellation_ends_stream_silently() {
        let source = upstream(vec![
            Ok(chunk(json!("partial"))),
            Err(EngineError::Cancelled),
            Ok(chunk(json!("never seen"))),
        ]);
        let (out, summary) = run_traced(source).await;

        // No error, no done after cancellation.
        assert_eq!(
            out,
            vec![StreamEvent::Token {
                text: "partial".to_string()
            }]
        );
        assert!(summary.success);
    }

    #[tokio::test]
    async fn test_stream_failure_emits_error_then_done() {
        let source = upstream(vec![
            Ok(chunk(json!("Hi"))),
            Err(EngineError::Stream("boom".to_string())),
        ]);
        let (out, summary) = run_traced(source).await;

        assert_eq!(
            out,
            vec![
                StreamEvent::Token {
                    text: "Hi".to_string()
                },
                StreamEvent::Error {
                    message: "boom".to_string()
                },
                StreamEvent::Done {},
            ]
        );

        assert!(!summary.success);
        let errors = summary.errors.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_code, "STREAM_ERROR");
        assert_eq!(errors[0].message, "boom");
    }

    #[tokio::test]
    async fn test_tool_error_event_is_trace_only() {
        let source = events(vec![
            tool_start("r1", "prescription_management"),
            UpstreamEvent::ToolError {
                run_id: "r1".to_string(),
                name: "prescription_management".to_string(),
                error: "connection reset".to_string(),
            },
        ]);
        let (out, summary) = run_traced(source).await;

        // tool_call then done; the crash never becomes a client event.
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], StreamEvent::ToolCall { .. }));
        assert_eq!(out[1], StreamEvent::Done {});

        assert_eq!(summary.tool_details[0].status, CallStatus::Error);
        assert_eq!(
            summary.tool_details[0].error_code.as_deref(),
            Some("TOOL_EXCEPTION")
        );
        let errors = summary.errors.unwrap();
        assert_eq!(errors[0].error_code, "TOOL_EXCEPTION");
        assert_eq!(errors[0].message, "connection reset");
    }

    #[tokio::test]
    async fn test_duplicate_tool_end_leaves_record_unchanged() {
        let source = events(vec![
            tool_start("r1", "check_inventory"),
            tool_end("r1", "check_inventory", json!({"success": true})),
            tool_end(
                "r1",
                "check_inventory",
                json!({"success": false, "error_code": "INTERNAL", "error_message": "late dup"}),
            ),
        ]);
        let (out, summary) = run_traced(source).await;

        // The duplicate still emits a tool_result (the payload is data),
        // but the record keeps its first completion.
        assert_eq!(out.len(), 4); // tool_call + 2 tool_result + done
        assert_eq!(summary.tool_details.len(), 1);
        assert_eq!(summary.tool_details[0].status, CallStatus::Success);
        assert!(summary.errors.is_none());
    }

    #[tokio::test]
    async fn test_unmatched_tool_end_emits_result_without_trace() {
        let source = events(vec![tool_end("r9", "check_inventory", json!({"success": true}))]);
        let (out, summary) = run_traced(source).await;

        assert_eq!(out.len(), 2); // tool_result + done
        assert!(summary.tool_details.is_empty());
        assert!(summary.success);
    }

    #[tokio::test]
    async fn test_empty_and_unrecognized_events_suppressed() {
        let source = events(vec![
            chunk(json!("")),
            chunk(json!([])),
            chunk(json!({"no": "text"})),
            UpstreamEvent::Other,
        ]);
        let (out, _) = run_traced(source).await;
        assert_eq!(out, vec![StreamEvent::Done {}]);
    }

    #[tokio::test]
    async fn test_interleaving_preserved() {
        let source = events(vec![
            chunk(json!("Let me check. ")),
            tool_start("r1", "check_inventory"),
            chunk(json!([{"type": "text", "text": "One "}, "moment."])),
            tool_end("r1", "check_inventory", json!({"success": true})),
        ]);
        let (out, _) = run_traced(source).await;

        assert_eq!(out.len(), 5);
        assert!(matches!(&out[0], StreamEvent::Token { text } if text == "Let me check. "));
        assert!(matches!(out[1], StreamEvent::ToolCall { .. }));
        assert!(matches!(&out[2], StreamEvent::Token { text } if text == "One moment."));
        assert!(matches!(out[3], StreamEvent::ToolResult { .. }));
        assert_eq!(out[4], StreamEvent::Done {});
    }

    #[tokio::test]
    async fn test_non_object_tool_output_stringified() {
        let source = events(vec![
            tool_start("r1", "check_inventory"),
            tool_end("r1", "check_inventory", json!([1, 2, 3])),
        ]);
        let (out, _) = run_traced(source).await;

        match &out[1] {
            StreamEvent::ToolResult { result, .. } => {
                assert_eq!(result, &json!("[1,2,3]"));
            }
            other => panic!("expected tool_result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_without_trace_context_sink_never_fires() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();

        let source = events(vec![chunk(json!("hi"))]);
        let out: Vec<StreamEvent> = stream_agent_response(source, None, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .collect()
        .await;

        assert_eq!(out.len(), 2); // token + done
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_summary_handed_off_exactly_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();

        let source = events(vec![chunk(json!("hi"))]);
        let stream = stream_agent_response(
            source,
            Some(TraceContext::new(None)),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );
        let out: Vec<StreamEvent> = stream.collect().await;

        assert_eq!(out.len(), 2);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
