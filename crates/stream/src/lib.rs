//! Event-stream-to-SSE adapter with request-scoped tracing.
//!
//! Consumes the execution events of a reasoning-engine run (token chunks,
//! tool start/end/error notices) and translates them into the closed SSE
//! protocol served to chat clients, while building a per-request trace of
//! correlated tool calls, timings, and errors.

pub mod engine;
pub mod normalize;
pub mod sse;
pub mod trace;
pub mod translate;

pub use engine::{EchoEngine, EngineError, EventStream, ReasoningEngine, UpstreamEvent};
pub use sse::StreamEvent;
pub use trace::{TraceContext, TraceSummary};
pub use translate::stream_agent_response;
