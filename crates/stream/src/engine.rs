//! Reasoning-engine boundary: the upstream event model and producer trait.
//!
//! The engine is an opaque collaborator. It emits a sequence of execution
//! events (token chunks, tool start/end/error notices) which the translator
//! in [`crate::translate`] turns into the client-facing protocol.

use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use pharma_core::chat::{ChatMessage, Role};

/// One item in the execution trace of an engine run.
///
/// Decoded once at this boundary; downstream code matches on variants and
/// never inspects raw payloads for a `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpstreamEvent {
    /// Incremental model output. The chunk payload shape varies by engine:
    /// plain string, list of strings, or list of content-part objects.
    ModelStreamChunk { chunk: Value },

    /// A tool invocation has started. `run_id` identifies this in-flight
    /// invocation only; engines may reuse it for unrelated runs later.
    ToolStart {
        run_id: String,
        name: String,
        input: Value,
    },

    /// The tool finished and produced a result payload. A payload carrying
    /// `success: false` is a tool-reported failure, which is still data.
    ToolEnd {
        run_id: String,
        name: String,
        output: Value,
    },

    /// The engine reports the tool itself crashed (rare; distinct from a
    /// tool returning a failure payload).
    ToolError {
        run_id: String,
        name: String,
        error: String,
    },

    /// Any event kind this protocol does not recognize.
    #[serde(other)]
    Other,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The consumer/transport disconnected; not a failure.
    #[error("stream cancelled by consumer")]
    Cancelled,

    /// The event sequence itself failed mid-run.
    #[error("{0}")]
    Stream(String),

    /// The engine could not start a run.
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Stream of upstream events produced by one engine run.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<UpstreamEvent, EngineError>> + Send>>;

/// Trait for reasoning engines that emit execution events as they run.
///
/// This trait lives here (not in an engine crate) because it's defined by
/// the consumer (the stream translator), not the producer. Implementations
/// live in engine integration crates.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// Start one run over the conversation history and stream its events.
    async fn stream_events(&self, messages: Vec<ChatMessage>)
        -> Result<EventStream, EngineError>;

    /// Engine name for logging/debugging (e.g. "echo", "openai").
    fn engine_name(&self) -> &str;
}

/// Dev engine that replays the latest user message as token chunks and never
/// calls tools. Lets the server run end-to-end without a model backend.
pub struct EchoEngine;

#[async_trait]
impl ReasoningEngine for EchoEngine {
    async fn stream_events(
        &self,
        messages: Vec<ChatMessage>,
    ) -> Result<EventStream, EngineError> {
        let reply = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        // Split on whitespace boundaries so the token path is exercised.
        let chunks: Vec<Result<UpstreamEvent, EngineError>> = reply
            .split_inclusive(' ')
            .map(|piece| {
                Ok(UpstreamEvent::ModelStreamChunk {
                    chunk: Value::String(piece.to_string()),
                })
            })
            .collect();

        Ok(Box::pin(stream::iter(chunks)))
    }

    fn engine_name(&self) -> &str {
        "echo"
    }
}

/// Mock engine for testing the translator and server without a real backend.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Returns pre-scripted event sequences, one per `stream_events` call.
    pub struct MockEngine {
        runs: Mutex<Vec<Vec<Result<UpstreamEvent, EngineError>>>>,
    }

    impl MockEngine {
        pub fn new() -> Self {
            Self {
                runs: Mutex::new(Vec::new()),
            }
        }

        /// Queue a full run script, including mid-stream errors.
        pub fn queue_run(&self, items: Vec<Result<UpstreamEvent, EngineError>>) {
            self.runs.lock().unwrap().push(items);
        }

        /// Queue a run of well-formed events.
        pub fn queue_events(&self, events: Vec<UpstreamEvent>) {
            self.queue_run(events.into_iter().map(Ok).collect());
        }
    }

    impl Default for MockEngine {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl ReasoningEngine for MockEngine {
        async fn stream_events(
            &self,
            _messages: Vec<ChatMessage>,
        ) -> Result<EventStream, EngineError> {
            let items = self.runs.lock().unwrap().pop().unwrap_or_default();
            Ok(Box::pin(stream::iter(items)))
        }

        fn engine_name(&self) -> &str {
            "mock"
        }
    }
}
