//! Shared application state.

use std::sync::Arc;

use tracing::{info, warn};

use pharma_core::Config;
use pharma_stream::{EchoEngine, ReasoningEngine};

pub struct AppState {
    /// The configured reasoning engine; `None` leaves the stream endpoint
    /// answering 503 until one is wired up.
    pub engine: Option<Arc<dyn ReasoningEngine>>,
}

impl AppState {
    /// Select the reasoning engine from configuration.
    pub fn from_config(config: &Config) -> Self {
        let engine: Option<Arc<dyn ReasoningEngine>> = match config.agent.engine.as_str() {
            "echo" => {
                info!("using echo engine (dev mode, no model backend)");
                Some(Arc::new(EchoEngine))
            }
            other => {
                warn!(
                    engine = %other,
                    "no reasoning engine configured — /chat/stream will return 503"
                );
                None
            }
        };
        Self { engine }
    }
}
