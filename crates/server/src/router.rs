//! HTTP router construction.
//!
//! Assembles the routes, middleware, and OpenAPI docs into a single `Router`.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::api;
use crate::state::AppState;

/// Build the complete application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/chat/stream", post(api::chat_stream))
        .merge(Scalar::with_url("/docs", api::ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
