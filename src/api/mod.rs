//! HTTP surface: REST endpoints and the letter event WebSocket.

pub mod error;
pub mod identity;
mod routes;
pub mod ws;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use crate::letters::service::LetterWorkflow;

pub use error::ApiError;
pub use identity::Identity;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct ApiState {
    pub workflow: Arc<LetterWorkflow>,
}

/// Build the Axum router with letter REST and WebSocket routes.
pub fn letter_routes(workflow: Arc<LetterWorkflow>) -> Router {
    let state = ApiState { workflow };

    Router::new()
        .route("/health", get(routes::health))
        .route(
            "/api/letters",
            get(routes::list_letters).post(routes::create_letter),
        )
        .route("/api/letters/intake", post(routes::intake_letter))
        .route(
            "/api/letters/{id}",
            get(routes::get_letter).put(routes::act),
        )
        .route(
            "/api/letters/{id}/classification",
            post(routes::apply_classification),
        )
        .route("/api/letters/{id}/submit", post(routes::final_submit))
        .route("/api/letters/{id}/resubmit", post(routes::resubmit))
        .route("/api/analytics", get(routes::analytics))
        .route("/ws/letters", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
