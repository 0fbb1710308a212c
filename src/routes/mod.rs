//! Route modules for the inspection server

pub mod forms;
pub mod records;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    autosave: bool,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        autosave: state.autosave().is_some(),
    })
}

/// All routes, without middleware layers
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/health", get(health_check))
        .nest("/api/v1/forms", forms::router())
        .nest("/api/v1/records", records::router())
}

// ============================================================================
// Tests
// ============================================================================
