//! Services module - Handler HTTP di servizio
//!
//! La messaggistica passa interamente dal WebSocket (vedi `ws`); qui restano
//! solo gli endpoint di liveness e di health check.

use crate::core::AppError;
use crate::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Root endpoint - liveness
pub async fn root(State(_state): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, "Server is running!")
}

/// Health check: verifica che lo store risponda
#[instrument(skip(state))]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    state
        .store
        .ping()
        .await
        .inspect_err(|e| warn!("Health check failed: {}", e))?;

    Ok(Json(json!({
        "status": "ok",
        "online_users": state.users_online.online_count(),
    })))
}
