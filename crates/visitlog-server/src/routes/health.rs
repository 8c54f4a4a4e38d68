use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::{error::AppError, state::AppState};

/// `GET /health`: liveness check.
///
/// `200 {"status": "ok", "version": ...}` when DuckDB answers a ping,
/// otherwise `503` with the `unavailable` error envelope.
#[tracing::instrument(skip(state))]
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    match state.db.ping().await {
        Ok(()) => Ok(Json(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        }))),
        Err(e) => {
            tracing::error!(error = %e, "Health check: DuckDB unreachable");
            Err(AppError::Unavailable)
        }
    }
}
