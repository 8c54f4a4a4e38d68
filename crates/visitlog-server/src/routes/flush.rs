use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

/// `POST /api/analytics/flush`: ask the flush worker to write the buffer now.
///
/// Returns `202 {"ok": true, "pending": n}` without waiting for the write;
/// `n` is the number of events buffered when the flush was requested.
pub async fn flush(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let pending = state.pipeline.buffer().pending().await;
    let requested = state.pipeline.force_flush().await;
    tracing::debug!(pending, requested, "Manual flush requested");
    (
        StatusCode::ACCEPTED,
        Json(json!({ "ok": true, "pending": pending })),
    )
}
