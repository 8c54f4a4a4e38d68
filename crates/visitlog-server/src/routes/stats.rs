use std::sync::Arc;

use axum::{extract::State, Json};

use visitlog_core::analytics::AnalyticsSnapshot;

use crate::{error::AppError, state::AppState};

/// `GET /api/analytics/stats`: current usage snapshot.
///
/// Forces a flush and waits briefly for it, so a page view tracked just
/// before this call is included. Never fails: store errors produce the
/// all-zero snapshot.
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<AnalyticsSnapshot> {
    Json(state.pipeline.snapshot().await)
}

/// Fallback for unknown `/api/*` paths.
pub async fn api_not_found(uri: axum::http::Uri) -> AppError {
    AppError::NotFound(format!("no API route for {}", uri.path()))
}
