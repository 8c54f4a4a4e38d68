use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{routes, state::AppState, tracking::track_requests};

/// Construct the Axum [`Router`] with all routes and middleware attached.
///
/// Only the site pages (and their 404 fallback) pass through
/// [`track_requests`]; `/health` and the `/api` routes are never tracked.
/// Outer layers:
///
/// 1. `TraceLayer`: structured request/response logging via `tracing`.
/// 2. `CorsLayer`: permissive CORS so a dashboard on another origin can read
///    the stats endpoint.
pub fn build_app(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/analytics/stats", get(routes::stats::stats))
        .route("/analytics/flush", post(routes::flush::flush))
        .fallback(routes::stats::api_not_found);

    let site = Router::new()
        .route("/", get(routes::pages::home))
        .route("/about", get(routes::pages::about))
        .fallback(routes::pages::not_found)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.pipeline),
            track_requests,
        ));

    Router::new()
        .route("/health", get(routes::health::health))
        .nest("/api", api)
        .with_state(state)
        .merge(site)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
