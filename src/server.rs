use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::trace::stream;
use crate::AppState;

/// Builds the diagnostics `Router`: benchmark control plus span summaries.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Benchmark control ───────────────────────────────────
        .route(
            "/api/benchmark/start",
            post(handlers::benchmark::start_benchmark),
        )
        .route(
            "/api/benchmark/stop",
            post(handlers::benchmark::stop_benchmark),
        )
        .route(
            "/api/benchmark/status",
            get(handlers::benchmark::benchmark_status),
        )
        // ── Span telemetry ──────────────────────────────────────
        .route("/api/trace/summary", get(stream::get_summary))
        .route("/api/trace/stats", get(stream::get_stats))
        .route("/api/trace/stream", get(stream::summary_stream))
        // ── Provide shared state to all routes above ────────────
        .with_state(state)
        .layer(CorsLayer::permissive())
}
