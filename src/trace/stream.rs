use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    Json,
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use super::collector::CollectorStats;
use crate::AppState;

// ─── GET /api/trace/summary ──────────────────────────────────────
/// Returns a single JSON summary, or 204 when nothing was recorded.

pub async fn get_summary(State(state): State<Arc<AppState>>) -> Response {
    match state.collector.summary() {
        Some(summary) => Json(summary).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

// ─── GET /api/trace/stats ────────────────────────────────────────

pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<CollectorStats> {
    Json(state.collector.stats())
}

// ─── GET /api/trace/stream ───────────────────────────────────────
/// Server-Sent Events endpoint.
/// Pushes the current summary every 500 ms, or a `no-data` event while
/// the collector is empty.

pub async fn summary_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let interval = tokio::time::interval(Duration::from_millis(500));

    let stream = IntervalStream::new(interval).map(move |_| {
        let event = match state.collector.summary_json() {
            Some(json) => Event::default().event("summary").data(json),
            None => Event::default().event("no-data").data("{}"),
        };
        Ok(event)
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
