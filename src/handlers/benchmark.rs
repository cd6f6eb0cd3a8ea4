use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::load_generator::LoadPlan;
use crate::pipeline::{self, DispatchConfig};
use crate::AppState;

use super::AppError;

// ─── Request / response types ────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct BenchmarkConfig {
    /// Number of concurrent Tokio tasks generating load
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// How long the benchmark runs (seconds)
    #[serde(default = "default_duration")]
    pub duration_secs: u64,

    /// Percentage of operations that are reads (0–100)
    #[serde(default = "default_read_pct")]
    pub read_pct: u8,

    /// Overrides the configured trace rate for this run
    #[serde(default)]
    pub trace_rate: Option<u64>,

    /// Overrides the configured reader pool size for this run
    #[serde(default)]
    pub reader_pool_size: Option<usize>,
}

fn default_concurrency() -> u32 {
    10
}
fn default_duration() -> u64 {
    30
}
fn default_read_pct() -> u8 {
    70
}

/// Identity of the most recent run.
#[derive(Debug, Clone, Serialize)]
pub struct RunInfo {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub trace_rate: u64,
    pub reader_pool_size: usize,
}

#[derive(Debug, Serialize)]
pub struct BenchmarkStatus {
    pub running: bool,
    pub message: String,
    pub run: Option<RunInfo>,
}

// ─── POST /api/benchmark/start ───────────────────────────────────

pub async fn start_benchmark(
    State(state): State<Arc<AppState>>,
    Json(config): Json<BenchmarkConfig>,
) -> Result<Json<BenchmarkStatus>, AppError> {
    // Validate inputs
    if config.concurrency == 0 || config.concurrency > 500 {
        return Err(AppError::BadRequest(
            "concurrency must be between 1 and 500".into(),
        ));
    }
    if config.duration_secs == 0 || config.duration_secs > 300 {
        return Err(AppError::BadRequest(
            "duration_secs must be between 1 and 300".into(),
        ));
    }
    if config.read_pct > 100 {
        return Err(AppError::BadRequest(
            "read_pct must be between 0 and 100".into(),
        ));
    }
    let reader_pool_size = config
        .reader_pool_size
        .unwrap_or(state.pipeline.reader_pool_size);
    if reader_pool_size == 0 || reader_pool_size > 256 {
        return Err(AppError::BadRequest(
            "reader_pool_size must be between 1 and 256".into(),
        ));
    }
    let trace_rate = config.trace_rate.unwrap_or(state.pipeline.trace_rate);

    // Guard: only one benchmark at a time. Claiming the flag is atomic, and
    // it is set BEFORE spawning so workers see it immediately
    if state
        .load_running
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(AppError::AlreadyRunning);
    }

    // Reset spans for a clean run
    state.collector.reset();

    let run = RunInfo {
        run_id: Uuid::new_v4(),
        started_at: Utc::now(),
        trace_rate,
        reader_pool_size,
    };
    let msg = format!(
        "Started: {} workers × {}s, {}% reads, {} readers, trace_rate {}",
        config.concurrency, config.duration_secs, config.read_pct, reader_pool_size, trace_rate,
    );
    info!(run_id = %run.run_id, plan = %msg, "benchmark started");

    // Tracing is fully elided when the rate is 0: no collector attached
    let client = pipeline::connect(
        DispatchConfig {
            reader_pool_size,
            trace_rate,
            collector: (trace_rate > 0).then(|| state.collector.clone()),
            ..DispatchConfig::default()
        },
        state.fs.clone(),
    );

    let running = state.load_running.clone();
    let plan = LoadPlan {
        concurrency: config.concurrency,
        duration_secs: config.duration_secs,
        read_pct: config.read_pct,
    };
    let handle = tokio::spawn(async move {
        crate::load_generator::run(running, client, plan).await;
    });

    // Stash the handle so `stop` can await clean shutdown
    *state.load_handle.lock().await = Some(handle);
    *state.last_run.lock() = Some(run.clone());

    Ok(Json(BenchmarkStatus {
        running: true,
        message: msg,
        run: Some(run),
    }))
}

// ─── POST /api/benchmark/stop ────────────────────────────────────

pub async fn stop_benchmark(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BenchmarkStatus>, AppError> {
    let run = state.last_run.lock().clone();
    if !state.load_running.load(Ordering::SeqCst) {
        return Ok(Json(BenchmarkStatus {
            running: false,
            message: "No benchmark is running".into(),
            run,
        }));
    }

    // Signal all workers to stop
    state.load_running.store(false, Ordering::SeqCst);

    // Await the load-generator task so we know it's fully stopped
    let mut guard = state.load_handle.lock().await;
    if let Some(handle) = guard.take() {
        // Ignore JoinError: the task may have already finished
        let _ = handle.await;
    }

    Ok(Json(BenchmarkStatus {
        running: false,
        message: "Benchmark stopped".into(),
        run,
    }))
}

// ─── GET /api/benchmark/status ───────────────────────────────────

pub async fn benchmark_status(
    State(state): State<Arc<AppState>>,
) -> Json<BenchmarkStatus> {
    let running = state.load_running.load(Ordering::SeqCst);
    Json(BenchmarkStatus {
        running,
        message: if running {
            "Benchmark in progress".into()
        } else {
            "Idle".into()
        },
        run: state.last_run.lock().clone(),
    })
}
