//! Eight-point latency tracing for a client/server request pipeline.
//!
//! Sampled requests carry a [`trace::Span`] through every pipeline stage;
//! finished spans land in a shared [`trace::SpanCollector`] that produces
//! nearest-rank percentile summaries per phase on demand.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub mod config;
pub mod handlers;
pub mod load_generator;
pub mod logging;
pub mod pipeline;
pub mod server;
pub mod trace;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Span collector for the current session; reset at each benchmark start.
    pub collector: Arc<trace::SpanCollector>,

    /// Backing store every pipeline run executes against.
    pub fs: Arc<pipeline::MemFs>,

    /// Pipeline defaults from the config file.
    pub pipeline: config::PipelineConfig,

    /// Flag checked by every load-generator worker on each iteration.
    pub load_running: Arc<AtomicBool>,

    /// Handle to the spawned load-generator task so we can await clean shutdown.
    pub load_handle: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,

    /// Most recently started run.
    pub last_run: parking_lot::Mutex<Option<handlers::benchmark::RunInfo>>,
}

impl AppState {
    pub fn new(
        collector: Arc<trace::SpanCollector>,
        fs: Arc<pipeline::MemFs>,
        pipeline: config::PipelineConfig,
    ) -> Self {
        Self {
            collector,
            fs,
            pipeline,
            load_running: Arc::new(AtomicBool::new(false)),
            load_handle: tokio::sync::Mutex::new(None),
            last_run: parking_lot::Mutex::new(None),
        }
    }
}
