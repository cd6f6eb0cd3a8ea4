use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{error, info, warn};

use trace_bench::config::Config;
use trace_bench::logging::init_logging;
use trace_bench::pipeline::MemFs;
use trace_bench::trace::SpanCollector;
use trace_bench::{server, AppState};

#[tokio::main]
async fn main() {
    println!();
    println!("╔══════════════════════════════════════════════════╗");
    println!("║   🔬  PIPELINE SPAN TRACER                       ║");
    println!("╚══════════════════════════════════════════════════╝");
    println!();

    // ── 1. Config & logging ──────────────────────────────────────
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("❌ {e}");
        std::process::exit(1);
    });
    if let Err(e) = init_logging(&config.log_config()) {
        eprintln!("❌ Cannot initialize logging: {e}");
        std::process::exit(1);
    }

    // ── 2. Seed the in-memory file store ─────────────────────────
    let fs = Arc::new(MemFs::seeded(42));

    // ── 3. One collector per session ─────────────────────────────
    let collector = Arc::new(SpanCollector::new(Some(config.collector.capacity)));
    info!(
        capacity = collector.capacity(),
        trace_rate = config.pipeline.trace_rate,
        reader_pool_size = config.pipeline.reader_pool_size,
        "span collector ready; oldest spans are evicted past capacity"
    );
    if config.pipeline.trace_rate == 0 {
        warn!("trace_rate is 0; runs will not record spans unless overridden");
    }

    let state = Arc::new(AppState::new(
        collector.clone(),
        fs,
        config.pipeline.clone(),
    ));

    // ── 4. Build Axum router ─────────────────────────────────────
    let app = server::create_router(state.clone());

    // ── 5. Bind & serve ──────────────────────────────────────────
    let addr = config.server.bind.as_str();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| {
            eprintln!("❌ Failed to bind to {addr}: {e}");
            std::process::exit(1);
        });

    println!("Server listening on http://{addr}");
    println!("Start a run     → POST /api/benchmark/start");
    println!("Summary JSON    → GET  /api/trace/summary");
    println!("Summary SSE     → GET  /api/trace/stream");
    println!();

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    if let Err(e) = served {
        error!(error = %e, "server exited with error");
    }

    // ── 6. Teardown: stop load, report, export ───────────────────
    state.load_running.store(false, Ordering::SeqCst);
    if let Some(handle) = state.load_handle.lock().await.take() {
        let _ = handle.await;
    }

    collector.print_summary();

    if let Some(path) = &config.collector.export_path {
        match collector.export_json(path) {
            Ok(true) => info!(path = %path.display(), "span summary exported"),
            Ok(false) => info!("no spans recorded; nothing exported"),
            Err(e) => error!(error = %e, "span summary export failed"),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
