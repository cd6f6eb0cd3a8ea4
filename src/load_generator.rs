use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::pipeline::fs::{file_path, NUM_FILES};
use crate::pipeline::{Client, Op};

/// Shape of one load run.
#[derive(Debug, Clone, Copy)]
pub struct LoadPlan {
    pub concurrency: u32,
    pub duration_secs: u64,
    /// Percentage of operations that are reads (0–100)
    pub read_pct: u8,
}

/// Outcome counters of one load run.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub completed: AtomicU64,
    pub failed: AtomicU64,
}

// ─── Public entry point ──────────────────────────────────────────

/// Spawns `concurrency` Tokio tasks that drive the pipeline until the
/// deadline or the `running` flag is set to false.
pub async fn run(running: Arc<AtomicBool>, client: Client, plan: LoadPlan) -> Arc<LoadReport> {
    let deadline = Instant::now() + Duration::from_secs(plan.duration_secs);
    let report = Arc::new(LoadReport::default());

    let mut handles = Vec::with_capacity(plan.concurrency as usize);

    for worker_id in 0..plan.concurrency {
        let running = running.clone();
        let client = client.clone();
        let report = report.clone();

        handles.push(tokio::spawn(async move {
            worker(worker_id, running, client, report, deadline, plan.read_pct).await;
        }));
    }

    // Wait for all workers to finish
    for h in handles {
        let _ = h.await;
    }

    // Mark benchmark as finished
    running.store(false, Ordering::SeqCst);

    info!(
        completed = report.completed.load(Ordering::Relaxed),
        failed = report.failed.load(Ordering::Relaxed),
        issued = client.issued(),
        "load run finished"
    );
    report
}

// ─── Worker loop ─────────────────────────────────────────────────

async fn worker(
    id: u32,
    running: Arc<AtomicBool>,
    client: Client,
    report: Arc<LoadReport>,
    deadline: Instant,
    read_pct: u8,
) {
    // Each worker gets its own deterministic RNG seeded uniquely.
    let mut rng = StdRng::seed_from_u64(1000 + id as u64);

    while running.load(Ordering::Relaxed) && Instant::now() < deadline {
        let is_read = rng.gen_range(0u8..100) < read_pct;
        let op = if is_read {
            read_op(&mut rng)
        } else {
            write_op(&mut rng)
        };

        match client.call(&op).await {
            Ok(_) => {
                report.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                report.failed.fetch_add(1, Ordering::Relaxed);
                debug!(worker = id, error = %err, "call failed");
            }
        }
    }
}

// ─── Operation mix ───────────────────────────────────────────────

/// 40 % attribute lookups, 60 % reads of up to 4 KiB
fn read_op(rng: &mut StdRng) -> Op {
    let path = file_path(rng.gen_range(0..NUM_FILES));
    if rng.gen_bool(0.4) {
        Op::GetAttr { path }
    } else {
        Op::Read {
            path,
            offset: rng.gen_range(0..4096u64),
            len: rng.gen_range(1..=4096u32),
        }
    }
}

/// Writes land in their own directory so reads keep hitting seeded files
fn write_op(rng: &mut StdRng) -> Op {
    let len = rng.gen_range(64..=2048usize);
    let mut data = vec![0u8; len];
    rng.fill(&mut data[..]);
    Op::Write {
        path: format!("/scratch/w_{:04}.bin", rng.gen_range(0..1000u32)),
        offset: rng.gen_range(0..8192u64),
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{connect, DispatchConfig, MemFs};
    use crate::trace::SpanCollector;

    #[tokio::test]
    async fn short_run_records_every_completed_call() {
        let collector = Arc::new(SpanCollector::new(None));
        let client = connect(
            DispatchConfig {
                reader_pool_size: 2,
                queue_depth: 64,
                trace_rate: 1,
                collector: Some(collector.clone()),
            },
            Arc::new(MemFs::seeded(7)),
        );

        let running = Arc::new(AtomicBool::new(true));
        let plan = LoadPlan {
            concurrency: 4,
            duration_secs: 1,
            read_pct: 70,
        };
        let report = run(running.clone(), client, plan).await;

        assert!(!running.load(Ordering::SeqCst));
        let completed = report.completed.load(Ordering::Relaxed);
        assert!(completed > 0);
        assert_eq!(report.failed.load(Ordering::Relaxed), 0);
        assert_eq!(collector.stats().recorded, completed);
    }
}
