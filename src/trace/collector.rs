use std::collections::VecDeque;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use super::summary::{ExportError, SpanSummary};
use super::{PhaseDurations, Span};

// ─── Configuration ───────────────────────────────────────────────

/// Spans retained when the caller gives no capacity hint.
pub const DEFAULT_CAPACITY: usize = 1 << 20;

/// Independent insert locks. Producers on different shards never contend.
const SHARDS: usize = 16;

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe span aggregator.
/// Request paths call `record()`, diagnostics call `summary()`.
///
/// Retention is a per-shard ring buffer: once the capacity is reached the
/// oldest span on the receiving shard is evicted. Shards are filled round
/// robin, so sampled id patterns cannot skew them.
pub struct SpanCollector {
    shards: Box<[Mutex<VecDeque<PhaseDurations>>]>,
    shard_capacity: usize,
    next_shard: AtomicUsize,
    recorded: AtomicU64,
    malformed: AtomicU64,
    evicted: AtomicU64,
    eviction_warned: AtomicBool,
}

/// Ingestion counters, for the diagnostics endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CollectorStats {
    /// Valid spans accepted since creation (or the last reset)
    pub recorded: u64,
    /// Spans dropped for unset or out-of-order stamps
    pub malformed: u64,
    /// Valid spans pushed out of the retention window
    pub evicted: u64,
    /// Spans currently available to `summary()`
    pub retained: u64,
    pub capacity: u64,
}

// ─── SpanCollector impl ──────────────────────────────────────────

impl SpanCollector {
    /// `capacity` bounds the spans retained; `None` uses `DEFAULT_CAPACITY`.
    pub fn new(capacity: Option<usize>) -> Self {
        let capacity = capacity.unwrap_or(DEFAULT_CAPACITY).max(1);
        let shard_count = SHARDS.min(capacity);
        let shard_capacity = capacity.div_ceil(shard_count);

        let shards = (0..shard_count)
            // Grow lazily past a modest preallocation
            .map(|_| Mutex::new(VecDeque::with_capacity(shard_capacity.min(4096))))
            .collect();

        Self {
            shards,
            shard_capacity,
            next_shard: AtomicUsize::new(0),
            recorded: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            eviction_warned: AtomicBool::new(false),
        }
    }

    /// Ingest one finished span. Malformed spans are counted and dropped.
    /// Recording the same id twice yields two independent samples.
    pub fn record(&self, request_id: u64, span: Span) {
        let durations = match span.phases() {
            Ok(d) => d,
            Err(err) => {
                self.malformed.fetch_add(1, Ordering::Relaxed);
                debug!(request_id, error = %err, "dropping malformed span");
                return;
            }
        };

        let slot = self.next_shard.fetch_add(1, Ordering::Relaxed) % self.shards.len();
        let shard = &self.shards[slot];
        let full = {
            let mut ring = shard.lock();
            let full = ring.len() >= self.shard_capacity;
            if full {
                ring.pop_front();
            }
            ring.push_back(durations);
            full
        };

        self.recorded.fetch_add(1, Ordering::Relaxed);
        if full {
            self.evicted.fetch_add(1, Ordering::Relaxed);
            if !self.eviction_warned.swap(true, Ordering::Relaxed) {
                warn!(
                    capacity = self.capacity(),
                    "span collector is full; oldest spans are now being evicted"
                );
            }
        }
    }

    /// Point-in-time summary, or `None` when no valid span is retained.
    /// Each shard is locked only long enough to copy it.
    pub fn summary(&self) -> Option<SpanSummary> {
        let mut samples = Vec::new();
        for shard in self.shards.iter() {
            let ring = shard.lock();
            samples.extend(ring.iter().copied());
        }
        SpanSummary::from_durations(&samples)
    }

    /// Telemetry JSON document, or `None` under the same rule as `summary()`.
    pub fn summary_json(&self) -> Option<String> {
        let summary = self.summary()?;
        match summary.to_json() {
            Ok(json) => Some(json),
            Err(err) => {
                warn!(error = %err, "failed to serialize span summary");
                None
            }
        }
    }

    /// Writes the summary table to `out`, or a no-data notice.
    /// Returns the summary that was written.
    pub fn write_summary<W: Write>(&self, out: &mut W) -> io::Result<Option<SpanSummary>> {
        let summary = self.summary();
        match &summary {
            Some(s) => write!(out, "{s}")?,
            None => writeln!(out, "Span summary: no data (0 spans recorded)")?,
        }
        Ok(summary)
    }

    /// Prints the summary table to stderr.
    pub fn print_summary(&self) {
        let stderr = io::stderr();
        let mut lock = stderr.lock();
        if let Err(err) = self.write_summary(&mut lock) {
            warn!(error = %err, "failed to print span summary");
        }
    }

    /// Exports the current summary to `path`.
    /// `Ok(false)` means nothing was recorded and no file was written.
    pub fn export_json(&self, path: &Path) -> Result<bool, ExportError> {
        match self.summary() {
            Some(summary) => summary.export_json(path).map(|_| true),
            None => Ok(false),
        }
    }

    /// Wipe all data; called when a new benchmark run starts.
    pub fn reset(&self) {
        for shard in self.shards.iter() {
            shard.lock().clear();
        }
        self.recorded.store(0, Ordering::Relaxed);
        self.malformed.store(0, Ordering::Relaxed);
        self.evicted.store(0, Ordering::Relaxed);
        self.next_shard.store(0, Ordering::Relaxed);
        self.eviction_warned.store(false, Ordering::Relaxed);
    }

    pub fn capacity(&self) -> u64 {
        (self.shard_capacity * self.shards.len()) as u64
    }

    pub fn retained(&self) -> u64 {
        self.shards.iter().map(|s| s.lock().len() as u64).sum()
    }

    pub fn stats(&self) -> CollectorStats {
        CollectorStats {
            recorded: self.recorded.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            retained: self.retained(),
            capacity: self.capacity(),
        }
    }
}

impl Default for SpanCollector {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::Stage;

    fn span_with_total(total: u64) -> Span {
        let fs = total - 60;
        Span::from_stamps([0, 10, 20, 30, 30 + fs, 40 + fs, 50 + fs, 60 + fs])
    }

    #[test]
    fn empty_collector_has_no_summary() {
        let c = SpanCollector::new(None);
        assert!(c.summary().is_none());
        assert!(c.summary_json().is_none());
    }

    #[test]
    fn three_span_scenario() {
        let c = SpanCollector::new(None);
        for (id, total) in [80, 100, 120].into_iter().enumerate() {
            c.record(id as u64, span_with_total(total));
        }
        let s = c.summary().unwrap();
        assert_eq!(s.count, 3);
        assert_eq!(s.total.p50_us, 100);
        assert_eq!(s.total.max_us, 120);
    }

    #[test]
    fn malformed_span_does_not_move_percentiles() {
        let c = SpanCollector::new(None);
        for (id, total) in [80, 100, 120].into_iter().enumerate() {
            c.record(id as u64, span_with_total(total));
        }
        let before = c.summary().unwrap();

        // client_recv before server_resp_chan
        c.record(99, Span::from_stamps([0, 10, 20, 30, 40, 500, 400, 600]));
        let mut partial = Span::start();
        partial.stamp(Stage::ServerRecv);
        c.record(100, partial);

        assert_eq!(c.summary().unwrap(), before);
        assert_eq!(c.stats().malformed, 2);
        assert_eq!(c.stats().recorded, 3);
    }

    #[test]
    fn duplicate_ids_are_additive() {
        let c = SpanCollector::new(None);
        c.record(7, span_with_total(80));
        c.record(7, span_with_total(90));
        assert_eq!(c.summary().unwrap().count, 2);
    }

    #[test]
    fn full_collector_evicts_oldest() {
        // One shard per slot, so every id lands in its own ring of size 1
        let c = SpanCollector::new(Some(SHARDS));
        for id in 0..SHARDS as u64 {
            c.record(id, span_with_total(1_000));
        }
        for id in 0..SHARDS as u64 {
            c.record(id, span_with_total(100));
        }
        let stats = c.stats();
        assert_eq!(stats.retained, SHARDS as u64);
        assert_eq!(stats.evicted, SHARDS as u64);
        assert_eq!(c.summary().unwrap().total.max_us, 100);
    }

    #[test]
    fn strided_ids_fill_the_whole_capacity() {
        // Every-16th sampling: all ids share the factor 16
        let c = SpanCollector::new(Some(160));
        for i in 0..160u64 {
            c.record(i * 16, span_with_total(100));
            let stats = c.stats();
            assert_eq!(stats.retained, i + 1);
            assert_eq!(stats.evicted, 0);
        }
        assert_eq!(c.retained(), c.capacity());

        for i in 160..320u64 {
            c.record(i * 16, span_with_total(80));
        }
        let stats = c.stats();
        assert_eq!(stats.retained, 160);
        assert_eq!(stats.evicted, 160);
        assert_eq!(c.summary().unwrap().total.max_us, 80);
    }

    #[test]
    fn same_id_spreads_across_shards() {
        let c = SpanCollector::new(Some(1600));
        for _ in 0..1600 {
            c.record(10, span_with_total(100));
        }
        assert_eq!(c.stats().retained, 1600);
        assert_eq!(c.stats().evicted, 0);
    }

    #[test]
    fn tiny_capacity_is_respected() {
        let c = SpanCollector::new(Some(3));
        for id in 0..50 {
            c.record(id, span_with_total(100));
        }
        assert_eq!(c.capacity(), 3);
        assert_eq!(c.retained(), 3);
    }

    #[test]
    fn reset_clears_everything() {
        let c = SpanCollector::new(None);
        c.record(1, span_with_total(80));
        c.record(2, Span::new());
        c.reset();
        assert!(c.summary().is_none());
        assert_eq!(c.stats().recorded, 0);
        assert_eq!(c.stats().malformed, 0);
    }

    #[test]
    fn write_summary_reports_no_data() {
        let c = SpanCollector::new(None);
        let mut out = Vec::new();
        assert!(c.write_summary(&mut out).unwrap().is_none());
        assert!(String::from_utf8(out).unwrap().contains("no data"));
    }

    #[test]
    fn export_skips_empty_collector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let c = SpanCollector::new(None);
        assert!(!c.export_json(&path).unwrap());
        assert!(!path.exists());

        c.record(1, span_with_total(80));
        assert!(c.export_json(&path).unwrap());
        let v: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["total"]["max_us"], 80);
    }
}
