use std::fmt;
use std::fs;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use super::percentiles::LatencyStats;
use super::{Phase, PhaseDurations};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to serialize span summary: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write span summary to {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Immutable per-phase report over every span a collector held at one moment.
/// Field order is the telemetry JSON layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpanSummary {
    pub count: u64,
    pub total: LatencyStats,
    pub to_server: LatencyStats,
    pub server_deser: LatencyStats,
    pub server_spawn: LatencyStats,
    pub server_fs: LatencyStats,
    pub server_chan: LatencyStats,
    pub to_client: LatencyStats,
    pub client_done: LatencyStats,
}

impl SpanSummary {
    /// Batch percentile computation. `None` when `samples` is empty.
    pub fn from_durations(samples: &[PhaseDurations]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        // One scratch buffer, reused for every phase
        let mut column = Vec::with_capacity(samples.len());
        let mut stats_for = |phase: Phase| {
            column.clear();
            column.extend(samples.iter().map(|d| d.get(phase)));
            LatencyStats::from_samples(&mut column)
        };

        Some(Self {
            count: samples.len() as u64,
            total: stats_for(Phase::Total)?,
            to_server: stats_for(Phase::ToServer)?,
            server_deser: stats_for(Phase::ServerDeser)?,
            server_spawn: stats_for(Phase::ServerSpawn)?,
            server_fs: stats_for(Phase::ServerFs)?,
            server_chan: stats_for(Phase::ServerChan)?,
            to_client: stats_for(Phase::ToClient)?,
            client_done: stats_for(Phase::ClientDone)?,
        })
    }

    pub fn stats(&self, phase: Phase) -> &LatencyStats {
        match phase {
            Phase::Total => &self.total,
            Phase::ToServer => &self.to_server,
            Phase::ServerDeser => &self.server_deser,
            Phase::ServerSpawn => &self.server_spawn,
            Phase::ServerFs => &self.server_fs,
            Phase::ServerChan => &self.server_chan,
            Phase::ToClient => &self.to_client,
            Phase::ClientDone => &self.client_done,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Writes the JSON document to `path`, replacing any existing file.
    pub fn export_json(&self, path: &Path) -> Result<(), ExportError> {
        let json = self.to_json()?;
        fs::write(path, json).map_err(|source| ExportError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

// ── Human-readable table ─────────────────────────────────────────

impl fmt::Display for SpanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Span summary ({} samples, all values in μs)", self.count)?;
        writeln!(
            f,
            "  {:<14} {:>10} {:>10} {:>10} {:>10}",
            "phase", "p50", "p90", "p99", "max"
        )?;
        for phase in Phase::ALL {
            let s = self.stats(phase);
            writeln!(
                f,
                "  {:<14} {:>10} {:>10} {:>10} {:>10}",
                phase.name(),
                s.p50_us,
                s.p90_us,
                s.p99_us,
                s.max_us
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::Span;

    fn durations(totals: &[u64]) -> Vec<PhaseDurations> {
        // Everything but server_fs is fixed, so total varies with server_fs
        totals
            .iter()
            .map(|&total| {
                let fs = total - 60;
                Span::from_stamps([
                    0,
                    10,
                    20,
                    30,
                    30 + fs,
                    40 + fs,
                    50 + fs,
                    60 + fs,
                ])
                .phases()
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn empty_input_has_no_summary() {
        assert!(SpanSummary::from_durations(&[]).is_none());
    }

    #[test]
    fn summary_over_three_totals() {
        let s = SpanSummary::from_durations(&durations(&[80, 100, 120])).unwrap();
        assert_eq!(s.count, 3);
        assert_eq!(s.total.p50_us, 100);
        assert_eq!(s.total.max_us, 120);
        assert_eq!(s.server_fs.max_us, 60);
        assert_eq!(s.to_server.p99_us, 10);
    }

    #[test]
    fn json_has_every_phase_in_schema_shape() {
        let s = SpanSummary::from_durations(&durations(&[80, 100, 120])).unwrap();
        let v: serde_json::Value = serde_json::from_str(&s.to_json().unwrap()).unwrap();
        assert_eq!(v["count"], 3);
        for phase in Phase::ALL {
            let obj = v[phase.name()].as_object().unwrap();
            let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
            keys.sort_unstable();
            assert_eq!(keys, ["max_us", "p50_us", "p90_us", "p99_us"]);
        }
    }

    #[test]
    fn table_lists_every_phase() {
        let s = SpanSummary::from_durations(&durations(&[80])).unwrap();
        let table = s.to_string();
        assert!(table.contains("1 samples"));
        for phase in Phase::ALL {
            assert!(
                table.lines().any(|l| l.trim_start().starts_with(phase.name())),
                "missing {}",
                phase.name()
            );
        }
    }

    #[test]
    fn export_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("summary.json");
        let s = SpanSummary::from_durations(&durations(&[80])).unwrap();
        match s.export_json(&path) {
            Err(ExportError::Io { path: p, .. }) => assert!(p.ends_with("summary.json")),
            other => panic!("expected Io error, got {other:?}"),
        }
    }
}
