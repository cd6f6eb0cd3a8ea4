use serde::Serialize;

/// Percentile breakdown for one phase.
/// Serialized straight into the telemetry JSON; `count` lives at the top level
/// of the document, so it is skipped here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LatencyStats {
    pub p50_us: u64,
    pub p90_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
    #[serde(skip)]
    pub count: u64,
}

impl LatencyStats {
    /// Sorts `samples` in place and extracts the nearest-rank percentiles.
    /// Returns `None` for an empty sample set.
    pub fn from_samples(samples: &mut [u64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        samples.sort_unstable();

        Some(Self {
            p50_us: nearest_rank(samples, 50),
            p90_us: nearest_rank(samples, 90),
            p99_us: nearest_rank(samples, 99),
            max_us: samples[samples.len() - 1],
            count: samples.len() as u64,
        })
    }
}

/// Nearest-rank percentile over an ascending, non-empty slice:
/// `index = ceil(pct * n / 100) - 1`, clamped to `[0, n - 1]`.
/// Whole-number percents keep the ceiling exact in integer arithmetic.
pub fn nearest_rank(sorted: &[u64], pct: u64) -> u64 {
    let n = sorted.len() as u64;
    let rank = (pct * n).div_ceil(100);
    let idx = rank.saturating_sub(1).min(n - 1);
    sorted[idx as usize]
}
