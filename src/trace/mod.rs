pub mod collector;
pub mod percentiles;
pub mod stream;
pub mod summary;

use std::sync::OnceLock;
use std::time::Instant;

use thiserror::Error;

pub use collector::{CollectorStats, SpanCollector};
pub use percentiles::LatencyStats;
pub use summary::SpanSummary;

// ─── Clock ───────────────────────────────────────────────────────

static CLOCK_ANCHOR: OnceLock<Instant> = OnceLock::new();

/// Microseconds on the process-wide monotonic clock.
/// Every stamp in a `Span` must come from this clock (or a mock of it).
#[inline]
pub fn now_us() -> u64 {
    CLOCK_ANCHOR.get_or_init(Instant::now).elapsed().as_micros() as u64
}

// ─── Stages & phases ─────────────────────────────────────────────

/// A pipeline stage boundary, in the order a request crosses them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// client: request created
    T0,
    /// server: received from transport
    ServerRecv,
    /// server: request deserialized
    ServerDeser,
    /// server: handler task dispatched
    ServerSpawn,
    /// server: underlying operation complete
    ServerFsDone,
    /// server: response handed to outbound channel
    ServerRespChan,
    /// client: response received
    ClientRecv,
    /// client: processing finished
    ClientDone,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::T0,
        Stage::ServerRecv,
        Stage::ServerDeser,
        Stage::ServerSpawn,
        Stage::ServerFsDone,
        Stage::ServerRespChan,
        Stage::ClientRecv,
        Stage::ClientDone,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::T0 => "t0",
            Stage::ServerRecv => "server_recv",
            Stage::ServerDeser => "server_deser",
            Stage::ServerSpawn => "server_spawn",
            Stage::ServerFsDone => "server_fs_done",
            Stage::ServerRespChan => "server_resp_chan",
            Stage::ClientRecv => "client_recv",
            Stage::ClientDone => "client_done",
        }
    }
}

/// A derived duration between two adjacent stages, plus `Total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    ToServer,
    ServerDeser,
    ServerSpawn,
    ServerFs,
    ServerChan,
    ToClient,
    ClientDone,
    Total,
}

impl Phase {
    /// The seven adjacent-stage phases, in pipeline order.
    pub const STEPS: [Phase; 7] = [
        Phase::ToServer,
        Phase::ServerDeser,
        Phase::ServerSpawn,
        Phase::ServerFs,
        Phase::ServerChan,
        Phase::ToClient,
        Phase::ClientDone,
    ];

    /// Report order: total first, then the steps.
    pub const ALL: [Phase; 8] = [
        Phase::Total,
        Phase::ToServer,
        Phase::ServerDeser,
        Phase::ServerSpawn,
        Phase::ServerFs,
        Phase::ServerChan,
        Phase::ToClient,
        Phase::ClientDone,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Phase::ToServer => "to_server",
            Phase::ServerDeser => "server_deser",
            Phase::ServerSpawn => "server_spawn",
            Phase::ServerFs => "server_fs",
            Phase::ServerChan => "server_chan",
            Phase::ToClient => "to_client",
            Phase::ClientDone => "client_done",
            Phase::Total => "total",
        }
    }

    fn index(self) -> usize {
        match self {
            Phase::ToServer => 0,
            Phase::ServerDeser => 1,
            Phase::ServerSpawn => 2,
            Phase::ServerFs => 3,
            Phase::ServerChan => 4,
            Phase::ToClient => 5,
            Phase::ClientDone => 6,
            Phase::Total => 7,
        }
    }
}

// ─── Span ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SpanError {
    #[error("span incomplete: `{0}` was never stamped")]
    Incomplete(&'static str),
    #[error("span not monotonic: `{stage}` ({at_us}us) precedes previous stage ({prev_us}us)")]
    NonMonotonic {
        stage: &'static str,
        at_us: u64,
        prev_us: u64,
    },
}

/// Eight stage timestamps for one traced request.
///
/// The span is a passive value: each stage writes its own stamp exactly once,
/// in pipeline order. Nothing here stops an overwrite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    stamps: [Option<u64>; 8],
}

impl Span {
    /// An empty span with every stamp unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty span with `t0` stamped now.
    pub fn start() -> Self {
        let mut span = Self::new();
        span.stamp(Stage::T0);
        span
    }

    /// Stamp `stage` with the current monotonic time.
    #[inline]
    pub fn stamp(&mut self, stage: Stage) {
        self.set(stage, now_us());
    }

    /// Stamp `stage` with an explicit time (mocked clocks, replay).
    #[inline]
    pub fn set(&mut self, stage: Stage, at_us: u64) {
        self.stamps[stage as usize] = Some(at_us);
    }

    pub fn get(&self, stage: Stage) -> Option<u64> {
        self.stamps[stage as usize]
    }

    /// Builds a completed span from eight raw stamps in stage order.
    pub fn from_stamps(stamps: [u64; 8]) -> Self {
        Self {
            stamps: stamps.map(Some),
        }
    }

    /// Derive every phase. Fails on the first unset or out-of-order stamp.
    pub fn phases(&self) -> Result<PhaseDurations, SpanError> {
        let mut at = [0u64; 8];
        for (i, stage) in Stage::ALL.iter().enumerate() {
            at[i] = self.stamps[i].ok_or(SpanError::Incomplete(stage.name()))?;
            if i > 0 && at[i] < at[i - 1] {
                return Err(SpanError::NonMonotonic {
                    stage: stage.name(),
                    at_us: at[i],
                    prev_us: at[i - 1],
                });
            }
        }

        let mut durations = [0u64; 8];
        for i in 0..7 {
            durations[i] = at[i + 1] - at[i];
        }
        durations[Phase::Total.index()] = at[7] - at[0];
        Ok(PhaseDurations(durations))
    }
}

/// Phase durations (µs) derived from one valid span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseDurations([u64; 8]);

impl PhaseDurations {
    pub fn get(&self, phase: Phase) -> u64 {
        self.0[phase.index()]
    }
}
