//! In-process request/response pipeline that feeds the span collector.
//!
//! The client serializes each operation into a frame and sends it to one of
//! `reader_pool_size` server readers over a tokio channel. Readers decode the
//! frame, spawn a handler task, and the handler replies through a oneshot.
//! When tracing is attached, a `Span` rides alongside the frame and every
//! stage stamps its boundary.

pub mod client;
pub mod fs;
pub mod server;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::trace::{Span, SpanCollector};

pub use client::Client;
pub use fs::{FsHandler, MemFs};
pub use server::Dispatcher;

// ─── Operations ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    GetAttr { path: String },
    Read { path: String, offset: u64, len: u32 },
    Write { path: String, offset: u64, data: Vec<u8> },
}

impl Op {
    pub fn is_read(&self) -> bool {
        !matches!(self, Op::Write { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    Attr { size: u64 },
    Data(Vec<u8>),
    Written(u32),
    Error(FsError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum FsError {
    #[error("no such file: {0}")]
    NotFound(String),
    #[error("write to {path} would grow it past {limit} bytes")]
    TooLarge { path: String, limit: u64 },
}

// ─── Wire types ──────────────────────────────────────────────────

/// What crosses the client → server channel.
/// `span` is `Some` only for sampled requests.
pub(crate) struct Frame {
    pub request_id: u64,
    pub payload: Vec<u8>,
    pub span: Option<Span>,
    pub reply_to: oneshot::Sender<ReplyFrame>,
}

/// What crosses the server → client channel.
pub(crate) struct ReplyFrame {
    pub payload: Vec<u8>,
    pub span: Option<Span>,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("server has shut down")]
    Disconnected,
    #[error("request was dropped before a reply was sent")]
    Cancelled,
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

// ─── Sampling ────────────────────────────────────────────────────

/// Per-request tracing decision.
///
/// `0` disables tracing, `1` traces every request, `N` traces every request
/// id divisible by `N`. Tracing is also off when no collector is attached.
#[derive(Clone)]
pub struct Sampler {
    trace_rate: u64,
    collector: Option<Arc<SpanCollector>>,
}

impl Sampler {
    pub fn new(trace_rate: u64, collector: Option<Arc<SpanCollector>>) -> Self {
        Self {
            trace_rate,
            collector,
        }
    }

    pub fn disabled() -> Self {
        Self::new(0, None)
    }

    #[inline]
    pub fn should_trace(&self, request_id: u64) -> bool {
        match (self.trace_rate, &self.collector) {
            (0, _) | (_, None) => false,
            (1, Some(_)) => true,
            (n, Some(_)) => request_id % n == 0,
        }
    }

    /// A freshly started span (with `t0`) for sampled requests, else `None`.
    #[inline]
    pub fn begin(&self, request_id: u64) -> Option<Span> {
        self.should_trace(request_id).then(Span::start)
    }

    pub fn collector(&self) -> Option<&Arc<SpanCollector>> {
        self.collector.as_ref()
    }

    pub fn trace_rate(&self) -> u64 {
        self.trace_rate
    }
}

// ─── Dispatcher configuration ────────────────────────────────────

/// What the dispatcher needs from its caller.
#[derive(Clone)]
pub struct DispatchConfig {
    /// Number of server reader tasks
    pub reader_pool_size: usize,
    /// Frames buffered per reader before the client waits
    pub queue_depth: usize,
    pub trace_rate: u64,
    pub collector: Option<Arc<SpanCollector>>,
}

impl DispatchConfig {
    pub fn sampler(&self) -> Sampler {
        Sampler::new(self.trace_rate, self.collector.clone())
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            reader_pool_size: 4,
            queue_depth: 1024,
            trace_rate: 0,
            collector: None,
        }
    }
}

/// Starts the server side and returns a client wired to it.
pub fn connect(config: DispatchConfig, handler: Arc<dyn FsHandler>) -> Client {
    let sampler = config.sampler();
    let readers = Dispatcher::spawn(&config, handler);
    Client::new(readers, sampler)
}
