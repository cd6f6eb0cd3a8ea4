use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use super::{Frame, Op, PipelineError, Reply, Sampler};
use crate::trace::Stage;

/// Client side of the pipeline. Cheap to clone; clones share request ids.
#[derive(Clone)]
pub struct Client {
    readers: Arc<[mpsc::Sender<Frame>]>,
    sampler: Sampler,
    next_id: Arc<AtomicU64>,
}

impl Client {
    pub(crate) fn new(readers: Vec<mpsc::Sender<Frame>>, sampler: Sampler) -> Self {
        Self {
            readers: readers.into(),
            sampler,
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Sends one operation and waits for its reply.
    ///
    /// A sampled request hands its finished span to the collector. If the
    /// call fails the span is dropped unrecorded.
    pub async fn call(&self, op: &Op) -> Result<Reply, PipelineError> {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let span = self.sampler.begin(request_id);

        let payload = serde_json::to_vec(op)?;
        let (reply_to, reply_rx) = oneshot::channel();
        let reader = &self.readers[(request_id % self.readers.len() as u64) as usize];
        reader
            .send(Frame {
                request_id,
                payload,
                span,
                reply_to,
            })
            .await
            .map_err(|_| PipelineError::Disconnected)?;

        let reply = reply_rx.await.map_err(|_| PipelineError::Cancelled)?;
        let mut span = reply.span;
        if let Some(span) = span.as_mut() {
            span.stamp(Stage::ClientRecv);
        }

        let decoded: Reply = serde_json::from_slice(&reply.payload)?;

        if let (Some(mut span), Some(collector)) = (span, self.sampler.collector()) {
            span.stamp(Stage::ClientDone);
            collector.record(request_id, span);
        }
        Ok(decoded)
    }

    /// Requests issued so far.
    pub fn issued(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed)
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }
}
