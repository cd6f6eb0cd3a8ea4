use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{DispatchConfig, Frame, FsHandler, Op, ReplyFrame};
use crate::trace::{Span, Stage};

#[inline]
fn stamp(span: &mut Option<Span>, stage: Stage) {
    if let Some(span) = span {
        span.stamp(stage);
    }
}

/// Server side of the pipeline: a fixed pool of reader tasks.
pub struct Dispatcher;

impl Dispatcher {
    /// Spawns `reader_pool_size` readers and returns one sender per reader.
    /// Readers exit once every sender is dropped.
    pub(crate) fn spawn(
        config: &DispatchConfig,
        handler: Arc<dyn FsHandler>,
    ) -> Vec<mpsc::Sender<Frame>> {
        let pool = config.reader_pool_size.max(1);
        let depth = config.queue_depth.max(1);

        (0..pool)
            .map(|reader_id| {
                let (tx, rx) = mpsc::channel(depth);
                tokio::spawn(reader(reader_id, rx, handler.clone()));
                tx
            })
            .collect()
    }
}

// ─── Reader loop ─────────────────────────────────────────────────

async fn reader(id: usize, mut rx: mpsc::Receiver<Frame>, handler: Arc<dyn FsHandler>) {
    while let Some(frame) = rx.recv().await {
        let Frame {
            request_id,
            payload,
            mut span,
            reply_to,
        } = frame;
        stamp(&mut span, Stage::ServerRecv);

        let op: Op = match serde_json::from_slice(&payload) {
            Ok(op) => op,
            Err(err) => {
                // Dropping `reply_to` cancels the call on the client side
                warn!(reader = id, request_id, error = %err, "undecodable request frame");
                continue;
            }
        };
        stamp(&mut span, Stage::ServerDeser);

        let handler = handler.clone();
        stamp(&mut span, Stage::ServerSpawn);
        tokio::spawn(async move {
            let reply = handler.handle(op);
            stamp(&mut span, Stage::ServerFsDone);

            let payload = match serde_json::to_vec(&reply) {
                Ok(p) => p,
                Err(err) => {
                    warn!(request_id, error = %err, "failed to encode reply");
                    return;
                }
            };
            stamp(&mut span, Stage::ServerRespChan);

            if reply_to.send(ReplyFrame { payload, span }).is_err() {
                debug!(request_id, "client went away before the reply");
            }
        });
    }
    debug!(reader = id, "reader channel closed");
}
