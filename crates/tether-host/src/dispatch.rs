//! The privileged single-consumer dispatch loop.
//!
//! Stands in for the editor's main-thread marshaling: one unbounded job
//! queue drained by exactly one consumer task, results handed back through
//! `oneshot` channels. Jobs run strictly in enqueue order with no
//! reentrancy, which is the property the bridge's FIFO reply correlation
//! rests on.

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use tether_bridge::dispatch::{dispatcher_gone, PrivilegedDispatch, PrivilegedJob, PrivilegedResult};
use tether_core::{BridgeError, Result};

struct Job {
    work: PrivilegedJob,
    reply: oneshot::Sender<PrivilegedResult>,
}

/// Channel-backed [`PrivilegedDispatch`] with a single consumer loop.
pub struct MainThreadDispatch {
    tx: mpsc::UnboundedSender<Job>,
}

impl MainThreadDispatch {
    /// Start the consumer loop and return the dispatcher plus its task
    /// handle. The loop ends when every dispatcher clone is dropped.
    #[must_use]
    pub fn start() -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let consumer = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let result = (job.work)();
                // A caller that stopped waiting (timeout, disconnect) is
                // fine; the work itself still ran exactly once.
                let _ = job.reply.send(result);
            }
            debug!("privileged dispatch loop stopped");
        });
        (Self { tx }, consumer)
    }
}

impl PrivilegedDispatch for MainThreadDispatch {
    fn submit(&self, work: PrivilegedJob) -> BoxFuture<'static, Result<Value>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let enqueued = self.tx.send(Job {
            work,
            reply: reply_tx,
        });
        Box::pin(async move {
            if enqueued.is_err() {
                return Err(dispatcher_gone());
            }
            match reply_rx.await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(message)) => Err(BridgeError::handler(message)),
                Err(_) => Err(dispatcher_gone()),
            }
        })
    }
}
