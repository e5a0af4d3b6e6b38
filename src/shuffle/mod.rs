//! Shuffle worker for transactions that finished their Map phase
//!
//! Coordinators hand transactions over through the [`ShuffleSink`] trait. The
//! [`ShuffleWorker`] implementation accepts them on an unbounded channel, so
//! enqueueing never blocks a partition thread, and processes them one at a
//! time on a background task: shuffle, reduce, then deliver the Map response
//! that the coordinator retained.

use crate::coordination::{Status, TxnId};
use crate::error::{CoordinationError, CoordinationResult};
use crate::txn::{MapReduceTransaction, TxnPhase};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Consumer of transactions whose Map phase completed on this site
pub trait ShuffleSink: Send + Sync {
    /// Take ownership of `ts` for asynchronous processing
    fn enqueue(&self, ts: Arc<MapReduceTransaction>) -> CoordinationResult<()>;
}

/// Errors raised while running the post-Map pipeline
#[derive(Debug, Error)]
pub enum ShuffleError {
    #[error("Txn #{txn_id} - {stage} stage failed: {message}")]
    StageFailed {
        txn_id: TxnId,
        stage: TxnPhase,
        message: String,
    },

    #[error(transparent)]
    Coordination(#[from] CoordinationError),
}

/// The shuffle and reduce work itself, opaque to the coordination layer
#[async_trait]
pub trait ShuffleHandler: Send + Sync {
    async fn shuffle(&self, ts: &MapReduceTransaction) -> Result<(), ShuffleError>;

    async fn reduce(&self, ts: &MapReduceTransaction) -> Result<(), ShuffleError>;
}

/// Handler that only waits a fixed delay in each stage
#[derive(Debug, Clone, Default)]
pub struct PassThroughShuffle {
    delay: Duration,
}

impl PassThroughShuffle {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl ShuffleHandler for PassThroughShuffle {
    async fn shuffle(&self, ts: &MapReduceTransaction) -> Result<(), ShuffleError> {
        debug!("Txn #{} - shuffling", ts.txn_id());
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn reduce(&self, ts: &MapReduceTransaction) -> Result<(), ShuffleError> {
        debug!("Txn #{} - reducing", ts.txn_id());
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

/// Background worker draining the shuffle queue
///
/// Must be spawned from within a tokio runtime. The worker shuts down once
/// every clone of the queue has been dropped.
pub struct ShuffleWorker {
    tx: mpsc::UnboundedSender<Arc<MapReduceTransaction>>,
    processed: Arc<AtomicUsize>,
    _worker_handle: Arc<JoinHandle<()>>,
}

impl ShuffleWorker {
    pub fn spawn(handler: Arc<dyn ShuffleHandler>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Arc<MapReduceTransaction>>();
        let processed = Arc::new(AtomicUsize::new(0));
        let counter = processed.clone();

        let worker_handle = tokio::spawn(async move {
            info!("Shuffle worker started");

            while let Some(ts) = rx.recv().await {
                let txn_id = ts.txn_id();
                debug!("Txn #{} - picked up by shuffle worker", txn_id);

                let outcome = run_pipeline(handler.as_ref(), &ts).await;
                counter.fetch_add(1, Ordering::AcqRel);

                let delivery = match outcome {
                    Ok(()) => ts.map_callback().deliver_original_response(),
                    Err(e) => {
                        warn!("Txn #{} - shuffle pipeline failed: {}", txn_id, e);
                        ts.map_callback().deliver_failure(Status::AbortUnexpected)
                    }
                };
                if let Err(e) = delivery {
                    warn!("Txn #{} - could not deliver Map response: {}", txn_id, e);
                }
            }

            info!(
                "Shuffle worker shutting down (processed {} transactions)",
                counter.load(Ordering::Acquire)
            );
        });

        Self {
            tx,
            processed,
            _worker_handle: Arc::new(worker_handle),
        }
    }

    /// Number of transactions that have been through the shuffle pipeline
    pub fn processed_count(&self) -> usize {
        self.processed.load(Ordering::Acquire)
    }
}

impl ShuffleSink for ShuffleWorker {
    fn enqueue(&self, ts: Arc<MapReduceTransaction>) -> CoordinationResult<()> {
        let txn_id = ts.txn_id();
        self.tx
            .send(ts)
            .map_err(|_| CoordinationError::ShuffleQueueClosed { txn_id })?;
        debug!("Txn #{} - queued for shuffle", txn_id);
        Ok(())
    }
}

async fn run_pipeline(
    handler: &dyn ShuffleHandler,
    ts: &MapReduceTransaction,
) -> Result<(), ShuffleError> {
    handler.shuffle(ts).await?;
    ts.set_reduce_phase()?;
    handler.reduce(ts).await?;
    ts.set_done()?;
    Ok(())
}
