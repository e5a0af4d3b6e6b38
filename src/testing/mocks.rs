//! Mock collaborators for coordinator tests

use crate::coordination::TxnId;
use crate::error::CoordinationResult;
use crate::shuffle::ShuffleSink;
use crate::txn::MapReduceTransaction;
use parking_lot::Mutex;
use std::sync::Arc;

/// Shuffle sink that only records the ids of what was enqueued
///
/// Handles are dropped on arrival, so nothing here keeps a transaction alive.
#[derive(Default)]
pub struct RecordingShuffleSink {
    enqueued: Mutex<Vec<TxnId>>,
}

impl RecordingShuffleSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of enqueued transactions in arrival order
    pub fn enqueued_ids(&self) -> Vec<TxnId> {
        self.enqueued.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.enqueued.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ShuffleSink for RecordingShuffleSink {
    fn enqueue(&self, ts: Arc<MapReduceTransaction>) -> CoordinationResult<()> {
        self.enqueued.lock().push(ts.txn_id());
        Ok(())
    }
}
