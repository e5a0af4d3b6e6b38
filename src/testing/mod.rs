//! Testing utilities and fixtures
//!
//! Helpers shared by unit tests, integration tests and benchmarks: a site
//! with fixed membership, a shuffle sink that records hand-offs, and an
//! original callback that collects delivered responses.

pub mod mocks;

pub use mocks::RecordingShuffleSink;

use crate::coordination::{OrigCallback, PartitionId, TransactionMapResponse};
use crate::site::{SiteController, SiteServices};
use parking_lot::Mutex;
use std::sync::Arc;

/// Responses handed to a recording original callback
pub type Delivered = Arc<Mutex<Vec<TransactionMapResponse>>>;

/// Original callback that appends every delivered response to a shared list
pub fn recording_callback() -> (OrigCallback<TransactionMapResponse>, Delivered) {
    let delivered: Delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = delivered.clone();
    (Box::new(move |response| sink.lock().push(response)), delivered)
}

/// Site 0 with fixed local partitions and a recording shuffle sink
pub struct StaticSite {
    controller: Arc<SiteServices>,
    sink: Arc<RecordingShuffleSink>,
}

impl StaticSite {
    pub fn new(partitions: &[PartitionId]) -> Self {
        let sink = Arc::new(RecordingShuffleSink::new());
        let controller = Arc::new(
            SiteServices::new(0, partitions.iter().copied()).with_shuffle_worker(sink.clone()),
        );
        Self { controller, sink }
    }

    /// Site without a registered shuffle worker
    pub fn without_shuffle(partitions: &[PartitionId]) -> Self {
        Self {
            controller: Arc::new(SiteServices::new(0, partitions.iter().copied())),
            sink: Arc::new(RecordingShuffleSink::new()),
        }
    }

    pub fn controller(&self) -> Arc<dyn SiteController> {
        self.controller.clone()
    }

    pub fn sink(&self) -> &RecordingShuffleSink {
        &self.sink
    }
}
