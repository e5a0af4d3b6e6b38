//! Site controller context
//!
//! The site is the node-level owner of local partitions and the shuffle
//! worker. It is built explicitly from a [`SiteConfig`] and passed by `Arc`;
//! coordinators only see it through the [`SiteController`] trait.

pub mod simulation;

use crate::config::SiteConfig;
use crate::coordination::{
    CoordinatorPool, OrigCallback, PartitionId, PoolMetrics, TransactionMapResponse, TxnId,
};
use crate::error::{CoordinationError, CoordinationResult};
use crate::shuffle::ShuffleSink;
use crate::txn::MapReduceTransaction;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// What a coordinator needs from the site it runs on
pub trait SiteController: Send + Sync {
    fn site_id(&self) -> u32;

    /// Partitions hosted on this site. Read-only for coordinators.
    fn local_partition_ids(&self) -> &BTreeSet<PartitionId>;

    /// The shuffle worker that consumes transactions after their Map phase
    fn shuffle_worker(&self) -> CoordinationResult<Arc<dyn ShuffleSink>>;
}

/// Static site membership plus the registered shuffle worker
pub struct SiteServices {
    site_id: u32,
    local_partitions: BTreeSet<PartitionId>,
    shuffle: Option<Arc<dyn ShuffleSink>>,
}

impl SiteServices {
    pub fn new(site_id: u32, local_partitions: impl IntoIterator<Item = PartitionId>) -> Self {
        Self {
            site_id,
            local_partitions: local_partitions.into_iter().collect(),
            shuffle: None,
        }
    }

    /// Register the shuffle worker
    pub fn with_shuffle_worker(mut self, shuffle: Arc<dyn ShuffleSink>) -> Self {
        self.shuffle = Some(shuffle);
        self
    }
}

impl SiteController for SiteServices {
    fn site_id(&self) -> u32 {
        self.site_id
    }

    fn local_partition_ids(&self) -> &BTreeSet<PartitionId> {
        &self.local_partitions
    }

    fn shuffle_worker(&self) -> CoordinationResult<Arc<dyn ShuffleSink>> {
        self.shuffle
            .clone()
            .ok_or(CoordinationError::MissingShuffleWorker {
                site_id: self.site_id,
            })
    }
}

/// Entry point used by the network layer to run Map phases on this site
pub struct Site {
    controller: Arc<dyn SiteController>,
    pool: CoordinatorPool,
}

impl Site {
    pub fn new(controller: Arc<dyn SiteController>, pool_size: usize) -> Self {
        Self {
            pool: CoordinatorPool::new(controller.clone(), pool_size),
            controller,
        }
    }

    /// Build a site from configuration, optionally registering a shuffle worker
    pub fn from_config(config: &SiteConfig, shuffle: Option<Arc<dyn ShuffleSink>>) -> Self {
        let mut services = SiteServices::new(config.site_id, config.local_partitions.iter().copied());
        if let Some(shuffle) = shuffle {
            services = services.with_shuffle_worker(shuffle);
        }
        info!(
            "Site {} hosting {} local partitions",
            config.site_id,
            config.local_partitions.len()
        );
        Self::new(Arc::new(services), config.pool_size)
    }

    pub fn controller(&self) -> &Arc<dyn SiteController> {
        &self.controller
    }

    pub fn site_id(&self) -> u32 {
        self.controller.site_id()
    }

    pub fn local_partition_ids(&self) -> &BTreeSet<PartitionId> {
        self.controller.local_partition_ids()
    }

    /// Start the Map phase of `txn_id` on this site
    ///
    /// Returns the transaction handle whose coordinator the partition threads
    /// report to.
    pub fn begin_map(
        &self,
        txn_id: TxnId,
        orig_callback: OrigCallback<TransactionMapResponse>,
    ) -> CoordinationResult<Arc<MapReduceTransaction>> {
        let coordinator = self.pool.acquire();
        let ts = MapReduceTransaction::new(txn_id, coordinator.clone());
        if let Err(e) = ts.init_map(orig_callback) {
            self.pool.release(coordinator);
            return Err(e);
        }
        debug!("Txn #{} - Map phase started on site {}", txn_id, self.site_id());
        Ok(ts)
    }

    /// Recycle the coordinator of a transaction that is fully done
    pub fn complete(&self, ts: Arc<MapReduceTransaction>) {
        debug!("Txn #{} - releasing coordinator in phase {}", ts.txn_id(), ts.phase());
        self.pool.release(ts.map_callback().clone());
    }

    pub fn pool_metrics(&self) -> PoolMetrics {
        self.pool.metrics()
    }
}
