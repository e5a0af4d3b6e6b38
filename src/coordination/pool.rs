//! Object pool for Map-phase coordinators
//!
//! Coordinators are finished and handed back here once their transaction
//! completes, so the hot path does not allocate a new one per transaction.

use super::map::TransactionMapCoordinator;
use crate::site::SiteController;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, trace};

/// Metrics for coordinator pool usage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    /// Total number of coordinators created
    pub total_created: usize,
    /// Number of coordinators currently handed out
    pub in_use: usize,
    /// Number of finished coordinators waiting for reuse
    pub available: usize,
    /// Total number of acquisitions
    pub total_acquisitions: usize,
    /// Number of acquisitions served from the pool
    pub reuse_count: usize,
}

pub struct CoordinatorPool {
    site: Arc<dyn SiteController>,
    available: Mutex<VecDeque<Arc<TransactionMapCoordinator>>>,
    max_size: usize,
    metrics: Mutex<PoolMetrics>,
}

impl CoordinatorPool {
    pub fn new(site: Arc<dyn SiteController>, max_size: usize) -> Self {
        Self {
            site,
            available: Mutex::new(VecDeque::with_capacity(max_size)),
            max_size,
            metrics: Mutex::new(PoolMetrics::default()),
        }
    }

    /// Take a finished coordinator from the pool, or create a new one
    pub fn acquire(&self) -> Arc<TransactionMapCoordinator> {
        let reused = self.available.lock().pop_front();
        let mut metrics = self.metrics.lock();
        metrics.total_acquisitions += 1;
        metrics.in_use += 1;

        match reused {
            Some(coordinator) => {
                metrics.reuse_count += 1;
                metrics.available = metrics.available.saturating_sub(1);
                trace!("Reused coordinator from pool");
                coordinator
            }
            None => {
                metrics.total_created += 1;
                debug!("Created coordinator #{}", metrics.total_created);
                Arc::new(TransactionMapCoordinator::new(self.site.clone()))
            }
        }
    }

    /// Finish `coordinator` and keep it for reuse if there is room
    pub fn release(&self, coordinator: Arc<TransactionMapCoordinator>) {
        coordinator.finish();

        let mut available = self.available.lock();
        let mut metrics = self.metrics.lock();
        metrics.in_use = metrics.in_use.saturating_sub(1);
        if available.len() < self.max_size {
            available.push_back(coordinator);
            metrics.available = available.len();
        } else {
            trace!("Pool full, dropping coordinator");
        }
    }

    pub fn metrics(&self) -> PoolMetrics {
        self.metrics.lock().clone()
    }
}
