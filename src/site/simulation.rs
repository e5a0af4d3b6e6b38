//! Drives Map phases on a site with one OS thread per local partition
//!
//! Stands in for the partition execution engine: every partition thread
//! "finishes" its fragment immediately and reports to the coordinator.

use crate::coordination::{PartitionId, Status, TransactionMapResponse, TxnId};
use crate::error::CoordinationError;
use crate::site::Site;
use crate::txn::MapReduceTransaction;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{info, warn};

/// How a simulated transaction should end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Outcome {
    /// Every partition reports completion
    #[default]
    Complete,
    /// Abort with the given status once `after` partitions have completed
    AbortAfter { after: usize, status: Status },
}

/// Report completions for `partitions` concurrently, one thread each
///
/// Returns the errors the coordinator raised, if any.
pub fn report_partitions(
    ts: &MapReduceTransaction,
    partitions: &[PartitionId],
) -> Vec<CoordinationError> {
    let coordinator = ts.map_callback();
    thread::scope(|scope| {
        let handles: Vec<_> = partitions
            .iter()
            .map(|&partition| scope.spawn(move || coordinator.on_partition_complete(partition)))
            .collect();

        handles
            .into_iter()
            .filter_map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                    .err()
            })
            .collect()
    })
}

/// Run `ts`'s Map phase according to `outcome`
pub fn drive_map_phase(
    ts: &MapReduceTransaction,
    partitions: &[PartitionId],
    outcome: Outcome,
) -> Vec<CoordinationError> {
    match outcome {
        Outcome::Complete => report_partitions(ts, partitions),
        Outcome::AbortAfter { after, status } => {
            let finished = &partitions[..after.min(partitions.len())];
            let mut errors = report_partitions(ts, finished);
            if let Err(e) = ts.map_callback().on_abort(status) {
                errors.push(e);
            }
            errors
        }
    }
}

/// Run one transaction end to end and wait for its Map response
pub async fn run_transaction(
    site: Arc<Site>,
    txn_id: TxnId,
    outcome: Outcome,
    timeout: Duration,
) -> anyhow::Result<TransactionMapResponse> {
    let (tx, rx) = oneshot::channel();
    let ts = site.begin_map(
        txn_id,
        Box::new(move |response| {
            let _ = tx.send(response);
        }),
    )?;

    let partitions: Vec<PartitionId> = site.local_partition_ids().iter().copied().collect();
    let worker_ts = ts.clone();
    let errors =
        tokio::task::spawn_blocking(move || drive_map_phase(&worker_ts, &partitions, outcome))
            .await?;
    for e in &errors {
        warn!("Txn #{} - {}", txn_id, e);
    }

    let response = tokio::time::timeout(timeout, rx)
        .await
        .map_err(|_| anyhow::anyhow!("Txn #{} - timed out waiting for Map response", txn_id))?
        .map_err(|_| anyhow::anyhow!("Txn #{} - Map response was dropped", txn_id))?;

    info!(
        "Txn #{} - Map response delivered with status {} ({} partitions)",
        txn_id,
        response.status,
        response.partitions_count()
    );
    site.complete(ts);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::TransactionMapCoordinator;
    use crate::testing::{recording_callback, StaticSite};
    use crate::txn::TxnPhase;

    #[test]
    fn test_report_partitions_unblocks_once() {
        let site = StaticSite::new(&[0, 1, 2, 3, 4, 5, 6, 7]);
        let ts = MapReduceTransaction::new(
            1,
            Arc::new(TransactionMapCoordinator::new(site.controller())),
        );
        let (callback, _delivered) = recording_callback();
        ts.init_map(callback).unwrap();

        let errors = report_partitions(&ts, &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert!(errors.is_empty());
        assert_eq!(site.sink().enqueued_ids(), vec![1]);
        assert_eq!(ts.phase(), TxnPhase::Shuffle);

        let mut partitions = ts.map_callback().aggregate().unwrap().partitions;
        partitions.sort_unstable();
        assert_eq!(partitions, vec![0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_abort_after_partial_completion() {
        let site = StaticSite::new(&[0, 1, 2, 3]);
        let ts = MapReduceTransaction::new(
            2,
            Arc::new(TransactionMapCoordinator::new(site.controller())),
        );
        let (callback, delivered) = recording_callback();
        ts.init_map(callback).unwrap();

        let errors = drive_map_phase(
            &ts,
            &[0, 1, 2, 3],
            Outcome::AbortAfter {
                after: 2,
                status: Status::Aborted,
            },
        );
        assert!(errors.is_empty());

        let responses = delivered.lock();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status, Status::Aborted);
        assert_eq!(responses[0].partitions_count(), 4);
        assert!(site.sink().is_empty());
    }
}
