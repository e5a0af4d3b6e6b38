//! Map-phase coordinator
//!
//! Used on the remote side of a Map request so that the network-outbound
//! callback is not invoked until every partition on this site has finished
//! its Map fragment. On completion the transaction is switched to the shuffle
//! phase and handed to the shuffle worker; the original response is only sent
//! once that pipeline calls [`TransactionMapCoordinator::deliver_original_response`].
//! On abort the partial response is sent immediately.

use super::blocking::{BlockingCallback, OrigCallback, Progress, Unblocked};
use super::response::{Status, TransactionMapResponse};
use super::{PartitionId, TxnId};
use crate::error::{CoordinationError, CoordinationResult};
use crate::site::SiteController;
use crate::txn::MapReduceTransaction;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{debug, error, warn};

const NAME: &str = "TransactionMapCoordinator";

pub type MapProgress = Progress<TransactionMapResponse>;

/// Countdown over this site's local partitions for one transaction's Map phase
pub struct TransactionMapCoordinator {
    site: Arc<dyn SiteController>,
    callback: BlockingCallback<PartitionId, TransactionMapResponse>,
    ts: Mutex<Option<Weak<MapReduceTransaction>>>,
}

impl TransactionMapCoordinator {
    pub fn new(site: Arc<dyn SiteController>) -> Self {
        let fold_site = site.clone();
        let abort_site = site.clone();

        let callback = BlockingCallback::new(
            NAME,
            move |txn_id, response: &mut TransactionMapResponse, partition: PartitionId, aborted: bool| {
                if !fold_site.local_partition_ids().contains(&partition) {
                    return Err(CoordinationError::UnknownPartition { txn_id, partition });
                }
                // Back-filled by the abort step; late reports only count.
                if aborted {
                    return Ok(1);
                }
                if !response.add_partition(partition) {
                    return Err(CoordinationError::DuplicatePartition { txn_id, partition });
                }
                Ok(1)
            },
        )
        .with_abort(move |txn_id, response, status| {
            debug!(
                "Txn #{} - Aborting {} with status {}",
                txn_id, NAME, status
            );
            response.status = status;
            for &partition in abort_site.local_partition_ids() {
                response.add_partition(partition);
            }
        });

        Self {
            site,
            callback,
            ts: Mutex::new(None),
        }
    }

    /// Arm the coordinator for `ts`, expecting one report per local partition
    ///
    /// A refused init still answers `orig_callback`, with `INTERNAL_ERROR` and
    /// every local partition, so the caller of the refused transaction is
    /// never left waiting.
    pub fn init(
        &self,
        ts: &Arc<MapReduceTransaction>,
        orig_callback: OrigCallback<TransactionMapResponse>,
    ) -> CoordinationResult<()> {
        let txn_id = ts.txn_id();
        let expected = self.site.local_partition_ids().len();

        // Held while arming so an unblock never sees an armed callback without its transaction
        let mut slot = self.ts.lock();
        let refused = match self.callback.try_init(
            txn_id,
            TransactionMapResponse::new(txn_id),
            expected,
            orig_callback,
        ) {
            Ok(()) => {
                *slot = Some(Arc::downgrade(ts));
                debug!("Starting new {} for txn #{}", NAME, txn_id);
                return Ok(());
            }
            Err(refused) => refused,
        };
        drop(slot);

        match &refused.error {
            CoordinationError::AlreadyInitialized { txn_id: current, .. } => error!(
                "Trying to initialize {} twice! [origTs=#{}, newTs=#{}]",
                NAME, current, txn_id
            ),
            other => error!("Txn #{} - cannot initialize {}: {}", txn_id, NAME, other),
        }

        let mut response = TransactionMapResponse::new(txn_id);
        response.status = Status::InternalError;
        response.partitions = self.site.local_partition_ids().iter().copied().collect();
        (refused.orig_callback)(response);
        Err(refused.error)
    }

    /// Record that `partition` finished its Map fragment
    ///
    /// Duplicate or foreign partition reports are coordination bugs: the
    /// transaction is aborted with `INTERNAL_ERROR` and the violation returned.
    pub fn on_partition_complete(&self, partition: PartitionId) -> CoordinationResult<MapProgress> {
        match self.callback.on_partition_complete(partition) {
            Ok(progress) => {
                if let Progress::Unblocked(unblocked) = &progress {
                    self.unblock(unblocked)?;
                }
                Ok(progress)
            }
            Err(violation @ CoordinationError::NotInitialized { .. }) => Err(violation),
            Err(violation) => {
                error!("{}", violation);
                self.on_abort(Status::InternalError)?;
                Err(violation)
            }
        }
    }

    /// Abort the Map phase
    ///
    /// The first abort stamps `status`, back-fills every local partition that
    /// has not reported and delivers the response to the original callback.
    /// Repeated aborts are no-ops.
    pub fn on_abort(&self, status: Status) -> CoordinationResult<MapProgress> {
        let progress = self.callback.on_abort(status)?;
        if let Progress::Unblocked(unblocked) = &progress {
            self.unblock(unblocked)?;
        }
        Ok(progress)
    }

    /// Send the retained response to the original caller
    ///
    /// Called by the shuffle pipeline once the downstream phases finished.
    pub fn deliver_original_response(&self) -> CoordinationResult<()> {
        self.callback.deliver()
    }

    /// Send the retained response with `status` stamped on it
    pub fn deliver_failure(&self, status: Status) -> CoordinationResult<()> {
        self.callback
            .deliver_with(|response| response.status = status)
    }

    /// Release the transaction and response so the coordinator can be reused
    pub fn finish(&self) {
        self.callback.finish();
        *self.ts.lock() = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.ts.lock().is_some() && self.callback.is_initialized()
    }

    pub fn is_done(&self) -> bool {
        self.callback.is_done()
    }

    pub fn is_aborted(&self) -> bool {
        self.callback.is_aborted()
    }

    pub fn is_delivered(&self) -> bool {
        self.callback.is_delivered()
    }

    pub fn txn_id(&self) -> Option<TxnId> {
        self.callback.txn_id()
    }

    pub fn expected_count(&self) -> usize {
        self.callback.expected_count()
    }

    pub fn received_count(&self) -> usize {
        self.callback.received_count()
    }

    /// Current state of the outbound response
    pub fn aggregate(&self) -> Option<TransactionMapResponse> {
        self.callback.aggregate()
    }

    fn unblock(&self, unblocked: &Unblocked<TransactionMapResponse>) -> CoordinationResult<()> {
        let txn_id = unblocked.txn_id;
        let response = &unblocked.aggregate;
        debug!(
            "Txn #{} - Unblocking {} with status {} ({} partitions)",
            txn_id,
            NAME,
            response.status,
            response.partitions_count()
        );

        if response.partitions_count() != unblocked.expected {
            let violation = CoordinationError::CountMismatch {
                txn_id,
                expected: unblocked.expected,
                actual: response.partitions_count(),
            };
            error!("{}", violation);
            self.deliver_failure(Status::InternalError)?;
            return Err(violation);
        }

        if unblocked.aborted {
            return self.deliver_original_response();
        }

        if let Err(e) = self.hand_off_to_shuffle(txn_id) {
            error!("Txn #{} - failed to start shuffle phase: {}", txn_id, e);
            self.deliver_failure(Status::InternalError)?;
            return Err(e);
        }
        Ok(())
    }

    fn hand_off_to_shuffle(&self, txn_id: TxnId) -> CoordinationResult<()> {
        let ts = self
            .ts
            .lock()
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(CoordinationError::TransactionDropped { txn_id })?;
        let shuffle = self.site.shuffle_worker()?;

        ts.set_shuffle_phase()?;
        debug!(
            "Txn #{} - switching to {} phase, handing off to shuffle worker",
            txn_id,
            ts.phase()
        );
        shuffle.enqueue(ts).inspect_err(|e| {
            warn!("Txn #{} - shuffle enqueue refused: {}", txn_id, e);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{recording_callback, Delivered, StaticSite};
    use crate::txn::TxnPhase;

    fn start(site: &StaticSite, txn_id: TxnId) -> (Arc<MapReduceTransaction>, Delivered) {
        let coordinator = Arc::new(TransactionMapCoordinator::new(site.controller()));
        let ts = MapReduceTransaction::new(txn_id, coordinator);
        let (callback, delivered) = recording_callback();
        ts.init_map(callback).unwrap();
        (ts, delivered)
    }

    #[test]
    fn test_all_partitions_complete_hands_off_to_shuffle() {
        let site = StaticSite::new(&[0, 1, 2, 3]);
        let (ts, delivered) = start(&site, 100);
        let coordinator = ts.map_callback();

        for partition in 0..3 {
            assert!(!coordinator.on_partition_complete(partition).unwrap().is_unblocked());
        }
        assert!(coordinator.on_partition_complete(3).unwrap().is_unblocked());

        assert_eq!(
            coordinator.aggregate(),
            Some(TransactionMapResponse {
                transaction_id: 100,
                status: Status::Ok,
                partitions: vec![0, 1, 2, 3],
            })
        );
        assert_eq!(ts.phase(), TxnPhase::Shuffle);
        assert_eq!(site.sink().enqueued_ids(), vec![100]);
        assert!(delivered.lock().is_empty());

        coordinator.deliver_original_response().unwrap();
        assert_eq!(delivered.lock().len(), 1);
        assert_eq!(delivered.lock()[0].status, Status::Ok);
    }

    #[test]
    fn test_abort_backfills_and_delivers_immediately() {
        let site = StaticSite::new(&[0, 1, 2, 3]);
        let (ts, delivered) = start(&site, 200);
        let coordinator = ts.map_callback();

        coordinator.on_partition_complete(0).unwrap();
        coordinator.on_partition_complete(1).unwrap();
        assert!(coordinator.on_abort(Status::Aborted).unwrap().is_unblocked());

        let expected = TransactionMapResponse {
            transaction_id: 200,
            status: Status::Aborted,
            partitions: vec![0, 1, 2, 3],
        };
        assert_eq!(*delivered.lock(), vec![expected.clone()]);
        assert!(site.sink().enqueued_ids().is_empty());
        assert_eq!(ts.phase(), TxnPhase::Map);

        // Second abort changes nothing
        assert_eq!(
            coordinator.on_abort(Status::Aborted).unwrap(),
            Progress::AlreadySettled
        );
        assert_eq!(coordinator.aggregate(), Some(expected));
        assert_eq!(delivered.lock().len(), 1);
    }

    #[test]
    fn test_late_completion_after_abort_only_counts() {
        let site = StaticSite::new(&[0, 1]);
        let (ts, delivered) = start(&site, 7);
        let coordinator = ts.map_callback();

        coordinator.on_abort(Status::AbortReject).unwrap();
        assert_eq!(
            coordinator.on_partition_complete(1).unwrap(),
            Progress::Pending { remaining: 1 }
        );
        assert_eq!(
            coordinator.on_partition_complete(0).unwrap(),
            Progress::AlreadySettled
        );
        assert_eq!(delivered.lock().len(), 1);
        assert_eq!(delivered.lock()[0].partitions, vec![0, 1]);
        assert!(site.sink().enqueued_ids().is_empty());
    }

    #[test]
    fn test_duplicate_report_aborts_with_internal_error() {
        let site = StaticSite::new(&[0, 1, 2]);
        let (ts, delivered) = start(&site, 11);
        let coordinator = ts.map_callback();

        coordinator.on_partition_complete(2).unwrap();
        let err = coordinator.on_partition_complete(2).unwrap_err();
        assert_eq!(
            err,
            CoordinationError::DuplicatePartition {
                txn_id: 11,
                partition: 2,
            }
        );

        let responses = delivered.lock();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status, Status::InternalError);
        assert_eq!(responses[0].partitions, vec![2, 0, 1]);
    }

    #[test]
    fn test_foreign_partition_aborts() {
        let site = StaticSite::new(&[0, 1]);
        let (ts, delivered) = start(&site, 12);

        let err = ts.map_callback().on_partition_complete(9).unwrap_err();
        assert!(matches!(
            err,
            CoordinationError::UnknownPartition { partition: 9, .. }
        ));
        assert_eq!(delivered.lock()[0].status, Status::InternalError);
    }

    #[test]
    fn test_double_init_refused() {
        let site = StaticSite::new(&[0]);
        let (ts, _delivered) = start(&site, 1);
        let other = MapReduceTransaction::new(2, ts.map_callback().clone());

        let (refused_callback, refused_delivered) = recording_callback();

        let err = other.init_map(refused_callback).unwrap_err();
        assert_eq!(
            err,
            CoordinationError::AlreadyInitialized {
                callback: NAME,
                txn_id: 1,
            }
        );
        assert_eq!(
            *refused_delivered.lock(),
            vec![TransactionMapResponse {
                transaction_id: 2,
                status: Status::InternalError,
                partitions: vec![0],
            }]
        );

        // The running transaction is untouched and still completes
        assert_eq!(ts.map_callback().txn_id(), Some(1));
        assert!(ts.map_callback().is_initialized());
        ts.map_callback().on_partition_complete(0).unwrap();
        assert_eq!(site.sink().enqueued_ids(), vec![1]);
        assert_eq!(ts.phase(), TxnPhase::Shuffle);
    }

    #[test]
    fn test_abort_after_completion_leaves_outcome_ok() {
        let site = StaticSite::new(&[0, 1]);
        let (ts, delivered) = start(&site, 13);
        let coordinator = ts.map_callback();

        coordinator.on_partition_complete(0).unwrap();
        assert!(coordinator.on_partition_complete(1).unwrap().is_unblocked());
        assert_eq!(
            coordinator.on_abort(Status::Aborted).unwrap(),
            Progress::AlreadySettled
        );

        assert!(coordinator.is_done());
        assert!(!coordinator.is_aborted());
        assert_eq!(ts.phase(), TxnPhase::Shuffle);
        assert_eq!(coordinator.aggregate().unwrap().status, Status::Ok);
        assert!(delivered.lock().is_empty());
    }

    #[test]
    fn test_duplicate_after_completion_does_not_flip_outcome() {
        let site = StaticSite::new(&[0]);
        let (ts, _delivered) = start(&site, 14);
        let coordinator = ts.map_callback();

        coordinator.on_partition_complete(0).unwrap();
        assert!(matches!(
            coordinator.on_partition_complete(0),
            Err(CoordinationError::DuplicatePartition { partition: 0, .. })
        ));
        assert!(!coordinator.is_aborted());
        assert_eq!(coordinator.aggregate().unwrap().status, Status::Ok);
        assert_eq!(site.sink().enqueued_ids(), vec![14]);
    }

    #[test]
    fn test_handoff_does_not_keep_transaction_alive() {
        let site = StaticSite::new(&[0]);
        let (ts, _delivered) = start(&site, 15);
        let coordinator = ts.map_callback().clone();
        coordinator.on_partition_complete(0).unwrap();
        assert_eq!(site.sink().enqueued_ids(), vec![15]);

        let weak = Arc::downgrade(&ts);
        drop(ts);
        assert!(weak.upgrade().is_none());
        assert_eq!(Arc::strong_count(&coordinator), 1);
    }

    #[test]
    fn test_finish_then_init_gives_fresh_response() {
        let site = StaticSite::new(&[0, 1]);
        let (ts, _delivered) = start(&site, 1);
        let coordinator = ts.map_callback().clone();
        coordinator.on_partition_complete(0).unwrap();
        coordinator.on_partition_complete(1).unwrap();
        coordinator.finish();
        assert!(!coordinator.is_initialized());

        let next = MapReduceTransaction::new(2, coordinator.clone());
        next.init_map(Box::new(|_| {})).unwrap();
        assert!(coordinator.is_initialized());
        assert_eq!(
            coordinator.aggregate(),
            Some(TransactionMapResponse::new(2))
        );
        assert_eq!(coordinator.expected_count(), 2);
        assert_eq!(coordinator.received_count(), 0);
    }

    #[test]
    fn test_missing_shuffle_worker_is_surfaced() {
        let site = StaticSite::without_shuffle(&[0]);
        let (ts, delivered) = start(&site, 5);

        let err = ts.map_callback().on_partition_complete(0).unwrap_err();
        assert_eq!(err, CoordinationError::MissingShuffleWorker { site_id: 0 });
        assert!(!err.is_fatal());
        assert_eq!(delivered.lock()[0].status, Status::InternalError);
        assert_eq!(ts.phase(), TxnPhase::Map);
    }

    #[test]
    fn test_dropped_transaction_is_reported() {
        let site = StaticSite::new(&[0]);
        let (ts, delivered) = start(&site, 6);
        let coordinator = ts.map_callback().clone();
        drop(ts);

        let err = coordinator.on_partition_complete(0).unwrap_err();
        assert_eq!(err, CoordinationError::TransactionDropped { txn_id: 6 });
        assert_eq!(delivered.lock()[0].status, Status::InternalError);
    }
}
