//! MapReduce transaction handle and its phase machine
//!
//! ```text
//! [Map] → [Shuffle] → [Reduce] → [Done]
//! ```
//!
//! Transitions are single-step and monotonic. Because `Map → Shuffle` can only
//! succeed once, a transaction reaches the shuffle queue at most once.

use crate::coordination::{OrigCallback, TransactionMapCoordinator, TransactionMapResponse, TxnId};
use crate::error::{CoordinationError, CoordinationResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Execution phase of a MapReduce transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TxnPhase {
    Map,
    Shuffle,
    Reduce,
    Done,
}

impl TxnPhase {
    /// The phase that follows this one, if any
    pub fn next(self) -> Option<TxnPhase> {
        match self {
            TxnPhase::Map => Some(TxnPhase::Shuffle),
            TxnPhase::Shuffle => Some(TxnPhase::Reduce),
            TxnPhase::Reduce => Some(TxnPhase::Done),
            TxnPhase::Done => None,
        }
    }

    pub fn is_valid_transition(from: TxnPhase, to: TxnPhase) -> bool {
        from.next() == Some(to)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TxnPhase::Done)
    }
}

impl std::fmt::Display for TxnPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxnPhase::Map => write!(f, "MAP"),
            TxnPhase::Shuffle => write!(f, "SHUFFLE"),
            TxnPhase::Reduce => write!(f, "REDUCE"),
            TxnPhase::Done => write!(f, "DONE"),
        }
    }
}

/// Handle for one distributed MapReduce transaction on this site
///
/// Shared by `Arc` between the site controller, the partition threads and the
/// shuffle worker. The handle owns a reference to the coordinator that tracks
/// its Map phase; the coordinator only keeps a weak reference back.
pub struct MapReduceTransaction {
    txn_id: TxnId,
    phase: Mutex<TxnPhase>,
    map_callback: Arc<TransactionMapCoordinator>,
}

impl MapReduceTransaction {
    /// Create a handle in the `Map` phase
    pub fn new(txn_id: TxnId, map_callback: Arc<TransactionMapCoordinator>) -> Arc<Self> {
        Arc::new(Self {
            txn_id,
            phase: Mutex::new(TxnPhase::Map),
            map_callback,
        })
    }

    /// Arm this transaction's Map coordinator
    pub fn init_map(
        self: &Arc<Self>,
        orig_callback: OrigCallback<TransactionMapResponse>,
    ) -> CoordinationResult<()> {
        self.map_callback.init(self, orig_callback)
    }

    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }

    pub fn phase(&self) -> TxnPhase {
        *self.phase.lock()
    }

    pub fn map_callback(&self) -> &Arc<TransactionMapCoordinator> {
        &self.map_callback
    }

    /// Move to `to`, which must be the immediate successor of the current phase
    pub fn advance_to(&self, to: TxnPhase) -> CoordinationResult<()> {
        let mut phase = self.phase.lock();
        let from = *phase;
        if !TxnPhase::is_valid_transition(from, to) {
            return Err(CoordinationError::InvalidPhaseTransition {
                txn_id: self.txn_id,
                from,
                to,
            });
        }
        *phase = to;
        debug!("Txn #{} - transitioned from {} to {}", self.txn_id, from, to);
        Ok(())
    }

    pub fn set_shuffle_phase(&self) -> CoordinationResult<()> {
        self.advance_to(TxnPhase::Shuffle)
    }

    pub fn set_reduce_phase(&self) -> CoordinationResult<()> {
        self.advance_to(TxnPhase::Reduce)
    }

    pub fn set_done(&self) -> CoordinationResult<()> {
        self.advance_to(TxnPhase::Done)
    }
}

impl std::fmt::Debug for MapReduceTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapReduceTransaction")
            .field("txn_id", &self.txn_id)
            .field("phase", &self.phase())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticSite;

    fn transaction(txn_id: TxnId) -> Arc<MapReduceTransaction> {
        let site = StaticSite::new(&[0, 1]);
        MapReduceTransaction::new(
            txn_id,
            Arc::new(TransactionMapCoordinator::new(site.controller())),
        )
    }

    #[test]
    fn test_phase_order() {
        assert_eq!(TxnPhase::Map.next(), Some(TxnPhase::Shuffle));
        assert_eq!(TxnPhase::Done.next(), None);
        assert!(TxnPhase::is_valid_transition(TxnPhase::Shuffle, TxnPhase::Reduce));
        assert!(!TxnPhase::is_valid_transition(TxnPhase::Map, TxnPhase::Reduce));
        assert!(!TxnPhase::is_valid_transition(TxnPhase::Reduce, TxnPhase::Shuffle));
        assert!(TxnPhase::Done.is_terminal());
        assert!(TxnPhase::Map < TxnPhase::Done);
    }

    #[test]
    fn test_full_lifecycle() {
        let ts = transaction(3);
        assert_eq!(ts.phase(), TxnPhase::Map);
        ts.set_shuffle_phase().unwrap();
        ts.set_reduce_phase().unwrap();
        ts.set_done().unwrap();
        assert_eq!(ts.phase(), TxnPhase::Done);
    }

    #[test]
    fn test_shuffle_transition_only_once() {
        let ts = transaction(8);
        ts.set_shuffle_phase().unwrap();
        let err = ts.set_shuffle_phase().unwrap_err();
        assert_eq!(
            err,
            CoordinationError::InvalidPhaseTransition {
                txn_id: 8,
                from: TxnPhase::Shuffle,
                to: TxnPhase::Shuffle,
            }
        );
    }

    #[test]
    fn test_skipping_phases_rejected() {
        let ts = transaction(9);
        assert!(ts.set_done().is_err());
        assert_eq!(ts.phase(), TxnPhase::Map);
    }
}
