//! Error types for the coordination layer
//!
//! `CoordinationError` covers everything a coordinator, transaction handle or
//! shuffle worker can refuse to do. Each variant maps to a stable code from
//! [`ErrorCode`]. Variants for which [`CoordinationError::is_fatal`] returns true
//! are protocol bugs in the caller and are never retried.

use crate::coordination::{PartitionId, TxnId};
use crate::txn::TxnPhase;
use thiserror::Error;

pub mod codes;

pub use codes::{describe_error_code, ErrorCode};

/// Errors raised by the node-local coordination layer
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoordinationError {
    #[error("[E{code:04}] Counter already initialized with target {target}", code = ErrorCode::COORD_ALREADY_INITIALIZED)]
    CounterAlreadyInitialized { target: usize },

    #[error("[E{code:04}] Invalid completion target {target}", code = ErrorCode::COORD_INVALID_TARGET)]
    InvalidTarget { target: usize },

    #[error("[E{code:04}] Trying to initialize {callback} twice (current txn #{txn_id})", code = ErrorCode::COORD_ALREADY_INITIALIZED)]
    AlreadyInitialized {
        callback: &'static str,
        txn_id: TxnId,
    },

    #[error("[E{code:04}] {callback} is not initialized", code = ErrorCode::COORD_NOT_INITIALIZED)]
    NotInitialized { callback: &'static str },

    #[error("[E{code:04}] Txn #{txn_id} - partition {partition} reported more than once", code = ErrorCode::COORD_DUPLICATE_PARTITION)]
    DuplicatePartition {
        txn_id: TxnId,
        partition: PartitionId,
    },

    #[error("[E{code:04}] Txn #{txn_id} - partition {partition} is not local to this site", code = ErrorCode::COORD_UNKNOWN_PARTITION)]
    UnknownPartition {
        txn_id: TxnId,
        partition: PartitionId,
    },

    #[error("[E{code:04}] Txn #{txn_id} - response has results from {actual} partitions but expected {expected}", code = ErrorCode::COORD_COUNT_MISMATCH)]
    CountMismatch {
        txn_id: TxnId,
        expected: usize,
        actual: usize,
    },

    #[error("[E{code:04}] Txn #{txn_id} - callback has not unblocked yet", code = ErrorCode::COORD_NOT_UNBLOCKED)]
    NotUnblocked { txn_id: TxnId },

    #[error("[E{code:04}] Txn #{txn_id} - original response already delivered", code = ErrorCode::COORD_ALREADY_DELIVERED)]
    AlreadyDelivered { txn_id: TxnId },

    #[error("[E{code:04}] Txn #{txn_id} - invalid phase transition from {from} to {to}", code = ErrorCode::PHASE_INVALID_TRANSITION)]
    InvalidPhaseTransition {
        txn_id: TxnId,
        from: TxnPhase,
        to: TxnPhase,
    },

    #[error("[E{code:04}] Txn #{txn_id} - transaction handle dropped", code = ErrorCode::PHASE_TRANSACTION_DROPPED)]
    TransactionDropped { txn_id: TxnId },

    #[error("[E{code:04}] Site {site_id} has no shuffle worker registered", code = ErrorCode::SHUFFLE_WORKER_MISSING)]
    MissingShuffleWorker { site_id: u32 },

    #[error("[E{code:04}] Txn #{txn_id} - shuffle queue is closed", code = ErrorCode::SHUFFLE_QUEUE_CLOSED)]
    ShuffleQueueClosed { txn_id: TxnId },
}

impl CoordinationError {
    /// Stable numeric code for this error
    pub fn code(&self) -> u16 {
        match self {
            Self::CounterAlreadyInitialized { .. } | Self::AlreadyInitialized { .. } => {
                ErrorCode::COORD_ALREADY_INITIALIZED
            }
            Self::InvalidTarget { .. } => ErrorCode::COORD_INVALID_TARGET,
            Self::NotInitialized { .. } => ErrorCode::COORD_NOT_INITIALIZED,
            Self::DuplicatePartition { .. } => ErrorCode::COORD_DUPLICATE_PARTITION,
            Self::UnknownPartition { .. } => ErrorCode::COORD_UNKNOWN_PARTITION,
            Self::CountMismatch { .. } => ErrorCode::COORD_COUNT_MISMATCH,
            Self::NotUnblocked { .. } => ErrorCode::COORD_NOT_UNBLOCKED,
            Self::AlreadyDelivered { .. } => ErrorCode::COORD_ALREADY_DELIVERED,
            Self::InvalidPhaseTransition { .. } => ErrorCode::PHASE_INVALID_TRANSITION,
            Self::TransactionDropped { .. } => ErrorCode::PHASE_TRANSACTION_DROPPED,
            Self::MissingShuffleWorker { .. } => ErrorCode::SHUFFLE_WORKER_MISSING,
            Self::ShuffleQueueClosed { .. } => ErrorCode::SHUFFLE_QUEUE_CLOSED,
        }
    }

    /// Coordination-invariant violations: a bug in the caller's usage protocol
    ///
    /// Configuration errors (missing or closed shuffle worker) are not fatal in
    /// this sense; they are surfaced to the site controller instead.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::MissingShuffleWorker { .. } | Self::ShuffleQueueClosed { .. }
        )
    }
}

pub type CoordinationResult<T> = Result<T, CoordinationError>;
