//! Outbound Map-phase response and status codes

use super::{PartitionId, TxnId};
use serde::{Deserialize, Serialize};

/// Outcome status carried by every outbound transaction response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Ok,
    Aborted,
    AbortRestart,
    AbortReject,
    AbortUnexpected,
    InternalError,
}

impl Status {
    /// True for every status other than `Ok`
    pub fn is_abort(&self) -> bool {
        !matches!(self, Status::Ok)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Status::Ok => "OK",
            Status::Aborted => "ABORTED",
            Status::AbortRestart => "ABORT_RESTART",
            Status::AbortReject => "ABORT_REJECT",
            Status::AbortUnexpected => "ABORT_UNEXPECTED",
            Status::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", name)
    }
}

/// Response aggregate for one transaction's Map phase on this site
///
/// Built incrementally as local partitions report in. `partitions` keeps
/// arrival order and never contains the same partition twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMapResponse {
    pub transaction_id: TxnId,
    pub status: Status,
    pub partitions: Vec<PartitionId>,
}

impl TransactionMapResponse {
    /// Fresh response with status `Ok` and no partitions
    pub fn new(transaction_id: TxnId) -> Self {
        Self {
            transaction_id,
            status: Status::Ok,
            partitions: Vec::new(),
        }
    }

    pub fn contains_partition(&self, partition: PartitionId) -> bool {
        self.partitions.contains(&partition)
    }

    pub fn partitions_count(&self) -> usize {
        self.partitions.len()
    }

    /// Append a partition unless it is already present. Returns false on duplicates.
    pub fn add_partition(&mut self, partition: PartitionId) -> bool {
        if self.contains_partition(partition) {
            return false;
        }
        self.partitions.push(partition);
        true
    }
}
