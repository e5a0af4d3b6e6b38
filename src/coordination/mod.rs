//! Node-local completion tracking for distributed transactions
//!
//! A distributed transaction runs one fragment per local partition. Each
//! partition reports in independently; the response to the transaction's
//! coordinator must go out exactly once, after every local partition reported
//! or the transaction aborted.
//!
//! - [`Counter`] is the atomic bookkeeping unit
//! - [`BlockingCallback`] is the reusable countdown machine, configured with
//!   fold and abort steps
//! - [`TransactionMapCoordinator`] specializes it for the Map phase and hands
//!   the transaction to the shuffle worker when the countdown completes
//! - [`CoordinatorPool`] recycles finished coordinators

pub mod blocking;
pub mod counter;
pub mod map;
pub mod pool;
pub mod response;

/// Transaction identifier, assigned upstream
pub type TxnId = i64;

/// Partition identifier, unique within the cluster
pub type PartitionId = i32;

pub use blocking::{BlockingCallback, OrigCallback, Progress, Refused, Unblocked};
pub use counter::Counter;
pub use map::{MapProgress, TransactionMapCoordinator};
pub use pool::{CoordinatorPool, PoolMetrics};
pub use response::{Status, TransactionMapResponse};
