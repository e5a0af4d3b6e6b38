//! Generic countdown callback
//!
//! A `BlockingCallback` waits for a fixed number of completion signals from
//! independent partition threads, folding each one into an aggregate, and
//! reports the unblock exactly once: either when the expected count is reached
//! or when the first abort arrives, whichever wins the race.
//!
//! The callback is configured with function values instead of subclass hooks:
//!
//! - a *fold* step that merges one completion unit into the aggregate and
//!   returns how many completions it accounts for
//! - an optional *abort* step that patches the aggregate when the callback is
//!   aborted (status stamping, back-filling)
//!
//! The unblock action itself is not run by this type. Operations return a
//! [`Progress`] value and the single caller that receives
//! [`Progress::Unblocked`] performs the downstream work, after every internal
//! lock has been released.
//!
//! ```text
//! Uninitialized --init--> Running --count reached--> Completed --finish--> Uninitialized
//!                            |                          ^
//!                            +--------abort------> Aborted
//! ```

use super::counter::Counter;
use super::response::Status;
use super::TxnId;
use crate::error::{CoordinationError, CoordinationResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace, warn};

/// Continuation supplied by the caller that receives the final aggregate
pub type OrigCallback<A> = Box<dyn FnOnce(A) + Send>;

/// Folds one completion unit into the aggregate. The flag is true once the
/// callback has been aborted.
pub type FoldFn<U, A> =
    dyn Fn(TxnId, &mut A, U, bool) -> CoordinationResult<usize> + Send + Sync;

/// Patches the aggregate when the callback is aborted
pub type AbortFn<A> = dyn Fn(TxnId, &mut A, Status) + Send + Sync;

/// Snapshot handed to the single winner of the unblock race
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unblocked<A> {
    pub txn_id: TxnId,
    pub aggregate: A,
    /// Completion count the callback was initialized with
    pub expected: usize,
    pub aborted: bool,
}

/// Result of reporting a completion or an abort
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress<A> {
    /// Still waiting on other partitions
    Pending { remaining: usize },
    /// This call fired the unblock; the caller owns the follow-up work
    Unblocked(Unblocked<A>),
    /// The unblock already fired for this cycle; nothing to do
    AlreadySettled,
}

impl<A> Progress<A> {
    pub fn is_unblocked(&self) -> bool {
        matches!(self, Progress::Unblocked(_))
    }
}

/// An `init` that was refused, carrying the continuation it was given
pub struct Refused<A> {
    pub error: CoordinationError,
    pub orig_callback: OrigCallback<A>,
}

impl<A> std::fmt::Debug for Refused<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Refused")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

struct CallbackState<A> {
    txn_id: TxnId,
    aggregate: A,
    orig_callback: Option<OrigCallback<A>>,
}

/// Reusable countdown callback over completion units `U` and aggregate `A`
pub struct BlockingCallback<U, A> {
    name: &'static str,
    counter: Counter,
    unblocked: AtomicBool,
    state: Mutex<Option<CallbackState<A>>>,
    fold: Box<FoldFn<U, A>>,
    abort: Box<AbortFn<A>>,
}

impl<U, A> BlockingCallback<U, A>
where
    A: Clone + Send,
{
    /// Create an uninitialized callback with the given fold step
    pub fn new<F>(name: &'static str, fold: F) -> Self
    where
        F: Fn(TxnId, &mut A, U, bool) -> CoordinationResult<usize> + Send + Sync + 'static,
    {
        Self {
            name,
            counter: Counter::new(),
            unblocked: AtomicBool::new(false),
            state: Mutex::new(None),
            fold: Box::new(fold),
            abort: Box::new(|_, _, _| {}),
        }
    }

    /// Install the abort step
    pub fn with_abort<F>(mut self, abort: F) -> Self
    where
        F: Fn(TxnId, &mut A, Status) + Send + Sync + 'static,
    {
        self.abort = Box::new(abort);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Arm the callback for one transaction
    ///
    /// Initializing an already-initialized callback is a coordination bug and
    /// is refused without touching the running cycle. The refused continuation
    /// is dropped; use [`BlockingCallback::try_init`] to get it back.
    pub fn init(
        &self,
        txn_id: TxnId,
        aggregate: A,
        expected: usize,
        orig_callback: OrigCallback<A>,
    ) -> CoordinationResult<()> {
        self.try_init(txn_id, aggregate, expected, orig_callback)
            .map_err(|refused| refused.error)
    }

    /// Like [`BlockingCallback::init`], but a refusal hands the continuation
    /// back so the caller can still answer it
    pub fn try_init(
        &self,
        txn_id: TxnId,
        aggregate: A,
        expected: usize,
        orig_callback: OrigCallback<A>,
    ) -> Result<(), Refused<A>> {
        let mut guard = self.state.lock();
        if let Some(existing) = guard.as_ref() {
            return Err(Refused {
                error: CoordinationError::AlreadyInitialized {
                    callback: self.name,
                    txn_id: existing.txn_id,
                },
                orig_callback,
            });
        }
        if let Err(error) = self.counter.init(expected) {
            return Err(Refused {
                error,
                orig_callback,
            });
        }
        self.unblocked.store(false, Ordering::Release);
        *guard = Some(CallbackState {
            txn_id,
            aggregate,
            orig_callback: Some(orig_callback),
        });

        debug!(
            "Txn #{} - {} armed for {} completions",
            txn_id, self.name, expected
        );
        Ok(())
    }

    /// Report one completion unit
    ///
    /// The fold step runs under the aggregate lock; the counter is bumped after
    /// the lock is released. Exactly one caller across all completion and abort
    /// paths observes [`Progress::Unblocked`].
    pub fn on_partition_complete(&self, unit: U) -> CoordinationResult<Progress<A>> {
        let (txn_id, delta) = {
            let mut guard = self.state.lock();
            let state = guard.as_mut().ok_or(CoordinationError::NotInitialized {
                callback: self.name,
            })?;
            let aborted = self.counter.is_aborted();
            let delta = (self.fold)(state.txn_id, &mut state.aggregate, unit, aborted)?;
            (state.txn_id, delta)
        };

        let current = self.counter.add(delta);
        let target = self.counter.target();
        trace!(
            "Txn #{} - {} received {}/{} completions",
            txn_id,
            self.name,
            current,
            target
        );

        if current < target {
            return Ok(Progress::Pending {
                remaining: target - current,
            });
        }
        if current > target {
            warn!(
                "Txn #{} - {} received {} completions but only expected {}",
                txn_id, self.name, current, target
            );
        }
        if current != target || self.counter.is_aborted() || !self.claim_unblock() {
            return Ok(Progress::AlreadySettled);
        }

        self.snapshot(false)
    }

    /// Abort the callback with `status`
    ///
    /// The first abort that wins the unblock race applies the abort step and
    /// returns [`Progress::Unblocked`]. Later aborts, or an abort racing with a
    /// completed countdown that already fired, are no-ops and leave the abort
    /// flag untouched.
    pub fn on_abort(&self, status: Status) -> CoordinationResult<Progress<A>> {
        if !self.is_initialized() {
            return Err(CoordinationError::NotInitialized {
                callback: self.name,
            });
        }

        if !self.claim_unblock() {
            debug!(
                "{} ignoring abort with status {}: already settled",
                self.name, status
            );
            return Ok(Progress::AlreadySettled);
        }
        // Only the winner flags the counter, so a completed cycle never reads as aborted
        self.counter.mark_aborted();

        {
            let mut guard = self.state.lock();
            let state = guard.as_mut().ok_or(CoordinationError::NotInitialized {
                callback: self.name,
            })?;
            (self.abort)(state.txn_id, &mut state.aggregate, status);
        }

        self.snapshot(true)
    }

    /// Hand the aggregate to the original callback
    pub fn deliver(&self) -> CoordinationResult<()> {
        self.deliver_with(|_| {})
    }

    /// Adjust the aggregate, then hand it to the original callback
    ///
    /// Only valid after the unblock fired, and only once per cycle. The
    /// callback runs with no lock held.
    pub fn deliver_with<F>(&self, adjust: F) -> CoordinationResult<()>
    where
        F: FnOnce(&mut A),
    {
        let (callback, aggregate) = {
            let mut guard = self.state.lock();
            let state = guard.as_mut().ok_or(CoordinationError::NotInitialized {
                callback: self.name,
            })?;
            if !self.is_done() {
                return Err(CoordinationError::NotUnblocked {
                    txn_id: state.txn_id,
                });
            }
            let callback = state
                .orig_callback
                .take()
                .ok_or(CoordinationError::AlreadyDelivered {
                    txn_id: state.txn_id,
                })?;
            adjust(&mut state.aggregate);
            (callback, state.aggregate.clone())
        };

        callback(aggregate);
        Ok(())
    }

    /// Release the aggregate and continuation and return to the blank state
    ///
    /// Must not race with completion reports for the same cycle.
    pub fn finish(&self) {
        let previous = self.state.lock().take();
        if let Some(state) = previous {
            if state.orig_callback.is_some() {
                warn!(
                    "Txn #{} - {} finished without delivering its response",
                    state.txn_id, self.name
                );
            }
            debug!("Txn #{} - {} finished", state.txn_id, self.name);
        }
        self.counter.reset();
        self.unblocked.store(false, Ordering::Release);
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().is_some() && self.counter.is_initialized()
    }

    /// True once the unblock fired for the current cycle
    pub fn is_done(&self) -> bool {
        self.unblocked.load(Ordering::Acquire)
    }

    pub fn is_aborted(&self) -> bool {
        self.counter.is_aborted()
    }

    pub fn is_delivered(&self) -> bool {
        self.state
            .lock()
            .as_ref()
            .is_some_and(|state| state.orig_callback.is_none())
    }

    pub fn txn_id(&self) -> Option<TxnId> {
        self.state.lock().as_ref().map(|state| state.txn_id)
    }

    /// Completion count the current cycle was initialized with
    pub fn expected_count(&self) -> usize {
        self.counter.target()
    }

    pub fn received_count(&self) -> usize {
        self.counter.current()
    }

    /// Copy of the in-progress aggregate
    pub fn aggregate(&self) -> Option<A> {
        self.state
            .lock()
            .as_ref()
            .map(|state| state.aggregate.clone())
    }

    /// Inspect the aggregate without cloning it
    pub fn with_aggregate<R>(&self, f: impl FnOnce(&A) -> R) -> Option<R> {
        self.state.lock().as_ref().map(|state| f(&state.aggregate))
    }

    fn claim_unblock(&self) -> bool {
        self.unblocked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn snapshot(&self, aborted: bool) -> CoordinationResult<Progress<A>> {
        let guard = self.state.lock();
        let state = guard.as_ref().ok_or(CoordinationError::NotInitialized {
            callback: self.name,
        })?;
        Ok(Progress::Unblocked(Unblocked {
            txn_id: state.txn_id,
            aggregate: state.aggregate.clone(),
            expected: self.counter.target(),
            aborted,
        }))
    }
}
