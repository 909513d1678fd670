//! Non-blocking monitor acquisition and release.
//!
//! Entry tries the tiers in order: biased, stack lock, inflated. Each tier either grants ownership or
//! reports contention; nothing here blocks or allocates. Contention is resolved by the caller through
//! [`crate::runtime::SlowPath`].
//!
//! Exit never re-derives how a lock was taken from the object header. The lock record written at entry
//! says which tier granted it, and that alone selects the release action.

mod biased;
mod inflated;
mod stack;

pub use biased::{try_biased_acquire, BiasGrant, BiasedOutcome};
pub use inflated::{inflated_unlock, try_inflated_lock};
pub use stack::{try_stack_lock, StackOutcome};

use crate::config::SyncConfig;
use crate::lock::{BasicLock, RecordKind};
use crate::markword::{LockKind, MarkWord};
use crate::object::Object;
use crate::stats::{Counter, LockCounters};
use crate::thread::JavaThread;

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LockOutcome {
    Owned,
    Contended,
}

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnlockOutcome {
    Released,
    /// The slow path must finish the release. Either ownership could not be confirmed or a successor
    /// has to be woken.
    Contended,
}

impl From<StackOutcome> for LockOutcome {
    fn from(outcome: StackOutcome) -> Self {
        match outcome {
            StackOutcome::Locked | StackOutcome::Recursive => LockOutcome::Owned,
            StackOutcome::Contended => LockOutcome::Contended,
        }
    }
}

/// The tier dispatcher for one synchronizer's configuration.
#[derive(Copy, Clone)]
pub struct FastPath<'a> {
    config: &'a SyncConfig,
    counters: &'a LockCounters,
}

impl<'a> FastPath<'a> {
    pub fn new(config: &'a SyncConfig, counters: &'a LockCounters) -> Self {
        FastPath { config, counters }
    }

    /// Attempt to acquire `obj` for `thread` using `lock`, a record in the caller's frame. Must run on
    /// `thread`.
    pub fn enter(&self, obj: &Object, lock: &BasicLock, thread: &JavaThread) -> LockOutcome {
        self.counters.record(Counter::TotalEntries);
        if self.config.use_heavy_monitors {
            return LockOutcome::Contended;
        }

        match obj.mark().kind() {
            LockKind::Biased if self.config.use_biased_locking => {
                match try_biased_acquire(obj, thread) {
                    BiasedOutcome::Owned(grant) => {
                        lock.set_displaced_header(BasicLock::BIASED);
                        self.counters.record(match grant {
                            BiasGrant::Existing => Counter::BiasedLockEntries,
                            BiasGrant::Rebiased => Counter::RebiasedLockEntries,
                            BiasGrant::Anonymous => Counter::AnonymouslyBiasedLockEntries,
                        });
                        self.counters.record(Counter::FastPathEntries);
                        return LockOutcome::Owned;
                    }
                    BiasedOutcome::Contended => return LockOutcome::Contended,
                    BiasedOutcome::Revoked => self.counters.record(Counter::RevokedLockEntries),
                    BiasedOutcome::NotApplicable => {}
                }
            }
            LockKind::Inflated => return self.enter_inflated(obj, lock, thread),
            _ => {}
        }

        let window = self.config.recursion_window.min(SyncConfig::max_recursion_window());
        match try_stack_lock(obj, lock, window) {
            StackOutcome::Locked => {
                self.counters.record(Counter::StackLockEntries);
                self.counters.record(Counter::FastPathEntries);
                LockOutcome::Owned
            }
            StackOutcome::Recursive => {
                self.counters.record(Counter::RecursiveStackLockEntries);
                self.counters.record(Counter::FastPathEntries);
                LockOutcome::Owned
            }
            // Inflated since the header was first read
            StackOutcome::Contended if obj.mark().has_monitor() => {
                self.enter_inflated(obj, lock, thread)
            }
            StackOutcome::Contended => LockOutcome::Contended,
        }
    }

    fn enter_inflated(&self, obj: &Object, lock: &BasicLock, thread: &JavaThread) -> LockOutcome {
        let outcome = try_inflated_lock(obj, thread);
        if outcome == LockOutcome::Owned {
            lock.set_displaced_header(BasicLock::UNUSED_MARK);
            self.counters.record(Counter::InflatedLockEntries);
            self.counters.record(Counter::FastPathEntries);
        }
        outcome
    }

    /// Release the acquisition recorded in `lock`.
    pub fn exit(&self, obj: &Object, lock: &BasicLock, thread: &JavaThread) -> UnlockOutcome {
        if self.config.use_heavy_monitors {
            return UnlockOutcome::Contended;
        }

        let outcome = match lock.kind() {
            RecordKind::Biased => {
                debug_assert!(
                    !obj.mark().has_bias_pattern()
                        || obj.mark().biased_owner() == Some(thread.token()),
                    "released {:?} which is biased toward another thread",
                    obj
                );
                UnlockOutcome::Released
            }
            RecordKind::Recursive => UnlockOutcome::Released,
            RecordKind::Inflated => inflated_unlock(obj, thread),
            RecordKind::Displaced(header) => {
                match obj.cas_mark(MarkWord::encode_stack_lock(lock), header) {
                    Ok(_) => UnlockOutcome::Released,
                    Err(_) => UnlockOutcome::Contended,
                }
            }
        };

        if outcome == UnlockOutcome::Released {
            self.counters.record(Counter::FastPathExits);
        }
        outcome
    }
}
