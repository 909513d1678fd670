//! The runtime half of object locking: the slow path behind [`FastPath`].
//!
//! [`ObjectSynchronizer`] is the entry point generated code and native callers use. It registers the
//! caller's monitor slot, runs the fast path and hands contention to [`SlowPath`], which can revoke
//! biases, inflate headers and block.

pub mod inflate;
pub mod monitor;
pub mod revoke;
pub mod safepoint;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::fastpath::{FastPath, LockOutcome, UnlockOutcome};
use crate::lock::{BasicLock, BasicObjectLock, RecordKind};
use crate::markword::{LockState, MarkWord};
use crate::object::{Klass, Object};
use crate::stats::{Counter, LockCounters, LockStatistics};
use crate::thread::JavaThread;
use std::sync::Arc;
use std::thread;

pub use revoke::RevokeResult;

/// Resolution of contended lock operations. Only called after the fast path returned `Contended`.
pub trait SlowPath {
    fn slow_enter(&self, obj: &Object, lock: &BasicObjectLock, thread: &JavaThread) -> SyncResult<()>;

    fn slow_exit(&self, obj: &Object, lock: &BasicObjectLock, thread: &JavaThread) -> SyncResult<()>;
}

pub struct ObjectSynchronizer {
    config: SyncConfig,
    counters: LockCounters,
}

impl ObjectSynchronizer {
    pub fn new(config: SyncConfig) -> Self {
        info!("Creating object synchronizer with {:?}", config);
        if config.recursion_window > SyncConfig::max_recursion_window() {
            warn!(
                "Recursion window of {} bytes exceeds a page, using {}",
                config.recursion_window,
                SyncConfig::max_recursion_window()
            );
        }
        let counters = LockCounters::new(config.collect_statistics);
        ObjectSynchronizer { config, counters }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn counters(&self) -> &LockCounters {
        &self.counters
    }

    pub fn statistics(&self) -> LockStatistics {
        self.counters.snapshot()
    }

    /// Create a class whose instances are biasable when biased locking is enabled.
    pub fn new_klass<S: Into<String>>(&self, name: S) -> Arc<Klass> {
        Klass::new(name, self.config.use_biased_locking && !self.config.use_heavy_monitors)
    }

    #[inline]
    pub fn fast_path(&self) -> FastPath<'_> {
        FastPath::new(&self.config, &self.counters)
    }

    /// Enter the monitor of `obj` using `lock` as the monitor slot.
    ///
    /// # Safety
    /// `lock` must stay at the same address until the matching [`ObjectSynchronizer::exit`], `obj`
    /// must outlive that exit, and `thread` must be the calling thread.
    pub unsafe fn enter(&self, obj: &Object, lock: &BasicObjectLock, thread: &JavaThread) -> SyncResult<()> {
        safepoint::poll();
        lock.set_object(obj);
        thread.push_monitor(lock);

        if self.fast_path().enter(obj, lock.lock(), thread) == LockOutcome::Owned {
            return Ok(());
        }

        let result = self.slow_enter(obj, lock, thread);
        if result.is_err() {
            thread.pop_monitor(lock);
        }
        result
    }

    /// Exit the monitor entered with `lock`.
    ///
    /// # Safety
    /// `lock` must have been passed to a successful [`ObjectSynchronizer::enter`] on the same thread
    /// and not been exited since.
    pub unsafe fn exit(&self, obj: &Object, lock: &BasicObjectLock, thread: &JavaThread) -> SyncResult<()> {
        let result = match self.fast_path().exit(obj, lock.lock(), thread) {
            UnlockOutcome::Released => Ok(()),
            UnlockOutcome::Contended => self.slow_exit(obj, lock, thread),
        };

        thread.pop_monitor(lock);
        safepoint::poll();
        result
    }

    /// Run `body` while holding the monitor of `obj`. The monitor is released even if `body` panics.
    ///
    /// `thread` must be the control block of the calling thread, otherwise this fails with
    /// [`SyncError::NotAttached`] or [`SyncError::ForeignThread`] without touching `obj`.
    pub fn synchronized<R, F>(&self, obj: &Object, thread: &JavaThread, body: F) -> SyncResult<R>
    where
        F: FnOnce(&BasicObjectLock) -> R,
    {
        thread.ensure_current()?;
        let lock = BasicObjectLock::new();
        // SAFETY: the slot lives on this frame and is exited before it returns
        unsafe { self.enter(obj, &lock, thread)? };

        let mut region = Region {
            sync: self,
            obj,
            lock: &lock,
            thread,
            armed: true,
        };
        let result = body(&lock);

        region.armed = false;
        // SAFETY: entered above on this thread
        unsafe { self.exit(obj, &lock, thread)? };
        Ok(result)
    }

    /// Whether `thread` currently holds the monitor of `obj`.
    pub fn holds_lock(&self, obj: &Object, thread: &JavaThread) -> bool {
        match obj.lock_state() {
            LockState::Neutral { .. } => false,
            LockState::Biased { owner, .. } => {
                owner == Some(thread.token())
                    && thread
                        .monitor_slots()
                        .into_iter()
                        // SAFETY: registered slots are live
                        .any(|slot| unsafe { &*(slot as *const BasicObjectLock) }.object() == obj as *const Object)
            }
            LockState::StackLocked(lock) => !lock.is_null() && thread.owns_record(lock as usize),
            // SAFETY: installed monitors are never freed
            LockState::Inflated(monitor) => unsafe { &*monitor }.is_held_by(thread),
        }
    }

    pub fn revoke_bias(&self, obj: &Object) -> RevokeResult {
        let result = revoke::revoke(obj);
        if result != RevokeResult::NotBiased {
            self.counters.record(Counter::Revocations);
        }
        result
    }

    pub fn bulk_rebias(&self, klass: &Arc<Klass>) -> Option<u8> {
        revoke::bulk_rebias(klass)
    }

    pub fn bulk_revoke(&self, klass: &Arc<Klass>) {
        revoke::bulk_revoke(klass)
    }
}

impl SlowPath for ObjectSynchronizer {
    fn slow_enter(&self, obj: &Object, lock: &BasicObjectLock, thread: &JavaThread) -> SyncResult<()> {
        self.counters.record(Counter::SlowPathEntries);
        let record = lock.lock();

        let mut mark = obj.mark();
        while mark.has_bias_pattern() {
            let _ = self.revoke_bias(obj);
            mark = obj.mark();
        }

        if !self.config.use_heavy_monitors {
            if mark.is_neutral() {
                record.set_displaced_header(mark);
                if obj.cas_mark(mark, MarkWord::encode_stack_lock(record)).is_ok() {
                    return Ok(());
                }
            } else if mark.is_stack_locked() && !mark.is_inflating() && thread.owns_record(mark.raw()) {
                record.set_displaced_header(BasicLock::RECURSIVE);
                return Ok(());
            }
        }

        record.set_displaced_header(BasicLock::UNUSED_MARK);
        let monitor = inflate::inflate(obj, &self.counters);
        monitor.enter(thread, &self.config);
        self.counters.record(Counter::MonitorEntries);
        Ok(())
    }

    fn slow_exit(&self, obj: &Object, lock: &BasicObjectLock, thread: &JavaThread) -> SyncResult<()> {
        self.counters.record(Counter::SlowPathExits);
        let record = lock.lock();
        let illegal = SyncError::IllegalMonitorState {
            object: obj.address(),
        };

        match record.kind() {
            RecordKind::Biased | RecordKind::Recursive => Ok(()),
            RecordKind::Displaced(header) => loop {
                let mark = obj.mark();
                if mark.is_inflating() {
                    thread::yield_now();
                } else if mark.has_monitor() {
                    return inflate::inflate(obj, &self.counters).exit(thread);
                } else if mark == MarkWord::encode_stack_lock(record) {
                    if obj.cas_mark(mark, header).is_ok() {
                        return Ok(());
                    }
                } else {
                    warn!("{:?} released {:?} through a record it does not hold", thread, obj);
                    return Err(illegal);
                }
            },
            RecordKind::Inflated => match obj.mark().has_monitor() {
                true => inflate::inflate(obj, &self.counters).exit(thread),
                false => Err(illegal),
            },
        }
    }
}

/// Releases the monitor if the body of [`ObjectSynchronizer::synchronized`] unwinds.
struct Region<'a> {
    sync: &'a ObjectSynchronizer,
    obj: &'a Object,
    lock: &'a BasicObjectLock,
    thread: &'a JavaThread,
    armed: bool,
}

impl Drop for Region<'_> {
    fn drop(&mut self) {
        if self.armed {
            // SAFETY: the region was entered and has not been exited
            if let Err(e) = unsafe { self.sync.exit(self.obj, self.lock, self.thread) } {
                error!("Failed to release {:?} while unwinding: {}", self.obj, e);
            }
        }
    }
}
