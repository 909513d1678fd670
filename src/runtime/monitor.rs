//! Blocking entry and exit of inflated monitors.
//!
//! Contenders first spin, then register in `cxq` and park on the monitor's condition variable. While
//! parked a thread is counted in `entry_list` instead of `cxq`. Parks are timed so a contender that
//! misses the wake-up of an exit that saw no waiters still gets to retry.

use super::safepoint;
use crate::atomic::WordCell;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::monitor::ObjectMonitor;
use crate::thread::JavaThread;
use std::hint::spin_loop;
use std::sync::atomic::Ordering;

/// Marker stored in `succ` between waking a parked contender and that contender running again.
const WAKEUP_PENDING: usize = 1;

impl ObjectMonitor {
    #[inline]
    fn try_lock(&self, token: usize) -> bool {
        self.owner.cas(0, token).is_ok()
    }

    /// Acquire the monitor, blocking until it is available.
    pub(crate) fn enter(&self, thread: &JavaThread, config: &SyncConfig) {
        let token = thread.token().raw();
        let owner = match self.owner.cas(0, token) {
            Ok(_) => return,
            Err(owner) => owner,
        };

        if owner == token {
            self.recursions.fetch_add(1, Ordering::Relaxed);
            return;
        }

        // Inflated out from under our own stack lock. That lock counts as the first acquisition.
        if thread.owns_record(owner) {
            self.recursions.store(1, Ordering::Relaxed);
            self.owner.store(token, Ordering::Relaxed);
            return;
        }

        for _ in 0..config.spin_limit {
            if self.owner.read() == 0 && self.try_lock(token) {
                return;
            }
            spin_loop();
        }

        self.enter_contended(token, config);
    }

    fn enter_contended(&self, token: usize, config: &SyncConfig) {
        trace!("Thread {:#x} queueing on monitor {:p}", token, self);
        self.cxq.fetch_add(1, Ordering::SeqCst);

        while !self.try_lock(token) {
            safepoint::blocking(|| {
                let mut guard = self.park_lock.lock();
                if self.owner.load(Ordering::SeqCst) == 0 {
                    return;
                }

                self.entry_list.fetch_add(1, Ordering::SeqCst);
                self.cxq.fetch_sub(1, Ordering::SeqCst);
                let _ = self.park_cv.wait_for(&mut guard, config.park_timeout());
                self.cxq.fetch_add(1, Ordering::SeqCst);
                self.entry_list.fetch_sub(1, Ordering::SeqCst);
            });

            // Consume a pending wake-up so the next exit wakes someone else if we lose the race
            let _ = self.succ.cas(WAKEUP_PENDING, 0);
        }

        self.cxq.fetch_sub(1, Ordering::SeqCst);
        let _ = self.succ.cas(WAKEUP_PENDING, 0);
    }

    /// Release one level of the monitor.
    pub(crate) fn exit(&self, thread: &JavaThread) -> SyncResult<()> {
        let token = thread.token().raw();
        let owner = self.owner.read();

        if owner != token {
            if owner != 0 && thread.owns_record(owner) {
                // Stack lock taken before inflation and released through the monitor
                self.owner.store(token, Ordering::Relaxed);
                self.recursions.store(0, Ordering::Relaxed);
            } else {
                warn!("{:?} released monitor {:p} owned by {:#x}", thread, self, owner);
                return Err(SyncError::IllegalMonitorState {
                    object: self.object() as usize,
                });
            }
        }

        let recursions = self.recursions.load(Ordering::Relaxed);
        if recursions > 0 {
            self.recursions.store(recursions - 1, Ordering::Relaxed);
            return Ok(());
        }

        if !self.has_waiters() {
            self.owner.release_store(0);
            return Ok(());
        }

        self.succ.store(WAKEUP_PENDING, Ordering::Relaxed);
        self.owner.release_store(0);

        let _guard = self.park_lock.lock();
        self.park_cv.notify_one();
        Ok(())
    }

    pub(crate) fn is_held_by(&self, thread: &JavaThread) -> bool {
        let owner = self.owner.read();
        owner == thread.token().raw() || (owner != 0 && thread.owns_record(owner))
    }
}
