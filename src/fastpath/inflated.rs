use super::{LockOutcome, UnlockOutcome};
use crate::atomic::{storeload_fence, WordCell};
use crate::markword::LockState;
use crate::monitor::ObjectMonitor;
use crate::object::Object;
use crate::thread::JavaThread;
use std::sync::atomic::Ordering;

fn installed_monitor(obj: &Object) -> Option<&ObjectMonitor> {
    match obj.lock_state() {
        // SAFETY: installed monitors are never freed
        LockState::Inflated(monitor) => Some(unsafe { &*monitor }),
        _ => None,
    }
}

/// Claim a free inflated monitor. Recursive entry and stack-owner hand-off are left to the slow path.
pub fn try_inflated_lock(obj: &Object, thread: &JavaThread) -> LockOutcome {
    let monitor = match installed_monitor(obj) {
        Some(x) => x,
        None => return LockOutcome::Contended,
    };

    match monitor.owner.cas(0, thread.token().raw()) {
        Ok(_) => {
            debug_assert_eq!(monitor.recursions(), 0);
            LockOutcome::Owned
        }
        Err(_) => LockOutcome::Contended,
    }
}

/// Release one level of an inflated monitor owned by `thread`.
///
/// When contenders are queued the owner is dropped and, after a full fence, the successor marker is
/// checked. If nobody is on the way to take the lock the monitor is reclaimed and `Contended` tells
/// the caller to finish the release in the slow path, which wakes a successor.
pub fn inflated_unlock(obj: &Object, thread: &JavaThread) -> UnlockOutcome {
    let monitor = match installed_monitor(obj) {
        Some(x) => x,
        None => return UnlockOutcome::Contended,
    };

    let token = thread.token().raw();
    if monitor.owner.read() != token {
        return UnlockOutcome::Contended;
    }

    let recursions = monitor.recursions.load(Ordering::Relaxed);
    if recursions > 0 {
        monitor.recursions.store(recursions - 1, Ordering::Relaxed);
        return UnlockOutcome::Released;
    }

    if monitor.cxq.read() == 0 && monitor.entry_list.read() == 0 {
        monitor.owner.release_store(0);
        return UnlockOutcome::Released;
    }

    monitor.owner.release_store(0);
    storeload_fence();
    if monitor.succ.read() != 0 {
        return UnlockOutcome::Released;
    }

    match monitor.owner.cas(0, token) {
        // Another thread took it and is now responsible for waking the rest
        Err(_) => UnlockOutcome::Released,
        Ok(_) => UnlockOutcome::Contended,
    }
}

#[cfg(test)]
mod test {
    use super::{inflated_unlock, try_inflated_lock};
    use crate::fastpath::{LockOutcome, UnlockOutcome};
    use crate::markword::MarkWord;
    use crate::monitor::ObjectMonitor;
    use crate::object::{Klass, Object};
    use crate::thread::JavaThread;
    use std::sync::atomic::Ordering;

    fn inflated(monitor: &ObjectMonitor) -> Object {
        Object::with_mark(&Klass::new("Inflated", false), MarkWord::encode_monitor(monitor))
    }

    #[test]
    pub fn free_monitor_is_claimed() {
        let thread = JavaThread::attach("claim").unwrap();
        let monitor = ObjectMonitor::new();
        let obj = inflated(&monitor);

        assert_eq!(try_inflated_lock(&obj, &thread), LockOutcome::Owned);
        assert!(monitor.is_owned_by(thread.token()));

        // Recursion is resolved by the slow path
        assert_eq!(try_inflated_lock(&obj, &thread), LockOutcome::Contended);
        assert_eq!(monitor.recursions(), 0);

        assert_eq!(inflated_unlock(&obj, &thread), UnlockOutcome::Released);
        assert_eq!(monitor.owner(), 0);
    }

    #[test]
    pub fn recursions_unwind_first() {
        let thread = JavaThread::attach("recursions").unwrap();
        let monitor = ObjectMonitor::new();
        let obj = inflated(&monitor);

        assert_eq!(try_inflated_lock(&obj, &thread), LockOutcome::Owned);
        monitor.recursions.store(2, Ordering::Relaxed);

        assert_eq!(inflated_unlock(&obj, &thread), UnlockOutcome::Released);
        assert_eq!(inflated_unlock(&obj, &thread), UnlockOutcome::Released);
        assert!(monitor.is_owned_by(thread.token()));
        assert_eq!(inflated_unlock(&obj, &thread), UnlockOutcome::Released);
        assert_eq!(monitor.owner(), 0);
    }

    #[test]
    pub fn queued_contender_without_successor() {
        let thread = JavaThread::attach("queued").unwrap();
        let monitor = ObjectMonitor::new();
        let obj = inflated(&monitor);

        assert_eq!(try_inflated_lock(&obj, &thread), LockOutcome::Owned);
        monitor.entry_list.store(1, Ordering::Relaxed);

        // Reclaimed so the slow path can wake the parked thread
        assert_eq!(inflated_unlock(&obj, &thread), UnlockOutcome::Contended);
        assert!(monitor.is_owned_by(thread.token()));

        monitor.succ.store(1, Ordering::Relaxed);
        assert_eq!(inflated_unlock(&obj, &thread), UnlockOutcome::Released);
        assert_eq!(monitor.owner(), 0);
    }

    #[test]
    pub fn foreign_owner_is_not_released() {
        let thread = JavaThread::attach("foreign").unwrap();
        let monitor = ObjectMonitor::new();
        monitor.owner.store(0x7ff0_0000_0400, Ordering::Relaxed);
        let obj = inflated(&monitor);

        assert_eq!(try_inflated_lock(&obj, &thread), LockOutcome::Contended);
        assert_eq!(inflated_unlock(&obj, &thread), UnlockOutcome::Contended);
        assert_eq!(monitor.owner(), 0x7ff0_0000_0400);

        let plain = Object::new(&Klass::new("Plain", false));
        assert_eq!(try_inflated_lock(&plain, &thread), LockOutcome::Contended);
    }
}
