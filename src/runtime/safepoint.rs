//! Stop-the-world coordination.
//!
//! Every attached thread holds a shared guard on a global lock while it runs. A safepoint operation
//! takes the lock exclusively, so it only runs once every attached thread is either parked in
//! [`blocking`] or has yielded its guard at a [`poll`]. Lock entry and exit poll.

use parking_lot::{RwLock, RwLockReadGuard};
use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};

lazy_static! {
    static ref SAFEPOINT: RwLock<()> = RwLock::new(());
}

static PENDING: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static GUARD: RefCell<Option<RwLockReadGuard<'static, ()>>> = RefCell::new(None);
}

pub(crate) fn join() {
    GUARD.with(|guard| {
        let mut guard = guard.borrow_mut();
        if guard.is_none() {
            *guard = Some(SAFEPOINT.read());
        }
    });
}

pub(crate) fn leave() {
    // Thread locals may already be gone when a thread detaches on exit
    let _ = GUARD.try_with(|guard| guard.borrow_mut().take());
}

/// Yield to a pending safepoint operation, if any.
#[inline]
pub fn poll() {
    if PENDING.load(Ordering::Acquire) == 0 {
        return;
    }

    GUARD.with(|guard| {
        if let Some(guard) = guard.borrow_mut().as_mut() {
            trace!("Yielding to safepoint");
            RwLockReadGuard::bump(guard);
        }
    });
}

/// Run `f` without blocking safepoints. Attached threads must wrap anything that waits on another
/// thread in this. `f` must not touch object headers.
pub fn blocking<R, F: FnOnce() -> R>(f: F) -> R {
    let held = GUARD.with(|guard| guard.borrow_mut().take());
    let rejoin = held.is_some();
    drop(held);

    let result = f();

    if rejoin {
        join();
    }
    result
}

/// Run `op` while every other attached thread is stopped.
pub fn run_at_safepoint<R, F: FnOnce() -> R>(op: F) -> R {
    PENDING.fetch_add(1, Ordering::SeqCst);
    blocking(|| {
        let result = {
            let _world = SAFEPOINT.write();
            debug!("Reached safepoint");
            op()
        };
        PENDING.fetch_sub(1, Ordering::SeqCst);
        result
    })
}

pub fn is_at_safepoint() -> bool {
    SAFEPOINT.try_read().is_none()
}
