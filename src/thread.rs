//! Thread control blocks.
//!
//! A [`JavaThread`] is the identity a thread locks with. Its address is the [`ThreadToken`] stored in
//! biased headers and monitor owner fields, so blocks are pinned behind an `Arc` and aligned to 1024
//! bytes to keep the token clear of the epoch and age bits.

use crate::error::{SyncError, SyncResult};
use crate::lock::BasicObjectLock;
use crate::runtime::safepoint;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::fmt::{self, Debug, Formatter};
use std::hint::black_box;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Opaque identity of an attached thread.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct ThreadToken(NonZeroUsize);

impl ThreadToken {
    #[inline]
    pub fn from_raw(value: usize) -> Option<Self> {
        NonZeroUsize::new(value).map(ThreadToken)
    }

    #[inline]
    pub fn raw(self) -> usize {
        self.0.get()
    }
}

lazy_static! {
    static ref THREADS: Mutex<Vec<Arc<JavaThread>>> = Mutex::new(Vec::new());
}

thread_local! {
    static CURRENT: RefCell<Option<Attachment>> = RefCell::new(None);
}

/// Keeps the current thread registered until it detaches or exits.
struct Attachment(Arc<JavaThread>);

impl Drop for Attachment {
    fn drop(&mut self) {
        let thread = &self.0;
        let held = thread.held_monitor_count();
        if held != 0 {
            warn!("Thread {:?} detached while holding {} monitors", thread.name, held);
        }

        thread.alive.store(false, Ordering::Release);
        THREADS.lock().retain(|other| !Arc::ptr_eq(other, thread));
        safepoint::leave();
        info!("Detached thread {:?}", thread.name);
    }
}

#[repr(C, align(1024))]
pub struct JavaThread {
    name: String,
    /// Addresses of active monitor slots, oldest first.
    monitors: Mutex<Vec<usize>>,
    alive: AtomicBool,
}

impl JavaThread {
    /// Register the calling thread with the runtime. Every thread must attach before it locks.
    pub fn attach<S: Into<String>>(name: S) -> SyncResult<Arc<JavaThread>> {
        CURRENT.with(|current| {
            let mut current = current.borrow_mut();
            if current.is_some() {
                return Err(SyncError::ThreadAlreadyAttached);
            }

            safepoint::join();
            let thread = Arc::new(JavaThread {
                name: name.into(),
                monitors: Mutex::new(Vec::new()),
                alive: AtomicBool::new(true),
            });

            THREADS.lock().push(thread.clone());
            info!("Attached thread {:?} as {:#x}", thread.name, thread.token().raw());
            *current = Some(Attachment(thread.clone()));
            Ok(thread)
        })
    }

    /// Unregister the calling thread. Also happens implicitly when an attached thread exits.
    pub fn detach() -> SyncResult<()> {
        let attachment = CURRENT.with(|current| current.borrow_mut().take());
        match attachment {
            Some(attachment) => {
                drop(attachment);
                Ok(())
            }
            None => Err(SyncError::NotAttached),
        }
    }

    pub fn current() -> Option<Arc<JavaThread>> {
        CURRENT.with(|current| current.borrow().as_ref().map(|x| x.0.clone()))
    }

    pub fn require_current() -> SyncResult<Arc<JavaThread>> {
        JavaThread::current().ok_or(SyncError::NotAttached)
    }

    /// Fails unless `self` is the control block of the calling thread.
    pub fn ensure_current(&self) -> SyncResult<()> {
        CURRENT.with(|current| match current.borrow().as_ref() {
            Some(attachment) if attachment.0.token() == self.token() => Ok(()),
            Some(_) => Err(SyncError::ForeignThread),
            None => Err(SyncError::NotAttached),
        })
    }

    #[inline]
    pub fn token(&self) -> ThreadToken {
        // SAFETY: references are never null
        ThreadToken(unsafe { NonZeroUsize::new_unchecked(self as *const JavaThread as usize) })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn held_monitor_count(&self) -> usize {
        self.monitors.lock().len()
    }

    /// Exact test for whether `addr` is the lock record of one of this thread's active monitor slots.
    pub fn owns_record(&self, addr: usize) -> bool {
        let offset = BasicObjectLock::lock_offset();
        self.monitors.lock().iter().any(|&slot| slot + offset == addr)
    }

    pub(crate) fn push_monitor(&self, slot: &BasicObjectLock) {
        self.monitors.lock().push(slot as *const BasicObjectLock as usize);
    }

    pub(crate) fn pop_monitor(&self, slot: &BasicObjectLock) {
        let addr = slot as *const BasicObjectLock as usize;
        let mut monitors = self.monitors.lock();

        match monitors.iter().rposition(|&x| x == addr) {
            Some(idx) => {
                monitors.remove(idx);
            }
            None => warn!("Released unknown monitor slot {:#x} on {:?}", addr, self.name),
        }
    }

    /// Snapshot of the active monitor slots, oldest first.
    pub(crate) fn monitor_slots(&self) -> Vec<usize> {
        self.monitors.lock().clone()
    }

    pub(crate) fn find(token: ThreadToken) -> Option<Arc<JavaThread>> {
        THREADS.lock().iter().find(|x| x.token() == token).cloned()
    }

    pub(crate) fn all() -> Vec<Arc<JavaThread>> {
        THREADS.lock().clone()
    }
}

impl Debug for JavaThread {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "JavaThread({:?}, {:#x})", self.name, self.token().raw())
    }
}

/// Approximate stack pointer of the caller: the address of a local in the current frame.
#[inline(always)]
pub fn current_stack_pointer() -> usize {
    let marker = 0u8;
    black_box(&marker) as *const u8 as usize
}
