//! Heavyweight monitors installed in inflated headers.
//!
//! The fast path only touches `owner`, `recursions`, `cxq`, `entry_list` and `succ`. Blocking entry
//! and the hand-off to parked threads live in [`crate::runtime::monitor`].

use crate::atomic::WordCell;
use crate::markword::MarkWord;
use crate::object::Object;
use crate::thread::ThreadToken;
use parking_lot::{Condvar, Mutex};
use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};

#[repr(C)]
pub struct ObjectMonitor {
    /// Neutral header displaced by inflation.
    pub(crate) header: AtomicUsize,
    pub(crate) object: AtomicUsize,
    /// Owning thread token, null when free. Directly after inflating a stack lock this holds the
    /// address of the stack owner's lock record until that thread next touches the monitor.
    pub(crate) owner: AtomicUsize,
    /// Additional acquisitions by the owner beyond the first.
    pub(crate) recursions: AtomicUsize,
    /// Contending threads that are not parked.
    pub(crate) cxq: AtomicUsize,
    /// Contending threads that are parked.
    pub(crate) entry_list: AtomicUsize,
    /// Non-zero while a woken or spinning successor is expected to take the lock.
    pub(crate) succ: AtomicUsize,
    pub(crate) park_lock: Mutex<()>,
    pub(crate) park_cv: Condvar,
}

impl ObjectMonitor {
    pub fn new() -> Self {
        ObjectMonitor {
            header: AtomicUsize::new(0),
            object: AtomicUsize::new(0),
            owner: AtomicUsize::new(0),
            recursions: AtomicUsize::new(0),
            cxq: AtomicUsize::new(0),
            entry_list: AtomicUsize::new(0),
            succ: AtomicUsize::new(0),
            park_lock: Mutex::new(()),
            park_cv: Condvar::new(),
        }
    }

    pub fn header(&self) -> MarkWord {
        MarkWord::from_raw(self.header.load(Ordering::Relaxed))
    }

    pub fn object(&self) -> *const Object {
        self.object.load(Ordering::Relaxed) as *const Object
    }

    #[inline]
    pub fn owner(&self) -> usize {
        self.owner.read()
    }

    pub fn is_owned_by(&self, thread: ThreadToken) -> bool {
        self.owner() == thread.raw()
    }

    pub fn recursions(&self) -> usize {
        self.recursions.load(Ordering::Relaxed)
    }

    pub fn has_waiters(&self) -> bool {
        self.cxq.read() != 0 || self.entry_list.read() != 0
    }

    pub fn contenders(&self) -> usize {
        self.cxq.read() + self.entry_list.read()
    }

    /// Prepare a free monitor for installation in `obj`'s header. The monitor is not yet published so
    /// relaxed stores suffice; the header store that publishes it releases them.
    pub(crate) fn prepare(&self, obj: &Object, header: MarkWord, owner: usize) {
        debug_assert!(header.is_neutral(), "displaced {:?} is not neutral", header);
        self.header.store(header.raw(), Ordering::Relaxed);
        self.object.store(obj.address(), Ordering::Relaxed);
        self.owner.store(owner, Ordering::Relaxed);
        self.recursions.store(0, Ordering::Relaxed);
        self.succ.store(0, Ordering::Relaxed);
    }
}

impl Default for ObjectMonitor {
    fn default() -> Self {
        ObjectMonitor::new()
    }
}

impl Debug for ObjectMonitor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectMonitor")
            .field("header", &self.header())
            .field("owner", &format_args!("{:#x}", self.owner()))
            .field("recursions", &self.recursions())
            .field("cxq", &self.cxq.load(Ordering::Relaxed))
            .field("entry_list", &self.entry_list.load(Ordering::Relaxed))
            .finish()
    }
}
