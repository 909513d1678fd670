//! Heap object headers and the class data the lock protocol reads from them.

use crate::atomic::WordCell;
use crate::markword::{LockState, MarkWord};
use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub struct Klass {
    name: String,
    /// Header template for new instances. Carries the bias pattern and current epoch while instances
    /// of this class may be biased.
    prototype_header: AtomicUsize,
    revocations: AtomicUsize,
}

impl Klass {
    pub fn new<S: Into<String>>(name: S, biasable: bool) -> Arc<Klass> {
        let prototype = match biasable {
            true => MarkWord::biased_prototype(0),
            false => MarkWord::prototype(),
        };

        Arc::new(Klass {
            name: name.into(),
            prototype_header: AtomicUsize::new(prototype.raw()),
            revocations: AtomicUsize::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Callers making a locking decision read this once and work from that copy so one decision sees
    /// one epoch.
    #[inline]
    pub fn prototype_header(&self) -> MarkWord {
        MarkWord::from_raw(self.prototype_header.read())
    }

    pub fn is_biasable(&self) -> bool {
        self.prototype_header().has_bias_pattern()
    }

    pub fn epoch(&self) -> u8 {
        self.prototype_header().bias_epoch()
    }

    /// Only written at a safepoint.
    pub(crate) fn set_prototype_header(&self, mark: MarkWord) {
        self.prototype_header.release_store(mark.raw());
    }

    pub fn revocation_count(&self) -> usize {
        self.revocations.load(Ordering::Relaxed)
    }

    pub(crate) fn record_revocation(&self) -> usize {
        self.revocations.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Debug for Klass {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Klass")
            .field("name", &self.name)
            .field("prototype_header", &self.prototype_header())
            .finish()
    }
}

pub struct Object {
    mark: AtomicUsize,
    klass: Arc<Klass>,
}

impl Object {
    /// Allocate an instance. Instances of a biasable class start out anonymously biased.
    pub fn new(klass: &Arc<Klass>) -> Self {
        Object::with_mark(klass, klass.prototype_header())
    }

    pub fn with_mark(klass: &Arc<Klass>, mark: MarkWord) -> Self {
        Object {
            mark: AtomicUsize::new(mark.raw()),
            klass: klass.clone(),
        }
    }

    pub fn klass(&self) -> &Arc<Klass> {
        &self.klass
    }

    #[inline]
    pub fn mark(&self) -> MarkWord {
        MarkWord::from_raw(self.mark.read())
    }

    /// Header compare-and-swap. On failure the header that was actually found is returned.
    #[inline]
    pub fn cas_mark(&self, expected: MarkWord, new: MarkWord) -> Result<MarkWord, MarkWord> {
        self.mark
            .cas(expected.raw(), new.raw())
            .map(MarkWord::from_raw)
            .map_err(MarkWord::from_raw)
    }

    #[inline]
    pub(crate) fn release_mark(&self, mark: MarkWord) {
        self.mark.release_store(mark.raw());
    }

    pub fn lock_state(&self) -> LockState {
        self.mark().decode()
    }

    pub fn address(&self) -> usize {
        self as *const Object as usize
    }
}

impl Debug for Object {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:#x} {:?}", self.klass.name, self.address(), self.mark())
    }
}
