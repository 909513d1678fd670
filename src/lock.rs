//! Lock records owned by the locking frame.
//!
//! A [`BasicLock`] lives on the stack of the frame that entered the monitor for as long as the
//! synchronized region runs. Its only field is the displaced header, which also records how the lock
//! was taken so the release path never has to trust the object header.

use crate::markword::{MarkWord, BIASED_LOCK_PATTERN, MARKED_VALUE};
use crate::object::Object;
use std::sync::atomic::{AtomicUsize, Ordering};

/// How a lock record was acquired, read back from its displaced header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RecordKind {
    /// Held through the object's bias. Releasing it is a no-op.
    Biased,
    /// Nested acquisition of a lock this thread already holds. Releasing it is a no-op.
    Recursive,
    /// Held through an inflated monitor.
    Inflated,
    /// Stack lock. The record holds the header to restore on release.
    Displaced(MarkWord),
}

#[repr(C)]
#[derive(Debug)]
pub struct BasicLock {
    displaced_header: AtomicUsize,
}

impl BasicLock {
    pub const RECURSIVE: MarkWord = MarkWord::from_raw(0);
    pub const UNUSED_MARK: MarkWord = MarkWord::from_raw(MARKED_VALUE);
    pub const BIASED: MarkWord = MarkWord::from_raw(BIASED_LOCK_PATTERN);

    pub const fn new() -> Self {
        BasicLock {
            displaced_header: AtomicUsize::new(0),
        }
    }

    /// Byte offset of the displaced header. Generated code addresses the field directly.
    pub fn displaced_header_offset() -> usize {
        memoffset::offset_of!(BasicLock, displaced_header)
    }

    #[inline]
    pub fn displaced_header(&self) -> MarkWord {
        MarkWord::from_raw(self.displaced_header.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set_displaced_header(&self, mark: MarkWord) {
        self.displaced_header.store(mark.raw(), Ordering::Relaxed);
    }

    pub fn kind(&self) -> RecordKind {
        match self.displaced_header() {
            Self::RECURSIVE => RecordKind::Recursive,
            Self::BIASED => RecordKind::Biased,
            Self::UNUSED_MARK => RecordKind::Inflated,
            header => {
                debug_assert!(header.is_neutral(), "displaced {:?} is not neutral", header);
                RecordKind::Displaced(header)
            }
        }
    }
}

impl Default for BasicLock {
    fn default() -> Self {
        BasicLock::new()
    }
}

/// A monitor slot: the lock record together with the object it locks.
#[repr(C)]
#[derive(Debug, Default)]
pub struct BasicObjectLock {
    lock: BasicLock,
    obj: AtomicUsize,
}

impl BasicObjectLock {
    pub const fn new() -> Self {
        BasicObjectLock {
            lock: BasicLock::new(),
            obj: AtomicUsize::new(0),
        }
    }

    pub fn lock_offset() -> usize {
        memoffset::offset_of!(BasicObjectLock, lock)
    }

    pub fn obj_offset() -> usize {
        memoffset::offset_of!(BasicObjectLock, obj)
    }

    #[inline]
    pub fn lock(&self) -> &BasicLock {
        &self.lock
    }

    pub fn object(&self) -> *const Object {
        self.obj.load(Ordering::Relaxed) as *const Object
    }

    pub(crate) fn set_object(&self, obj: &Object) {
        self.obj.store(obj as *const Object as usize, Ordering::Relaxed);
    }
}
