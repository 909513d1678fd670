//! The single-word primitive every lock transition is written against.
//!
//! Object headers and monitor owner fields are only ever mutated through [`WordCell`]. A platform
//! backend therefore only has to supply a read, a compare-and-swap and a releasing store.

use std::sync::atomic::{fence, AtomicUsize, Ordering};

pub trait WordCell {
    /// Single-word read with acquire ordering.
    fn read(&self) -> usize;

    /// Compare-and-swap with acquire and release ordering. On failure the value that was actually
    /// observed is returned so the caller can classify it without a second read.
    fn cas(&self, expected: usize, new: usize) -> Result<usize, usize>;

    /// Store with release ordering. Used for every write that gives up ownership.
    fn release_store(&self, value: usize);
}

impl WordCell for AtomicUsize {
    #[inline]
    fn read(&self) -> usize {
        self.load(Ordering::Acquire)
    }

    #[inline]
    fn cas(&self, expected: usize, new: usize) -> Result<usize, usize> {
        self.compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
    }

    #[inline]
    fn release_store(&self, value: usize) {
        self.store(value, Ordering::Release)
    }
}

/// Full two-way fence. Orders a releasing store before a subsequent load of a different word.
#[inline]
pub fn storeload_fence() {
    fence(Ordering::SeqCst);
}

#[cfg(test)]
mod test {
    use super::WordCell;
    use std::sync::atomic::AtomicUsize;

    #[test]
    pub fn cas_reports_witness() {
        let cell = AtomicUsize::new(5);
        assert_eq!(cell.cas(5, 9), Ok(5));
        assert_eq!(cell.cas(5, 1), Err(9));
        assert_eq!(cell.read(), 9);
    }

    #[test]
    pub fn release_store_is_visible() {
        let cell = AtomicUsize::new(0);
        cell.release_store(0x40);
        assert_eq!(cell.read(), 0x40);
    }
}
