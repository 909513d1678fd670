//! Lock state held in an object's mark word.
//!
//! The bit layout only matters at this boundary. Everything past [`MarkWord::decode`] works on the
//! tagged [`LockState`] instead.
//!
//! ```text
//!    [hash:31 | unused:1 | age:4 | 0 | 01]    unlocked    regular object header
//!    [thread:54 | epoch:2 | age:4 | 1 | 01]   biased      thread == 0 means anonymously biased
//!    [ptr                             | 00]   locked      ptr points to a BasicLock on the owner's stack
//!    [ptr                             | 10]   monitor     inflated lock, ptr points to an ObjectMonitor
//!    [                                | 11]   marked      used by the collector, never seen while locking
//! ```
//!
//! Lock records and monitors are word aligned, so their two lowest bits are free for the tag. Thread
//! control blocks are aligned to 1024 bytes so a thread pointer also leaves the epoch and age alone.

use crate::lock::BasicLock;
use crate::monitor::ObjectMonitor;
use crate::thread::ThreadToken;
use std::fmt::{self, Debug, Formatter};

bitflags! {
    pub struct MarkSections: usize {
        // Normal Object
        const HASH        = 0x0000_007F_FFFF_FF00;
        const AGE         = 0x0000_0000_0000_0078;
        const BIASED_LOCK = 0x0000_0000_0000_0004;
        const LOCK        = 0x0000_0000_0000_0003;

        // Biased Object
        const THREAD      = 0xFFFF_FFFF_FFFF_FC00;
        const EPOCH       = 0x0000_0000_0000_0300;

        const BIAS_PATTERN = Self::BIASED_LOCK.bits | Self::LOCK.bits;
    }
}

pub const LOCKED_VALUE: usize = 0;
pub const UNLOCKED_VALUE: usize = 1;
pub const MONITOR_VALUE: usize = 2;
pub const MARKED_VALUE: usize = 3;
pub const BIASED_LOCK_PATTERN: usize = 5;

const AGE_SHIFT: usize = 3;
const HASH_SHIFT: usize = 8;
const EPOCH_SHIFT: usize = 8;

/// Epochs wrap after this many bulk rebias operations.
pub const EPOCH_COUNT: u8 = 4;
pub const MAX_AGE: u8 = 15;

/// The four encodings the protocol distinguishes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LockKind {
    Neutral,
    Biased,
    StackLocked,
    Inflated,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct MarkWord(usize);

impl MarkWord {
    /// Transient header installed while a stack lock is being converted into a monitor.
    pub const INFLATING: MarkWord = MarkWord(0);

    #[inline]
    pub const fn from_raw(value: usize) -> Self {
        MarkWord(value)
    }

    #[inline]
    pub const fn raw(self) -> usize {
        self.0
    }

    /// Unlocked header with no hash and age 0.
    pub const fn prototype() -> Self {
        MarkWord(UNLOCKED_VALUE)
    }

    /// Anonymously biased header in the given epoch.
    pub const fn biased_prototype(epoch: u8) -> Self {
        MarkWord(BIASED_LOCK_PATTERN | (((epoch % EPOCH_COUNT) as usize) << EPOCH_SHIFT))
    }

    pub fn encode_stack_lock(lock: *const BasicLock) -> Self {
        let addr = lock as usize;
        debug_assert_eq!(addr & MarkSections::LOCK.bits(), 0, "misaligned lock record");
        MarkWord(addr | LOCKED_VALUE)
    }

    pub fn encode_monitor(monitor: *const ObjectMonitor) -> Self {
        let addr = monitor as usize;
        debug_assert_eq!(addr & MarkSections::LOCK.bits(), 0, "misaligned monitor");
        MarkWord(addr | MONITOR_VALUE)
    }

    pub fn encode_biased(owner: Option<ThreadToken>, epoch: u8, age: u8) -> Self {
        let thread = owner.map_or(0, ThreadToken::raw);
        debug_assert_eq!(thread & !MarkSections::THREAD.bits(), 0, "misaligned thread token");

        MarkWord(
            thread
                | (((epoch % EPOCH_COUNT) as usize) << EPOCH_SHIFT)
                | (((age & MAX_AGE) as usize) << AGE_SHIFT)
                | BIASED_LOCK_PATTERN,
        )
    }

    /// Classify the header by its tag bits alone. The GC-only marked pattern shares the monitor bit and
    /// classifies as inflated.
    #[inline]
    pub fn kind(self) -> LockKind {
        if self.has_bias_pattern() {
            return LockKind::Biased;
        }

        match self.0 & MarkSections::LOCK.bits() {
            UNLOCKED_VALUE => LockKind::Neutral,
            LOCKED_VALUE => LockKind::StackLocked,
            _ => LockKind::Inflated,
        }
    }

    #[inline]
    pub fn has_bias_pattern(self) -> bool {
        self.0 & MarkSections::BIAS_PATTERN.bits() == BIASED_LOCK_PATTERN
    }

    #[inline]
    pub fn is_neutral(self) -> bool {
        self.0 & MarkSections::BIAS_PATTERN.bits() == UNLOCKED_VALUE
    }

    #[inline]
    pub fn is_stack_locked(self) -> bool {
        self.0 & MarkSections::LOCK.bits() == LOCKED_VALUE
    }

    #[inline]
    pub fn is_inflating(self) -> bool {
        self == Self::INFLATING
    }

    #[inline]
    pub fn has_monitor(self) -> bool {
        self.0 & MONITOR_VALUE != 0
    }

    pub fn biased_owner(self) -> Option<ThreadToken> {
        debug_assert!(self.has_bias_pattern());
        ThreadToken::from_raw(self.0 & MarkSections::THREAD.bits())
    }

    pub fn bias_epoch(self) -> u8 {
        ((self.0 & MarkSections::EPOCH.bits()) >> EPOCH_SHIFT) as u8
    }

    pub fn age(self) -> u8 {
        ((self.0 & MarkSections::AGE.bits()) >> AGE_SHIFT) as u8
    }

    pub fn hash(self) -> u32 {
        ((self.0 & MarkSections::HASH.bits()) >> HASH_SHIFT) as u32
    }

    pub fn locker(self) -> *const BasicLock {
        debug_assert!(self.is_stack_locked());
        self.0 as *const BasicLock
    }

    pub fn monitor(self) -> *const ObjectMonitor {
        debug_assert!(self.has_monitor());
        (self.0 ^ MONITOR_VALUE) as *const ObjectMonitor
    }

    pub fn with_age(self, age: u8) -> Self {
        MarkWord((self.0 & !MarkSections::AGE.bits()) | (((age & MAX_AGE) as usize) << AGE_SHIFT))
    }

    pub fn with_hash(self, hash: u32) -> Self {
        debug_assert!(self.is_neutral());
        let hash = ((hash as usize) << HASH_SHIFT) & MarkSections::HASH.bits();
        MarkWord((self.0 & !MarkSections::HASH.bits()) | hash)
    }

    pub fn with_bias_epoch(self, epoch: u8) -> Self {
        debug_assert!(self.has_bias_pattern());
        let epoch = ((epoch % EPOCH_COUNT) as usize) << EPOCH_SHIFT;
        MarkWord((self.0 & !MarkSections::EPOCH.bits()) | epoch)
    }

    pub fn with_biased_owner(self, owner: Option<ThreadToken>) -> Self {
        debug_assert!(self.has_bias_pattern());
        let thread = owner.map_or(0, ThreadToken::raw);
        MarkWord((self.0 & !MarkSections::THREAD.bits()) | thread)
    }

    /// The unlocked header a revoked bias falls back to. Only the age survives.
    pub fn unbiased(self) -> Self {
        MarkWord::prototype().with_age(self.age())
    }

    pub fn decode(self) -> LockState {
        debug_assert_ne!(
            self.0 & MarkSections::LOCK.bits(),
            MARKED_VALUE,
            "marked header observed outside of a collection"
        );

        match self.kind() {
            LockKind::Neutral => LockState::Neutral {
                hash: self.hash(),
                age: self.age(),
            },
            LockKind::Biased => LockState::Biased {
                owner: self.biased_owner(),
                epoch: self.bias_epoch(),
                age: self.age(),
            },
            LockKind::StackLocked => LockState::StackLocked(self.locker()),
            LockKind::Inflated => LockState::Inflated(self.monitor()),
        }
    }
}

impl Debug for MarkWord {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "MarkWord({:?}, {:#x})", self.kind(), self.0)
    }
}

/// A decoded mark word.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LockState {
    Neutral {
        hash: u32,
        age: u8,
    },
    Biased {
        owner: Option<ThreadToken>,
        epoch: u8,
        age: u8,
    },
    /// A null record means the header is in the middle of being inflated.
    StackLocked(*const BasicLock),
    Inflated(*const ObjectMonitor),
}

impl LockState {
    pub fn kind(&self) -> LockKind {
        match self {
            LockState::Neutral { .. } => LockKind::Neutral,
            LockState::Biased { .. } => LockKind::Biased,
            LockState::StackLocked(_) => LockKind::StackLocked,
            LockState::Inflated(_) => LockKind::Inflated,
        }
    }

    pub fn encode(self) -> MarkWord {
        match self {
            LockState::Neutral { hash, age } => MarkWord::prototype().with_age(age).with_hash(hash),
            LockState::Biased { owner, epoch, age } => MarkWord::encode_biased(owner, epoch, age),
            LockState::StackLocked(lock) => MarkWord::encode_stack_lock(lock),
            LockState::Inflated(monitor) => MarkWord::encode_monitor(monitor),
        }
    }
}

impl From<MarkWord> for LockState {
    fn from(mark: MarkWord) -> Self {
        mark.decode()
    }
}

impl From<LockState> for MarkWord {
    fn from(state: LockState) -> Self {
        state.encode()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lock::BasicLock;
    use crate::monitor::ObjectMonitor;

    fn token(raw: usize) -> ThreadToken {
        ThreadToken::from_raw(raw).unwrap()
    }

    #[test]
    pub fn classify_prototypes() {
        assert_eq!(MarkWord::prototype().kind(), LockKind::Neutral);
        assert_eq!(MarkWord::biased_prototype(2).kind(), LockKind::Biased);
        assert_eq!(MarkWord::biased_prototype(2).biased_owner(), None);
        assert_eq!(MarkWord::biased_prototype(2).bias_epoch(), 2);
        assert_eq!(MarkWord::biased_prototype(6).bias_epoch(), 2);
        assert_eq!(MarkWord::INFLATING.kind(), LockKind::StackLocked);
        assert!(MarkWord::INFLATING.is_inflating());
    }

    #[test]
    pub fn stack_and_monitor_pointers() {
        let lock = BasicLock::new();
        let monitor = ObjectMonitor::new();

        let stack = MarkWord::encode_stack_lock(&lock);
        assert_eq!(stack.kind(), LockKind::StackLocked);
        assert_eq!(stack.locker(), &lock as *const BasicLock);
        assert!(!stack.has_monitor());

        let inflated = MarkWord::encode_monitor(&monitor);
        assert_eq!(inflated.kind(), LockKind::Inflated);
        assert!(inflated.has_monitor());
        assert_eq!(inflated.monitor(), &monitor as *const ObjectMonitor);
    }

    #[test]
    pub fn biased_fields() {
        let owner = token(0x7f12_3456_7c00);
        let mark = MarkWord::encode_biased(Some(owner), 3, 9);

        assert_eq!(mark.kind(), LockKind::Biased);
        assert_eq!(mark.biased_owner(), Some(owner));
        assert_eq!(mark.bias_epoch(), 3);
        assert_eq!(mark.age(), 9);

        let anonymous = mark.with_biased_owner(None);
        assert_eq!(anonymous.biased_owner(), None);
        assert_eq!(anonymous.bias_epoch(), 3);
        assert_eq!(anonymous.with_bias_epoch(1).bias_epoch(), 1);
        assert_eq!(mark.unbiased(), MarkWord::prototype().with_age(9));
    }

    #[test]
    pub fn neutral_fields_do_not_touch_tag() {
        let mark = MarkWord::prototype().with_hash(0x7FFF_FFFF).with_age(15);
        assert!(mark.is_neutral());
        assert_eq!(mark.hash(), 0x7FFF_FFFF);
        assert_eq!(mark.age(), 15);

        let truncated = MarkWord::prototype().with_hash(u32::MAX);
        assert_eq!(truncated.hash(), 0x7FFF_FFFF);
        assert!(truncated.is_neutral());
    }

    #[test]
    pub fn decode_encode_states() {
        let lock = BasicLock::new();
        let monitor = ObjectMonitor::new();
        let marks = [
            MarkWord::prototype().with_hash(0x1234).with_age(4),
            MarkWord::encode_biased(Some(token(0x4000)), 1, 2),
            MarkWord::biased_prototype(0),
            MarkWord::encode_stack_lock(&lock),
            MarkWord::encode_monitor(&monitor),
        ];

        for mark in marks {
            let state = mark.decode();
            assert_eq!(state.kind(), mark.kind());
            assert_eq!(MarkWord::from(state), mark);
        }

        assert_eq!(
            MarkWord::biased_prototype(1).decode(),
            LockState::Biased {
                owner: None,
                epoch: 1,
                age: 0
            }
        );
    }
}
