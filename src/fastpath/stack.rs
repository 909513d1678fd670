use crate::lock::BasicLock;
use crate::markword::MarkWord;
use crate::object::Object;
use crate::thread::current_stack_pointer;

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StackOutcome {
    /// The header now points at the caller's record.
    Locked,
    /// The header already points at a record in the caller's frame range.
    Recursive,
    Contended,
}

/// Try to lock `obj` by pointing its header at `lock`, a record in the calling frame.
///
/// Must be called on the thread that owns `lock`; the recursion test compares against that thread's
/// stack pointer. A `window` of 0 disables recursive detection.
pub fn try_stack_lock(obj: &Object, lock: &BasicLock, window: usize) -> StackOutcome {
    let mark = obj.mark();
    let witness = match mark.is_neutral() {
        true => {
            lock.set_displaced_header(mark);
            match obj.cas_mark(mark, MarkWord::encode_stack_lock(lock)) {
                Ok(_) => return StackOutcome::Locked,
                Err(witness) => witness,
            }
        }
        false => mark,
    };

    if is_own_stack_lock(witness, window) {
        lock.set_displaced_header(BasicLock::RECURSIVE);
        return StackOutcome::Recursive;
    }

    StackOutcome::Contended
}

/// Heuristic: a stack-lock record between our stack pointer and `window` bytes above it is one of our
/// own outer frames. Records below the stack pointer wrap around to huge distances.
#[inline(always)]
fn is_own_stack_lock(mark: MarkWord, window: usize) -> bool {
    mark.is_stack_locked()
        && !mark.is_inflating()
        && mark.raw().wrapping_sub(current_stack_pointer()) < window
}
