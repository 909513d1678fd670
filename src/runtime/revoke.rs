//! Bias revocation and epoch-based bulk rebias.
//!
//! All of these stop the world. A biased lock is held without any trace in the header, so the only way
//! to learn whether the owner is inside a synchronized region is to look at its monitor slots while it
//! cannot move.

use super::safepoint::{self, run_at_safepoint};
use crate::lock::{BasicLock, BasicObjectLock, RecordKind};
use crate::markword::{MarkWord, EPOCH_COUNT};
use crate::object::{Klass, Object};
use crate::thread::JavaThread;
use std::sync::Arc;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RevokeResult {
    NotBiased,
    /// The bias was removed and the object left unlocked.
    Revoked,
    /// The owner was inside a synchronized region. The header now stack-locks its outermost record.
    RevokedToStackLock,
}

/// Remove the bias of `obj`, converting a held bias into the stack lock it would have been.
pub fn revoke(obj: &Object) -> RevokeResult {
    if !obj.mark().has_bias_pattern() {
        return RevokeResult::NotBiased;
    }
    run_at_safepoint(|| revoke_at_safepoint(obj))
}

/// The owner's active records for `obj` that were granted through the bias, oldest first.
fn biased_records<'a>(thread: &JavaThread, obj: &Object) -> Vec<&'a BasicObjectLock> {
    thread
        .monitor_slots()
        .into_iter()
        // SAFETY: slots stay valid while registered and their thread is stopped
        .map(|slot| unsafe { &*(slot as *const BasicObjectLock) })
        .filter(|slot| slot.object() == obj as *const Object)
        .filter(|slot| slot.lock().kind() == RecordKind::Biased)
        .collect()
}

fn revoke_at_safepoint(obj: &Object) -> RevokeResult {
    debug_assert!(safepoint::is_at_safepoint());

    let mark = obj.mark();
    if !mark.has_bias_pattern() {
        return RevokeResult::NotBiased;
    }

    let unbiased = mark.unbiased();
    let revocations = obj.klass().record_revocation();

    let owner = match mark.biased_owner().and_then(JavaThread::find) {
        Some(thread) if thread.is_alive() => thread,
        _ => {
            trace!("Revoked unowned bias of {:?}", obj);
            obj.release_mark(unbiased);
            return RevokeResult::Revoked;
        }
    };

    let records = biased_records(&owner, obj);
    let (outermost, nested) = match records.split_first() {
        Some(x) => x,
        None => {
            trace!("Revoked bias of {:?} held by idle {:?}", obj, owner);
            obj.release_mark(unbiased);
            return RevokeResult::Revoked;
        }
    };

    for record in nested {
        record.lock().set_displaced_header(BasicLock::RECURSIVE);
    }
    outermost.lock().set_displaced_header(unbiased);
    obj.release_mark(MarkWord::encode_stack_lock(outermost.lock()));

    debug!(
        "Revoked bias of {:?} held {} deep by {:?} ({} revocations of {})",
        obj,
        records.len(),
        owner,
        revocations,
        obj.klass().name()
    );
    RevokeResult::RevokedToStackLock
}

/// Objects of `klass` currently locked by some thread, deduplicated.
fn held_instances(klass: &Arc<Klass>) -> Vec<*const Object> {
    let mut objects: Vec<*const Object> = JavaThread::all()
        .iter()
        .flat_map(|thread| thread.monitor_slots())
        // SAFETY: slots stay valid while registered and their thread is stopped
        .map(|slot| unsafe { &*(slot as *const BasicObjectLock) }.object())
        .filter(|&obj| !obj.is_null() && Arc::ptr_eq(unsafe { (*obj).klass() }, klass))
        .collect();

    objects.sort_unstable();
    objects.dedup();
    objects
}

/// Invalidate every outstanding bias of `klass` by moving to the next epoch. Biases that are currently
/// held move to the new epoch with them. Returns the new epoch, or `None` if the class is no longer
/// biasable.
pub fn bulk_rebias(klass: &Arc<Klass>) -> Option<u8> {
    run_at_safepoint(|| {
        let prototype = klass.prototype_header();
        if !prototype.has_bias_pattern() {
            return None;
        }

        let epoch = (prototype.bias_epoch() + 1) % EPOCH_COUNT;
        klass.set_prototype_header(prototype.with_bias_epoch(epoch));

        for obj in held_instances(klass) {
            // SAFETY: held objects outlive the regions locking them
            let obj = unsafe { &*obj };
            let mark = obj.mark();
            if mark.has_bias_pattern() {
                obj.release_mark(mark.with_bias_epoch(epoch));
            }
        }

        info!("Bulk rebias of {} moved to epoch {}", klass.name(), epoch);
        Some(epoch)
    })
}

/// Make `klass` permanently unbiasable and revoke the biases of all instances currently locked.
/// Instances that are not locked lose their bias on their next acquisition.
pub fn bulk_revoke(klass: &Arc<Klass>) {
    run_at_safepoint(|| {
        klass.set_prototype_header(MarkWord::prototype());

        for obj in held_instances(klass) {
            // SAFETY: held objects outlive the regions locking them
            let _ = revoke_at_safepoint(unsafe { &*obj });
        }

        info!("Bulk revocation of {}", klass.name());
    })
}
