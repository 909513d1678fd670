//! Monitor allocation and header inflation.
//!
//! Monitors are allocated once and never freed. A monitor that lost an inflation race goes back on the
//! free list, so every monitor ever handed out stays valid for any thread still holding its address.

use super::revoke;
use crate::markword::{LockState, MarkWord};
use crate::monitor::ObjectMonitor;
use crate::object::Object;
use crate::stats::{Counter, LockCounters};
use parking_lot::Mutex;
use std::thread;

lazy_static! {
    static ref MONITORS: Mutex<MonitorList> = Mutex::new(MonitorList::default());
}

#[derive(Default)]
struct MonitorList {
    allocated: usize,
    free: Vec<&'static ObjectMonitor>,
}

fn allocate_monitor() -> &'static ObjectMonitor {
    let mut list = MONITORS.lock();
    if let Some(monitor) = list.free.pop() {
        return monitor;
    }

    list.allocated += 1;
    Box::leak(Box::new(ObjectMonitor::new()))
}

fn release_monitor(monitor: &'static ObjectMonitor) {
    MONITORS.lock().free.push(monitor);
}

/// Number of monitors currently installed in object headers.
pub fn monitors_in_use() -> usize {
    let list = MONITORS.lock();
    list.allocated - list.free.len()
}

/// Get the monitor of `obj`, inflating its header if needed.
///
/// A stack-locked header is first swapped for [`MarkWord::INFLATING`], which keeps both the owner's
/// release and other inflaters away while the displaced header is copied out of the owner's record.
/// The monitor takes the record's address as its owner; the stack owner claims it on its next
/// monitor operation.
pub fn inflate(obj: &Object, counters: &LockCounters) -> &'static ObjectMonitor {
    let mut spare: Option<&'static ObjectMonitor> = None;

    loop {
        let mark = obj.mark();
        match mark.decode() {
            LockState::Inflated(monitor) => {
                if let Some(spare) = spare {
                    release_monitor(spare);
                }
                // SAFETY: installed monitors are never freed
                return unsafe { &*monitor };
            }
            LockState::StackLocked(lock) if lock.is_null() => {
                thread::yield_now();
            }
            LockState::StackLocked(lock) => {
                let monitor = spare.take().unwrap_or_else(allocate_monitor);
                if obj.cas_mark(mark, MarkWord::INFLATING).is_err() {
                    spare = Some(monitor);
                    continue;
                }

                // SAFETY: the owner cannot release its record while the header reads INFLATING
                let displaced = unsafe { (*lock).displaced_header() };
                monitor.prepare(obj, displaced, lock as usize);
                obj.release_mark(MarkWord::encode_monitor(monitor));

                counters.record(Counter::Inflations);
                debug!("Inflated stack-locked {:?} into {:p}", obj, monitor);
                return monitor;
            }
            LockState::Neutral { .. } => {
                let monitor = spare.take().unwrap_or_else(allocate_monitor);
                monitor.prepare(obj, mark, 0);
                if obj.cas_mark(mark, MarkWord::encode_monitor(monitor)).is_err() {
                    spare = Some(monitor);
                    continue;
                }

                counters.record(Counter::Inflations);
                debug!("Inflated neutral {:?} into {:p}", obj, monitor);
                return monitor;
            }
            LockState::Biased { .. } => {
                if revoke::revoke(obj) != revoke::RevokeResult::NotBiased {
                    counters.record(Counter::Revocations);
                }
            }
        }
    }
}
