//! Object monitor locking for a JVM runtime.
//!
//! The crate is split in two halves. [`fastpath`] is the non-blocking acquisition and release protocol:
//! it decodes the object's mark word, tries the biased, stack and inflated tiers in order and reports
//! either ownership or contention. [`runtime`] is the slow path the fast path hands contention to. It
//! inflates monitors, revokes biases at safepoints and parks threads.
//!
//! ```text
//! ObjectSynchronizer::enter -> FastPath::enter -> Owned
//!                                              -> Contended -> SlowPath::slow_enter
//! ```

// Ensure each result error is either unwrapped or returned
#![deny(unused_must_use)]

#[cfg(not(target_pointer_width = "64"))]
compile_error!("jvm_sync only implements the 64-bit mark word layout");

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

pub mod atomic;
pub mod config;
pub mod error;
pub mod fastpath;
pub mod lock;
pub mod markword;
pub mod monitor;
pub mod object;
pub mod runtime;
pub mod stats;
pub mod thread;

pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use fastpath::{FastPath, LockOutcome, UnlockOutcome};
pub use lock::{BasicLock, BasicObjectLock};
pub use markword::{LockKind, LockState, MarkWord};
pub use monitor::ObjectMonitor;
pub use object::{Klass, Object};
pub use runtime::{ObjectSynchronizer, SlowPath};
pub use stats::{Counter, LockCounters, LockStatistics};
pub use thread::{JavaThread, ThreadToken};
