use std::error::Error;
use std::fmt::{self, Display, Formatter};

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Attempted to release a monitor the current thread does not own.
    IllegalMonitorState { object: usize },
    /// Locking requires the calling thread to be attached first.
    NotAttached,
    ThreadAlreadyAttached,
    /// A thread handle was used by a thread other than the one it belongs to.
    ForeignThread,
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::IllegalMonitorState { object } => write!(
                f,
                "java/lang/IllegalMonitorStateException: current thread is not owner of {:#x}",
                object
            ),
            SyncError::NotAttached => write!(f, "current thread is not attached to the runtime"),
            SyncError::ThreadAlreadyAttached => write!(f, "current thread is already attached"),
            SyncError::ForeignThread => write!(f, "thread handle does not belong to the current thread"),
        }
    }
}

impl Error for SyncError {}
