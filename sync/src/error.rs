//! Sync error types.

use std::io;

use thiserror::Error;

/// Errors returned by fence and timeline operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A bad argument was rejected before any request reached the driver.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The wait elapsed before the fence signaled.
    #[error("timed out waiting for fence")]
    TimedOut,
    /// The sub-fence array could not be allocated.
    #[error("failed to allocate {count} sub-fence records")]
    AllocationFailure { count: usize },
    /// The driver request failed. The OS error is passed through unchanged.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The selected driver is not available on this platform.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl SyncError {
    /// Whether this error is the timeout of a wait.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut)
    }

    /// The errno equivalent of this error, if there is one.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::InvalidArgument(_) => Some(libc::EINVAL),
            Self::TimedOut => Some(libc::ETIME),
            Self::AllocationFailure { .. } => Some(libc::ENOMEM),
            Self::Io(err) => err.raw_os_error(),
            Self::Unsupported(_) => None,
        }
    }
}

/// Result alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
