//! # RedLilium Sync
//!
//! Fence primitives on top of the Linux sync framework (sync_file and sw_sync).
//!
//! ## Overview
//!
//! This crate provides:
//! - [`wait`] - Block until a fence signals, with a millisecond timeout
//! - [`merge`] - Combine two fences into one that signals when both have
//! - [`query`] - Read a fence's status and its sub-fences as a [`FenceInfo`]
//! - [`latest_timestamp`] - Completion time of the last sub-fence to signal
//! - Software timelines: [`timeline_create`], [`timeline_advance`], [`timeline_fence_create`]
//! - [`SyncContext`] - The same operations against any [`SyncDriver`], including
//!   the in-process [`DummyDriver`] used in tests
//!
//! Fence descriptors are plain [`RawFd`]s owned by the caller. Nothing in this
//! crate closes them.
//!
//! ## Example
//!
//! ```ignore
//! use redlilium_sync as sync;
//!
//! let timeline = sync::timeline_create()?;
//! let a = sync::timeline_fence_create(timeline, "shadow", 1)?;
//! let b = sync::timeline_fence_create(timeline, "lighting", 2)?;
//! let frame = sync::merge("frame", a, b)?;
//!
//! sync::timeline_advance(timeline, 2)?;
//! sync::wait(frame, 100)?;
//!
//! let info = sync::query(frame)?;
//! println!("{} done at {}ns", info.name(), sync::latest_timestamp(&info));
//! sync::release(Some(info));
//! ```

pub mod abi;
pub mod config;
mod context;
pub mod driver;
mod error;
mod fence;
mod info;
mod timeline;

use std::os::fd::RawFd;
use std::path::Path;

pub use config::{SW_SYNC_DEBUGFS_PATH, SW_SYNC_DEVICE_PATH, SyncConfig};
pub use context::SyncContext;
#[cfg(feature = "dummy")]
pub use driver::DummyDriver;
#[cfg(target_os = "linux")]
pub use driver::KernelDriver;
pub use driver::{DriverType, SyncDriver};
pub use error::{SyncError, SyncResult};
pub use fence::timeout_ms;
pub use info::{FenceInfo, FenceStatus, SubFenceInfo, latest_timestamp, release};

/// Sync library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version.
pub fn init() {
    log::info!("RedLilium Sync v{} initialized", VERSION);
}

#[cfg(target_os = "linux")]
static KERNEL_DRIVER: KernelDriver = KernelDriver;

/// Driver behind the free functions.
fn kernel_driver() -> SyncResult<&'static dyn SyncDriver> {
    #[cfg(target_os = "linux")]
    {
        Ok(&KERNEL_DRIVER)
    }
    #[cfg(not(target_os = "linux"))]
    {
        Err(SyncError::Unsupported(
            "the kernel sync driver requires Linux".to_string(),
        ))
    }
}

/// Block until `fd` signals or `timeout_ms` milliseconds pass.
///
/// See [`SyncContext::wait`].
pub fn wait(fd: RawFd, timeout_ms: i32) -> SyncResult<()> {
    fence::wait(kernel_driver()?, fd, timeout_ms)
}

/// Create a fence that signals once both `fd1` and `fd2` have signaled.
///
/// See [`SyncContext::merge`].
pub fn merge(name: &str, fd1: RawFd, fd2: RawFd) -> SyncResult<RawFd> {
    fence::merge(kernel_driver()?, name, fd1, fd2)
}

/// Query the status and sub-fences of `fd`.
///
/// See [`SyncContext::query`].
pub fn query(fd: RawFd) -> SyncResult<FenceInfo> {
    info::query(kernel_driver()?, fd)
}

/// Open a software timeline at [`SW_SYNC_DEVICE_PATH`].
///
/// See [`SyncContext::timeline_create`].
pub fn timeline_create() -> SyncResult<RawFd> {
    timeline::create(kernel_driver()?, Path::new(SW_SYNC_DEVICE_PATH))
}

/// Advance the timeline behind `fd` by `count`.
///
/// See [`SyncContext::timeline_advance`].
pub fn timeline_advance(fd: RawFd, count: u32) -> SyncResult<()> {
    timeline::advance(kernel_driver()?, fd, count)
}

/// Create a fence that signals once the timeline behind `fd` reaches `value`.
///
/// See [`SyncContext::timeline_fence_create`].
pub fn timeline_fence_create(fd: RawFd, name: &str, value: u32) -> SyncResult<RawFd> {
    timeline::fence_create(kernel_driver()?, fd, name, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_wait_rejects_negative_fd() {
        let err = wait(-3, 0).unwrap_err();
        assert!(matches!(err, SyncError::InvalidArgument(_)));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_free_functions_share_the_kernel_driver() {
        let first = kernel_driver().unwrap();
        let second = kernel_driver().unwrap();
        assert_eq!(first.name(), "kernel");
        assert!(std::ptr::addr_eq(first, second));

        assert_eq!(merge("m", -1, -1).unwrap_err().raw_os_error(), Some(libc::EBADF));
        assert_eq!(query(-1).unwrap_err().raw_os_error(), Some(libc::EBADF));
        assert_eq!(
            timeline_advance(-1, 1).unwrap_err().raw_os_error(),
            Some(libc::EBADF)
        );
    }

    #[cfg(not(target_os = "linux"))]
    #[test]
    fn test_free_functions_need_linux() {
        assert!(matches!(wait(3, 0), Err(SyncError::Unsupported(_))));
    }
}
