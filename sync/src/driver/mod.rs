//! Sync driver abstraction layer.
//!
//! Every request the library makes goes through the [`SyncDriver`] trait,
//! so the fence operations can run against the kernel or against an
//! in-process stand-in.
//!
//! # Available Drivers
//!
//! - `kernel` (Linux): `poll`/`ioctl`/`open` on real sync_file and sw_sync descriptors
//! - `dummy` (default feature): simulated sw_sync for tests and CI

#[cfg(feature = "dummy")]
pub mod dummy;

#[cfg(target_os = "linux")]
pub mod kernel;

use std::io;
use std::os::fd::RawFd;
use std::path::Path;
use std::sync::Arc;

use crate::abi::{SwSyncCreateFenceData, SyncFenceInfo, SyncFileInfo, SyncMergeData};
use crate::error::SyncResult;

#[cfg(feature = "dummy")]
pub use dummy::DummyDriver;
#[cfg(target_os = "linux")]
pub use kernel::KernelDriver;

/// Driver selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriverType {
    /// The kernel sync framework.
    #[default]
    Kernel,
    /// In-process simulation, no kernel involvement.
    Dummy,
}

impl DriverType {
    /// Name used in configuration and on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            DriverType::Kernel => "kernel",
            DriverType::Dummy => "dummy",
        }
    }

    /// Parse a driver name as produced by [`DriverType::name`].
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "kernel" => Some(DriverType::Kernel),
            "dummy" => Some(DriverType::Dummy),
            _ => None,
        }
    }
}

/// Request executor for the sync framework.
///
/// Implementations issue exactly one request per call and report failures
/// as the OS error the request produced. They never retry and never close
/// descriptors they were given.
pub trait SyncDriver: Send + Sync + 'static {
    /// Driver name for logs.
    fn name(&self) -> &'static str;

    /// Poll `fd` for input readiness.
    ///
    /// Returns the number of ready descriptors: 0 when the timeout elapsed.
    /// `timeout_ms` of 0 does not block, a negative value blocks forever.
    fn poll_readable(&self, fd: RawFd, timeout_ms: i32) -> io::Result<u32>;

    /// Issue a merge request on `fd`. On success `data.fence` holds the new fence.
    fn merge(&self, fd: RawFd, data: &mut SyncMergeData) -> io::Result<()>;

    /// Issue a file info request on `fd`.
    ///
    /// When `fences` is non-empty it is the sub-fence array for this request;
    /// `info.num_fences` must already equal its length.
    fn file_info(
        &self,
        fd: RawFd,
        info: &mut SyncFileInfo,
        fences: &mut [SyncFenceInfo],
    ) -> io::Result<()>;

    /// Open a software timeline device.
    fn open_timeline(&self, path: &Path) -> io::Result<RawFd>;

    /// Advance the timeline behind `fd` by `count`.
    fn timeline_inc(&self, fd: RawFd, count: u32) -> io::Result<()>;

    /// Create a fence on the timeline behind `fd`. On success `data.fence` holds it.
    fn create_fence(&self, fd: RawFd, data: &mut SwSyncCreateFenceData) -> io::Result<()>;
}

/// Create a driver of the requested type.
pub fn create_driver(driver: DriverType) -> SyncResult<Arc<dyn SyncDriver>> {
    match driver {
        #[cfg(target_os = "linux")]
        DriverType::Kernel => Ok(Arc::new(KernelDriver::new())),
        #[cfg(not(target_os = "linux"))]
        DriverType::Kernel => Err(crate::SyncError::Unsupported(
            "the kernel sync driver requires Linux".to_string(),
        )),
        #[cfg(feature = "dummy")]
        DriverType::Dummy => Ok(Arc::new(DummyDriver::new())),
        #[cfg(not(feature = "dummy"))]
        DriverType::Dummy => Err(crate::SyncError::Unsupported(
            "built without the `dummy` feature".to_string(),
        )),
    }
}
