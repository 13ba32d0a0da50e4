//! Kernel sync driver.
//!
//! Talks to real sync_file and sw_sync descriptors through `poll(2)`,
//! `ioctl(2)` and `open(2)`.

use std::fs::OpenOptions;
use std::io;
use std::os::fd::{IntoRawFd, RawFd};
use std::path::Path;

use crate::abi::{
    SW_SYNC_IOC_CREATE_FENCE, SW_SYNC_IOC_INC, SYNC_IOC_FILE_INFO, SYNC_IOC_MERGE,
    SwSyncCreateFenceData, SyncFenceInfo, SyncFileInfo, SyncMergeData,
};

use super::SyncDriver;

/// Driver backed by the kernel sync framework.
#[derive(Debug, Default, Clone, Copy)]
pub struct KernelDriver;

impl KernelDriver {
    /// Create a new kernel driver.
    pub fn new() -> Self {
        Self
    }
}

/// Issue one `ioctl` with a pointer argument.
///
/// # Safety
///
/// `arg` must point to a live value whose layout matches what `request`
/// expects, including any memory the kernel follows from it.
unsafe fn ioctl<T>(fd: RawFd, request: u32, arg: *mut T) -> io::Result<()> {
    log::trace!("KernelDriver: ioctl(fd={fd}, request={request:#010x})");
    // SAFETY: upheld by the caller.
    let ret = unsafe { libc::ioctl(fd, request as _, arg) };
    if ret < 0 {
        let err = io::Error::last_os_error();
        log::trace!("KernelDriver: ioctl(fd={fd}, request={request:#010x}) failed: {err}");
        return Err(err);
    }
    Ok(())
}

impl SyncDriver for KernelDriver {
    fn name(&self) -> &'static str {
        "kernel"
    }

    fn poll_readable(&self, fd: RawFd, timeout_ms: i32) -> io::Result<u32> {
        let mut pollfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        // SAFETY: one valid pollfd, count 1.
        let ret = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        log::trace!("KernelDriver: poll(fd={fd}, timeout={timeout_ms}ms) -> {ret}");
        Ok(ret as u32)
    }

    fn merge(&self, fd: RawFd, data: &mut SyncMergeData) -> io::Result<()> {
        // SAFETY: SyncMergeData matches struct sync_merge_data.
        unsafe { ioctl(fd, SYNC_IOC_MERGE, data as *mut SyncMergeData) }
    }

    fn file_info(
        &self,
        fd: RawFd,
        info: &mut SyncFileInfo,
        fences: &mut [SyncFenceInfo],
    ) -> io::Result<()> {
        // The kernel writes `num_fences` records through the packed address.
        if info.num_fences as usize > fences.len() {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }

        info.sync_fence_info = if fences.is_empty() {
            0
        } else {
            fences.as_mut_ptr() as usize as u64
        };
        // SAFETY: SyncFileInfo matches struct sync_file_info, and the packed
        // address covers at least `num_fences` SyncFenceInfo records.
        let result = unsafe { ioctl(fd, SYNC_IOC_FILE_INFO, info as *mut SyncFileInfo) };
        info.sync_fence_info = 0;
        result
    }

    fn open_timeline(&self, path: &Path) -> io::Result<RawFd> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let fd = file.into_raw_fd();
        log::debug!("KernelDriver: opened timeline {} as fd {fd}", path.display());
        Ok(fd)
    }

    fn timeline_inc(&self, fd: RawFd, count: u32) -> io::Result<()> {
        let mut arg = count;
        // SAFETY: SW_SYNC_IOC_INC takes a pointer to a u32.
        unsafe { ioctl(fd, SW_SYNC_IOC_INC, &mut arg as *mut u32) }
    }

    fn create_fence(&self, fd: RawFd, data: &mut SwSyncCreateFenceData) -> io::Result<()> {
        // SAFETY: SwSyncCreateFenceData matches struct sw_sync_create_fence_data.
        unsafe { ioctl(fd, SW_SYNC_IOC_CREATE_FENCE, data as *mut SwSyncCreateFenceData) }
    }
}
