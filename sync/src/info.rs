//! Fence info queries.
//!
//! A fence's sub-fence count is not known until the driver reports it, so
//! [`query`] talks to the driver twice: once to learn the count, and once
//! more with an array sized for it. The resulting [`FenceInfo`] owns that
//! array for the rest of its life.
//!
//! The count is not re-checked between the two requests. The array keeps
//! the length reported by the first request and its contents are taken from
//! the second one as they are.

use std::fmt;
use std::os::fd::RawFd;

use bytemuck::{TransparentWrapper, Zeroable};

use crate::abi::{SyncFenceInfo, SyncFileInfo, decode_name};
use crate::driver::SyncDriver;
use crate::error::{SyncError, SyncResult};

/// Status of a fence or sub-fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FenceStatus {
    /// Not signaled yet.
    Active,
    /// Signaled.
    Signaled,
    /// Signaled with an error; holds the negative errno.
    Error(i32),
}

impl FenceStatus {
    /// Interpret a raw driver status.
    pub fn from_raw(status: i32) -> Self {
        match status {
            s if s > 0 => FenceStatus::Signaled,
            0 => FenceStatus::Active,
            s => FenceStatus::Error(s),
        }
    }
}

/// One constituent fence of a (possibly merged) fence.
#[derive(Clone, Copy, PartialEq, Eq, TransparentWrapper)]
#[repr(transparent)]
pub struct SubFenceInfo(SyncFenceInfo);

impl SubFenceInfo {
    /// Name of the timeline the fence belongs to.
    pub fn object_name(&self) -> String {
        decode_name(&self.0.obj_name)
    }

    /// Name of the driver that created the fence.
    pub fn driver_name(&self) -> String {
        decode_name(&self.0.driver_name)
    }

    /// Status of this fence.
    pub fn status(&self) -> FenceStatus {
        FenceStatus::from_raw(self.0.status)
    }

    /// Raw status as reported by the driver.
    pub fn status_raw(&self) -> i32 {
        self.0.status
    }

    /// Reserved flags.
    pub fn flags(&self) -> u32 {
        self.0.flags
    }

    /// Completion time in nanoseconds, 0 while the fence has not signaled.
    pub fn timestamp_ns(&self) -> u64 {
        self.0.timestamp_ns
    }
}

impl fmt::Debug for SubFenceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubFenceInfo")
            .field("object_name", &self.object_name())
            .field("driver_name", &self.driver_name())
            .field("status", &self.status())
            .field("flags", &self.flags())
            .field("timestamp_ns", &self.timestamp_ns())
            .finish()
    }
}

/// Status and metadata of a fence, with one record per sub-fence.
///
/// Only produced by [`SyncContext::query`](crate::SyncContext::query).
/// Dropping it or passing it to [`release`] frees the sub-fence array
/// together with the summary.
pub struct FenceInfo {
    header: SyncFileInfo,
    fences: Vec<SyncFenceInfo>,
}

impl FenceInfo {
    /// Name of the fence.
    pub fn name(&self) -> String {
        decode_name(&self.header.name)
    }

    /// Overall status of the fence.
    pub fn status(&self) -> FenceStatus {
        FenceStatus::from_raw(self.header.status)
    }

    /// Raw overall status as reported by the driver.
    pub fn status_raw(&self) -> i32 {
        self.header.status
    }

    /// Whether the fence has signaled without error.
    pub fn is_signaled(&self) -> bool {
        self.status() == FenceStatus::Signaled
    }

    /// Reserved flags.
    pub fn flags(&self) -> u32 {
        self.header.flags
    }

    /// Number of sub-fence records.
    pub fn sub_fence_count(&self) -> usize {
        self.fences.len()
    }

    /// The sub-fence records, in driver order.
    pub fn sub_fences(&self) -> &[SubFenceInfo] {
        SubFenceInfo::wrap_slice(self.fences.as_slice())
    }

    /// Number of sub-fences that have signaled.
    pub fn signaled_count(&self) -> usize {
        self.fences.iter().filter(|fence| fence.status > 0).count()
    }

    /// Latest completion time across all sub-fences, 0 if there are none.
    ///
    /// A merged fence completes when its last constituent does, so this is
    /// the completion time of the fence as a whole once it has signaled.
    pub fn latest_timestamp(&self) -> u64 {
        latest_timestamp(self)
    }

    /// Free the sub-fence array and the summary.
    pub fn release(self) {
        release(Some(self));
    }
}

impl fmt::Debug for FenceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FenceInfo")
            .field("name", &self.name())
            .field("status", &self.status())
            .field("flags", &self.flags())
            .field("sub_fences", &self.sub_fences())
            .finish()
    }
}

/// Query the status and sub-fences of `fd`.
pub(crate) fn query(driver: &dyn SyncDriver, fd: RawFd) -> SyncResult<FenceInfo> {
    let mut header = SyncFileInfo::zeroed();
    driver.file_info(fd, &mut header, &mut [])?;

    let count = header.num_fences;
    if count == 0 {
        return Ok(FenceInfo {
            header,
            fences: Vec::new(),
        });
    }
    log::debug!("fence fd {fd} has {count} sub-fences");

    // The driver rejects a second request with leftover flags.
    header.flags = 0;
    header.num_fences = count;

    let len = count as usize;
    let mut fences = Vec::new();
    fences
        .try_reserve_exact(len)
        .map_err(|_| SyncError::AllocationFailure { count: len })?;
    fences.resize(len, SyncFenceInfo::zeroed());

    driver.file_info(fd, &mut header, &mut fences)?;
    // A fence can lose sub-fences between the two requests; a larger
    // second count is not re-validated.
    fences.truncate(len.min(header.num_fences as usize));
    Ok(FenceInfo { header, fences })
}

/// Free a [`FenceInfo`]. `None` is a no-op.
pub fn release(info: Option<FenceInfo>) {
    drop(info);
}

/// Latest completion time across the sub-fences of `info`, 0 if there are none.
pub fn latest_timestamp(info: &FenceInfo) -> u64 {
    info.fences
        .iter()
        .map(|fence| fence.timestamp_ns)
        .max()
        .unwrap_or(0)
}
