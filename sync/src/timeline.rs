//! Software timeline helpers (sw_sync).
//!
//! A software timeline is a counter driven from user space. Fences created
//! on it signal once the counter reaches their target value, which makes it
//! the usual way to produce fences in tests and tools.

use std::os::fd::RawFd;
use std::path::Path;

use bytemuck::Zeroable;

use crate::abi::{SwSyncCreateFenceData, encode_name};
use crate::driver::SyncDriver;
use crate::error::SyncResult;

/// Open the software timeline device at `path`.
pub(crate) fn create(driver: &dyn SyncDriver, path: &Path) -> SyncResult<RawFd> {
    Ok(driver.open_timeline(path)?)
}

/// Move the timeline behind `fd` forward by `count`.
pub(crate) fn advance(driver: &dyn SyncDriver, fd: RawFd, count: u32) -> SyncResult<()> {
    driver.timeline_inc(fd, count)?;
    log::trace!("advanced timeline {fd} by {count}");
    Ok(())
}

/// Create a fence that signals once the timeline behind `fd` reaches `value`.
pub(crate) fn fence_create(
    driver: &dyn SyncDriver,
    fd: RawFd,
    name: &str,
    value: u32,
) -> SyncResult<RawFd> {
    let mut data = SwSyncCreateFenceData::zeroed();
    data.value = value;
    data.name = encode_name(name);

    driver.create_fence(fd, &mut data)?;
    log::trace!("created fence {} ({name:?}) at value {value} on timeline {fd}", data.fence);
    Ok(data.fence)
}
