//! Waiting on and merging fences.

use std::os::fd::RawFd;
use std::time::Duration;

use bytemuck::Zeroable;

use crate::abi::{SyncMergeData, encode_name};
use crate::driver::SyncDriver;
use crate::error::{SyncError, SyncResult};

/// Convert an optional duration to the millisecond timeout of [`wait`].
///
/// `None` waits forever. Sub-millisecond remainders round up so a non-zero
/// duration never turns into a non-blocking poll; values past `i32::MAX`
/// milliseconds saturate.
pub fn timeout_ms(timeout: Option<Duration>) -> i32 {
    match timeout {
        None => -1,
        Some(duration) => {
            let millis = duration.as_nanos().div_ceil(1_000_000);
            i32::try_from(millis).unwrap_or(i32::MAX)
        }
    }
}

/// Block until `fd` signals or `timeout_ms` elapses.
pub(crate) fn wait(driver: &dyn SyncDriver, fd: RawFd, timeout_ms: i32) -> SyncResult<()> {
    if fd < 0 {
        return Err(SyncError::InvalidArgument(format!("negative fence fd {fd}")));
    }

    match driver.poll_readable(fd, timeout_ms)? {
        0 => Err(SyncError::TimedOut),
        _ => Ok(()),
    }
}

/// Ask the driver for a fence that signals once both `fd1` and `fd2` have.
pub(crate) fn merge(
    driver: &dyn SyncDriver,
    name: &str,
    fd1: RawFd,
    fd2: RawFd,
) -> SyncResult<RawFd> {
    let mut data = SyncMergeData::zeroed();
    data.fd2 = fd2;
    data.name = encode_name(name);

    driver.merge(fd1, &mut data)?;
    log::trace!("merged fences {fd1} and {fd2} into {} ({name:?})", data.fence);
    Ok(data.fence)
}
