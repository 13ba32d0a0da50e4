//! Kernel ABI for the sync framework (`linux/sync_file.h`, `sw_sync`).
//!
//! Record layouts and request codes shared by every [`SyncDriver`](crate::SyncDriver).
//! All records are plain old data so they can be zero-initialized with
//! [`bytemuck::Zeroable::zeroed`] before being filled in.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

/// Capacity of every fixed-size name field, including the terminator.
pub const NAME_LEN: usize = 32;

/// `ioctl` type byte of the sync_file interface.
pub const SYNC_IOC_MAGIC: u8 = b'>';

/// `ioctl` type byte of the software timeline interface.
pub const SW_SYNC_IOC_MAGIC: u8 = b'W';

const IOC_NRSHIFT: u32 = 0;
const IOC_TYPESHIFT: u32 = 8;
const IOC_SIZESHIFT: u32 = 16;
const IOC_DIRSHIFT: u32 = 30;

const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

/// Encode a request code using the generic Linux `_IOC` layout.
///
/// Architectures with a different `_IOC` layout (mips, powerpc, sparc)
/// are not covered.
const fn ioc(dir: u32, ty: u8, nr: u8, size: usize) -> u32 {
    (dir << IOC_DIRSHIFT)
        | ((size as u32) << IOC_SIZESHIFT)
        | ((ty as u32) << IOC_TYPESHIFT)
        | ((nr as u32) << IOC_NRSHIFT)
}

const fn iow(ty: u8, nr: u8, size: usize) -> u32 {
    ioc(IOC_WRITE, ty, nr, size)
}

const fn iowr(ty: u8, nr: u8, size: usize) -> u32 {
    ioc(IOC_READ | IOC_WRITE, ty, nr, size)
}

/// Merge two fences into a new one.
pub const SYNC_IOC_MERGE: u32 = iowr(SYNC_IOC_MAGIC, 3, size_of::<SyncMergeData>());

/// Query fence info, optionally filling a sub-fence array.
pub const SYNC_IOC_FILE_INFO: u32 = iowr(SYNC_IOC_MAGIC, 4, size_of::<SyncFileInfo>());

/// Create a fence on a software timeline.
pub const SW_SYNC_IOC_CREATE_FENCE: u32 =
    iowr(SW_SYNC_IOC_MAGIC, 0, size_of::<SwSyncCreateFenceData>());

/// Advance a software timeline.
pub const SW_SYNC_IOC_INC: u32 = iow(SW_SYNC_IOC_MAGIC, 1, size_of::<u32>());

/// `struct sync_merge_data`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct SyncMergeData {
    pub name: [u8; NAME_LEN],
    pub fd2: i32,
    /// Output: the merged fence.
    pub fence: i32,
    pub flags: u32,
    pub pad: u32,
}

/// `struct sync_file_info`.
///
/// `sync_fence_info` carries a user-space address in a 64-bit field. Only
/// the kernel driver writes it, and only for the duration of one request.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct SyncFileInfo {
    pub name: [u8; NAME_LEN],
    pub status: i32,
    pub flags: u32,
    pub num_fences: u32,
    pub pad: u32,
    pub sync_fence_info: u64,
}

/// `struct sync_fence_info`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct SyncFenceInfo {
    pub obj_name: [u8; NAME_LEN],
    pub driver_name: [u8; NAME_LEN],
    pub status: i32,
    pub flags: u32,
    pub timestamp_ns: u64,
}

/// `struct sw_sync_create_fence_data`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct SwSyncCreateFenceData {
    pub value: u32,
    pub name: [u8; NAME_LEN],
    /// Output: the created fence.
    pub fence: i32,
}

const_assert_eq!(size_of::<SyncMergeData>(), 48);
const_assert_eq!(size_of::<SyncFileInfo>(), 56);
const_assert_eq!(size_of::<SyncFenceInfo>(), 80);
const_assert_eq!(size_of::<SwSyncCreateFenceData>(), 40);

/// Copy `name` into a fixed-size, NUL-terminated field.
///
/// At most `NAME_LEN - 1` bytes are kept. The cut is moved back to a
/// character boundary so the stored bytes stay valid UTF-8.
pub fn encode_name(name: &str) -> [u8; NAME_LEN] {
    let mut field = [0u8; NAME_LEN];
    let mut len = name.len().min(NAME_LEN - 1);
    while !name.is_char_boundary(len) {
        len -= 1;
    }
    field[..len].copy_from_slice(&name.as_bytes()[..len]);
    field
}

/// Read a fixed-size name field up to its first NUL.
pub fn decode_name(field: &[u8; NAME_LEN]) -> String {
    let len = field.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
    String::from_utf8_lossy(&field[..len]).into_owned()
}
