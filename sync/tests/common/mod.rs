//! Common utilities for sync integration tests.
//!
//! [`ScriptedDriver`] answers each request with the next canned reply for
//! that request kind and records every request it receives, so tests can
//! assert on what reached the driver and in which state.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytemuck::Zeroable;
use parking_lot::Mutex;

use redlilium_sync::{SyncContext, SyncDriver};
#[cfg(feature = "dummy")]
use redlilium_sync::{DriverType, DummyDriver, SyncConfig};
use redlilium_sync::abi::{
    SwSyncCreateFenceData, SyncFenceInfo, SyncFileInfo, SyncMergeData, encode_name,
};

/// Reply returned once the script for a request kind is exhausted.
pub const UNSCRIPTED: i32 = libc::ENOSYS;

// ============================================================================
// Recorded Requests
// ============================================================================

/// A request as the driver received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Poll {
        fd: RawFd,
        timeout_ms: i32,
    },
    Merge {
        fd: RawFd,
        data: SyncMergeData,
    },
    FileInfo {
        fd: RawFd,
        info: SyncFileInfo,
        array_len: usize,
    },
    OpenTimeline {
        path: PathBuf,
    },
    TimelineInc {
        fd: RawFd,
        count: u32,
    },
    CreateFence {
        fd: RawFd,
        data: SwSyncCreateFenceData,
    },
}

// ============================================================================
// Canned Replies
// ============================================================================

/// Canned answer to a file info request.
#[derive(Debug, Clone)]
pub struct FileInfoReply {
    pub name: &'static str,
    pub status: i32,
    pub flags: u32,
    pub num_fences: u32,
    /// Copied into the caller's array, as far as it reaches.
    pub fences: Vec<SyncFenceInfo>,
}

impl FileInfoReply {
    /// First-phase answer: only the count.
    pub fn count(name: &'static str, status: i32, num_fences: u32) -> Self {
        Self {
            name,
            status,
            flags: 0,
            num_fences,
            fences: Vec::new(),
        }
    }

    /// Second-phase answer: the count and the records.
    pub fn records(name: &'static str, status: i32, fences: Vec<SyncFenceInfo>) -> Self {
        Self {
            name,
            status,
            flags: 0,
            num_fences: fences.len() as u32,
            fences,
        }
    }

    /// Answer with these flags set.
    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }
}

/// Build a sub-fence record.
pub fn sub_fence(obj_name: &str, status: i32, timestamp_ns: u64) -> SyncFenceInfo {
    let mut record = SyncFenceInfo::zeroed();
    record.obj_name = encode_name(obj_name);
    record.driver_name = encode_name("scripted");
    record.status = status;
    record.timestamp_ns = timestamp_ns;
    record
}

fn errno(code: i32) -> io::Error {
    io::Error::from_raw_os_error(code)
}

fn next<T>(queue: &Mutex<VecDeque<Result<T, i32>>>) -> io::Result<T> {
    queue
        .lock()
        .pop_front()
        .unwrap_or(Err(UNSCRIPTED))
        .map_err(errno)
}

// ============================================================================
// Scripted Driver
// ============================================================================

/// Driver with per-request-kind reply queues.
#[derive(Default)]
pub struct ScriptedDriver {
    calls: Mutex<Vec<Call>>,
    poll: Mutex<VecDeque<Result<u32, i32>>>,
    merge: Mutex<VecDeque<Result<RawFd, i32>>>,
    file_info: Mutex<VecDeque<Result<FileInfoReply, i32>>>,
    open_timeline: Mutex<VecDeque<Result<RawFd, i32>>>,
    timeline_inc: Mutex<VecDeque<Result<(), i32>>>,
    create_fence: Mutex<VecDeque<Result<RawFd, i32>>>,
}

impl ScriptedDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A context whose requests go to `driver`.
    pub fn context(driver: &Arc<Self>) -> SyncContext {
        SyncContext::with_driver(driver.clone())
    }

    pub fn push_poll(&self, reply: Result<u32, i32>) {
        self.poll.lock().push_back(reply);
    }

    pub fn push_merge(&self, reply: Result<RawFd, i32>) {
        self.merge.lock().push_back(reply);
    }

    pub fn push_file_info(&self, reply: Result<FileInfoReply, i32>) {
        self.file_info.lock().push_back(reply);
    }

    pub fn push_open_timeline(&self, reply: Result<RawFd, i32>) {
        self.open_timeline.lock().push_back(reply);
    }

    pub fn push_timeline_inc(&self, reply: Result<(), i32>) {
        self.timeline_inc.lock().push_back(reply);
    }

    pub fn push_create_fence(&self, reply: Result<RawFd, i32>) {
        self.create_fence.lock().push_back(reply);
    }

    /// Every request received so far, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

impl SyncDriver for ScriptedDriver {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn poll_readable(&self, fd: RawFd, timeout_ms: i32) -> io::Result<u32> {
        self.record(Call::Poll { fd, timeout_ms });
        next(&self.poll)
    }

    fn merge(&self, fd: RawFd, data: &mut SyncMergeData) -> io::Result<()> {
        self.record(Call::Merge { fd, data: *data });
        data.fence = next(&self.merge)?;
        Ok(())
    }

    fn file_info(
        &self,
        fd: RawFd,
        info: &mut SyncFileInfo,
        fences: &mut [SyncFenceInfo],
    ) -> io::Result<()> {
        self.record(Call::FileInfo {
            fd,
            info: *info,
            array_len: fences.len(),
        });
        let reply = next(&self.file_info)?;
        for (slot, record) in fences.iter_mut().zip(&reply.fences) {
            *slot = *record;
        }
        info.name = encode_name(reply.name);
        info.status = reply.status;
        info.flags = reply.flags;
        info.num_fences = reply.num_fences;
        Ok(())
    }

    fn open_timeline(&self, path: &Path) -> io::Result<RawFd> {
        self.record(Call::OpenTimeline {
            path: path.to_path_buf(),
        });
        next(&self.open_timeline)
    }

    fn timeline_inc(&self, fd: RawFd, count: u32) -> io::Result<()> {
        self.record(Call::TimelineInc { fd, count });
        next(&self.timeline_inc)
    }

    fn create_fence(&self, fd: RawFd, data: &mut SwSyncCreateFenceData) -> io::Result<()> {
        self.record(Call::CreateFence { fd, data: *data });
        data.fence = next(&self.create_fence)?;
        Ok(())
    }
}

/// Install a test logger once per test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Driver-parameterized Context
// ============================================================================

/// Driver a parameterized test runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Dummy,
    Kernel,
}

/// Context for tests that run against a real or simulated sw_sync.
///
/// Tracks every descriptor the test creates and closes them on drop.
#[cfg(feature = "dummy")]
pub struct TestContext {
    pub ctx: SyncContext,
    dummy: Option<Arc<DummyDriver>>,
    owned: Mutex<Vec<RawFd>>,
}

#[cfg(feature = "dummy")]
impl TestContext {
    /// Create a context, or `None` when the driver cannot be used here.
    ///
    /// The kernel driver needs a readable `/dev/sw_sync`, which usually
    /// means root and a kernel built with `CONFIG_SW_SYNC`.
    pub fn new(driver: Driver) -> Option<Self> {
        init_logging();
        match driver {
            Driver::Dummy => {
                let dummy = Arc::new(DummyDriver::new());
                Some(Self {
                    ctx: SyncContext::with_driver(dummy.clone()),
                    dummy: Some(dummy),
                    owned: Mutex::new(Vec::new()),
                })
            }
            Driver::Kernel => {
                let config = SyncConfig::new().with_driver(DriverType::Kernel);
                let ctx = SyncContext::with_config(config).ok()?;
                let probe = ctx.timeline_create().ok()?;
                close_os_fd(probe);
                Some(Self {
                    ctx,
                    dummy: None,
                    owned: Mutex::new(Vec::new()),
                })
            }
        }
    }

    /// Keep `fd` until the context drops.
    pub fn own(&self, fd: RawFd) -> RawFd {
        self.owned.lock().push(fd);
        fd
    }

    pub fn timeline(&self) -> RawFd {
        let fd = self.ctx.timeline_create().unwrap();
        self.own(fd)
    }

    pub fn fence(&self, timeline: RawFd, name: &str, value: u32) -> RawFd {
        let fd = self.ctx.timeline_fence_create(timeline, name, value).unwrap();
        self.own(fd)
    }

    pub fn merge(&self, name: &str, fd1: RawFd, fd2: RawFd) -> RawFd {
        let fd = self.ctx.merge(name, fd1, fd2).unwrap();
        self.own(fd)
    }
}

#[cfg(feature = "dummy")]
impl Drop for TestContext {
    fn drop(&mut self) {
        for fd in self.owned.lock().drain(..) {
            match &self.dummy {
                Some(dummy) => {
                    let _ = dummy.close(fd);
                }
                None => close_os_fd(fd),
            }
        }
    }
}

fn close_os_fd(fd: RawFd) {
    // SAFETY: `fd` was returned by the kernel to this test and is closed once.
    unsafe {
        libc::close(fd);
    }
}
