//! Dummy sync driver for testing and development.
//!
//! This driver doesn't touch the kernel. It keeps software timelines and
//! fences in process memory and answers requests the way the sync_file and
//! sw_sync drivers do, so fence code can be exercised on machines without
//! `/dev/sw_sync` (CI containers, non-Linux hosts).
//!
//! Descriptors handed out by this driver are plain integers starting at
//! [`FIRST_FD`]. They are not OS descriptors and must be retired with
//! [`DummyDriver::close`], never with `close(2)`.

use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::path::Path;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::abi::{
    SwSyncCreateFenceData, SyncFenceInfo, SyncFileInfo, SyncMergeData, decode_name, encode_name,
};

use super::SyncDriver;

/// First descriptor number handed out by the dummy driver.
pub const FIRST_FD: RawFd = 1000;

/// Driver name reported for every sub-fence.
const DRIVER_NAME: &str = "sw_sync";

/// Number of requests of each kind the driver has served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverCalls {
    pub poll: usize,
    pub merge: usize,
    pub file_info: usize,
    pub open_timeline: usize,
    pub timeline_inc: usize,
    pub create_fence: usize,
}

impl DriverCalls {
    /// Total number of requests.
    pub fn total(&self) -> usize {
        self.poll
            + self.merge
            + self.file_info
            + self.open_timeline
            + self.timeline_inc
            + self.create_fence
    }
}

struct Timeline {
    name: String,
    value: u32,
    /// `(value reached, timestamp)` for every advance, oldest first.
    history: Vec<(u32, u64)>,
}

impl Timeline {
    /// When `point` signaled. A point created after its value was reached
    /// signals at creation.
    fn signal_time(&self, point: &SyncPoint) -> Option<u64> {
        self.history
            .iter()
            .find(|(reached, _)| *reached >= point.value)
            .map(|(_, timestamp)| (*timestamp).max(point.created))
    }
}

#[derive(Clone, Copy)]
struct SyncPoint {
    timeline: usize,
    value: u32,
    /// Timestamp of the fence creation.
    created: u64,
}

struct Fence {
    name: String,
    points: Vec<SyncPoint>,
}

enum Object {
    Timeline(usize),
    Fence(Fence),
}

struct State {
    timelines: Vec<Timeline>,
    objects: HashMap<RawFd, Object>,
    next_fd: RawFd,
    last_timestamp: u64,
    calls: DriverCalls,
}

impl State {
    fn object(&self, fd: RawFd) -> io::Result<&Object> {
        self.objects.get(&fd).ok_or_else(|| errno(libc::EBADF))
    }

    fn fence(&self, fd: RawFd) -> io::Result<&Fence> {
        match self.object(fd)? {
            Object::Fence(fence) => Ok(fence),
            Object::Timeline(_) => Err(errno(libc::ENOTTY)),
        }
    }

    fn timeline_index(&self, fd: RawFd) -> io::Result<usize> {
        match self.object(fd)? {
            Object::Timeline(index) => Ok(*index),
            Object::Fence(_) => Err(errno(libc::ENOTTY)),
        }
    }

    fn is_point_signaled(&self, point: &SyncPoint) -> bool {
        self.timelines[point.timeline].value >= point.value
    }

    fn is_fence_signaled(&self, fence: &Fence) -> bool {
        fence.points.iter().all(|point| self.is_point_signaled(point))
    }

    fn insert(&mut self, object: Object) -> RawFd {
        let fd = self.next_fd;
        self.next_fd += 1;
        self.objects.insert(fd, object);
        fd
    }

    fn next_timestamp(&mut self, epoch: Instant) -> u64 {
        let now = epoch.elapsed().as_nanos() as u64 + 1;
        let timestamp = now.max(self.last_timestamp + 1);
        self.last_timestamp = timestamp;
        timestamp
    }
}

fn errno(code: i32) -> io::Error {
    io::Error::from_raw_os_error(code)
}

fn status_of(signaled: bool) -> i32 {
    i32::from(signaled)
}

/// Simulated sync driver.
///
/// Timelines count up from 0. A fence created for value `v` signals once its
/// timeline reaches `v`; a merged fence signals once all of its points have.
/// Merging keeps one point per timeline, the later one, like the kernel.
pub struct DummyDriver {
    state: Mutex<State>,
    signaled: Condvar,
    epoch: Instant,
}

impl DummyDriver {
    /// Create a driver with no timelines.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                timelines: Vec::new(),
                objects: HashMap::new(),
                next_fd: FIRST_FD,
                last_timestamp: 0,
                calls: DriverCalls::default(),
            }),
            signaled: Condvar::new(),
            epoch: Instant::now(),
        }
    }

    /// Requests served so far.
    pub fn calls(&self) -> DriverCalls {
        self.state.lock().calls
    }

    /// Retire a descriptor handed out by this driver.
    ///
    /// Closing a timeline leaves fences created on it pending at their
    /// current state.
    pub fn close(&self, fd: RawFd) -> io::Result<()> {
        let mut state = self.state.lock();
        state
            .objects
            .remove(&fd)
            .map(|_| ())
            .ok_or_else(|| errno(libc::EBADF))
    }

    /// Current counter of the timeline behind `fd`.
    pub fn timeline_value(&self, fd: RawFd) -> Option<u32> {
        let state = self.state.lock();
        let index = state.timeline_index(fd).ok()?;
        Some(state.timelines[index].value)
    }

    /// Number of live descriptors.
    pub fn open_descriptors(&self) -> usize {
        self.state.lock().objects.len()
    }
}

impl Default for DummyDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DummyDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DummyDriver")
            .field("timelines", &state.timelines.len())
            .field("descriptors", &state.objects.len())
            .field("calls", &state.calls)
            .finish()
    }
}

impl SyncDriver for DummyDriver {
    fn name(&self) -> &'static str {
        "dummy"
    }

    fn poll_readable(&self, fd: RawFd, timeout_ms: i32) -> io::Result<u32> {
        let mut state = self.state.lock();
        state.calls.poll += 1;

        let deadline = (timeout_ms > 0)
            .then(|| Instant::now() + Duration::from_millis(timeout_ms as u64));

        loop {
            let ready = match state.object(fd)? {
                // sw_sync timelines have no poll hook and always read as ready.
                Object::Timeline(_) => true,
                Object::Fence(fence) => state.is_fence_signaled(fence),
            };
            if ready {
                return Ok(1);
            }

            match deadline {
                None if timeout_ms == 0 => return Ok(0),
                None => self.signaled.wait(&mut state),
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return Ok(0);
                    }
                    self.signaled.wait_until(&mut state, deadline);
                }
            }
        }
    }

    fn merge(&self, fd: RawFd, data: &mut SyncMergeData) -> io::Result<()> {
        let mut state = self.state.lock();
        state.calls.merge += 1;

        if data.flags != 0 || data.pad != 0 {
            return Err(errno(libc::EINVAL));
        }

        let first = state.fence(fd)?;
        let second = match state.object(data.fd2) {
            Ok(Object::Fence(fence)) => fence,
            _ => return Err(errno(libc::ENOENT)),
        };

        let mut points: Vec<SyncPoint> =
            Vec::with_capacity(first.points.len() + second.points.len());
        for point in first.points.iter().chain(&second.points) {
            match points.iter_mut().find(|p| p.timeline == point.timeline) {
                Some(existing) => {
                    if point.value > existing.value {
                        *existing = *point;
                    }
                }
                None => points.push(*point),
            }
        }
        points.sort_by_key(|point| point.timeline);

        let fence = Fence {
            name: decode_name(&data.name),
            points,
        };
        log::trace!(
            "DummyDriver: merged fd {fd} and fd {} into {:?} ({} points)",
            data.fd2,
            fence.name,
            fence.points.len()
        );
        data.fence = state.insert(Object::Fence(fence));
        Ok(())
    }

    fn file_info(
        &self,
        fd: RawFd,
        info: &mut SyncFileInfo,
        fences: &mut [SyncFenceInfo],
    ) -> io::Result<()> {
        let mut state = self.state.lock();
        state.calls.file_info += 1;

        if info.flags != 0 || info.pad != 0 {
            return Err(errno(libc::EINVAL));
        }

        let state = &*state;
        let fence = state.fence(fd)?;
        let count = fence.points.len() as u32;

        if info.num_fences != 0 {
            if info.num_fences < count {
                return Err(errno(libc::EINVAL));
            }
            if fences.len() < count as usize {
                return Err(errno(libc::EFAULT));
            }
            for (record, point) in fences.iter_mut().zip(&fence.points) {
                let timeline = &state.timelines[point.timeline];
                let signaled = state.is_point_signaled(point);
                record.obj_name = encode_name(&timeline.name);
                record.driver_name = encode_name(DRIVER_NAME);
                record.status = status_of(signaled);
                record.flags = 0;
                record.timestamp_ns = if signaled {
                    timeline.signal_time(point).unwrap_or(0)
                } else {
                    0
                };
            }
        }

        info.name = encode_name(&fence.name);
        info.status = status_of(state.is_fence_signaled(fence));
        info.num_fences = count;
        Ok(())
    }

    fn open_timeline(&self, path: &Path) -> io::Result<RawFd> {
        let mut state = self.state.lock();
        state.calls.open_timeline += 1;

        let index = state.timelines.len();
        let created = state.next_timestamp(self.epoch);
        state.timelines.push(Timeline {
            name: format!("sw_sync_timeline_{index}"),
            value: 0,
            history: vec![(0, created)],
        });
        let fd = state.insert(Object::Timeline(index));
        log::debug!(
            "DummyDriver: opened timeline {index} for {} as fd {fd}",
            path.display()
        );
        Ok(fd)
    }

    fn timeline_inc(&self, fd: RawFd, count: u32) -> io::Result<()> {
        let mut state = self.state.lock();
        state.calls.timeline_inc += 1;

        let index = state.timeline_index(fd)?;
        let timestamp = state.next_timestamp(self.epoch);
        let timeline = &mut state.timelines[index];
        timeline.value = timeline.value.saturating_add(count);
        let value = timeline.value;
        timeline.history.push((value, timestamp));
        log::trace!("DummyDriver: timeline {index} advanced by {count} to {value}");

        self.signaled.notify_all();
        Ok(())
    }

    fn create_fence(&self, fd: RawFd, data: &mut SwSyncCreateFenceData) -> io::Result<()> {
        let mut state = self.state.lock();
        state.calls.create_fence += 1;

        let index = state.timeline_index(fd)?;
        let created = state.next_timestamp(self.epoch);
        let fence = Fence {
            name: decode_name(&data.name),
            points: vec![SyncPoint {
                timeline: index,
                value: data.value,
                created,
            }],
        };
        data.fence = state.insert(Object::Fence(fence));
        Ok(())
    }
}
