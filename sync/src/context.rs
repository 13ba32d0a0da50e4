//! Sync context.
//!
//! The [`SyncContext`] is the entry point for fence operations. It pairs a
//! [`SyncDriver`] with a [`SyncConfig`] and exposes every operation as a
//! method, so the same code runs against the kernel or the dummy driver.

use std::os::fd::RawFd;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SyncConfig;
use crate::driver::{self, SyncDriver};
use crate::error::SyncResult;
use crate::fence;
use crate::info::{self, FenceInfo};
use crate::timeline;

/// Fence operations bound to a driver.
///
/// The context never duplicates or closes descriptors. Descriptors passed in
/// stay owned by the caller, and descriptors returned (merged fences,
/// timeline fences, timelines) become owned by the caller.
///
/// # Thread Safety
///
/// `SyncContext` is `Send + Sync`. It imposes no locking on descriptors;
/// callers serialize concurrent use of the same descriptor.
///
/// # Example
///
/// ```ignore
/// let ctx = SyncContext::new()?;
/// let timeline = ctx.timeline_create()?;
/// let fence = ctx.timeline_fence_create(timeline, "frame", 1)?;
/// ctx.timeline_advance(timeline, 1)?;
/// ctx.wait(fence, 0)?;
/// ```
#[derive(Clone)]
pub struct SyncContext {
    driver: Arc<dyn SyncDriver>,
    config: SyncConfig,
}

impl SyncContext {
    /// Create a context with the default configuration (kernel driver).
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel driver is unavailable on this platform.
    pub fn new() -> SyncResult<Self> {
        Self::with_config(SyncConfig::default())
    }

    /// Create a context from a configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured driver is unavailable.
    pub fn with_config(config: SyncConfig) -> SyncResult<Self> {
        let driver = driver::create_driver(config.driver)?;
        log::debug!("Using sync driver: {}", driver.name());
        Ok(Self { driver, config })
    }

    /// Create a context around an existing driver, with default configuration.
    pub fn with_driver(driver: Arc<dyn SyncDriver>) -> Self {
        Self {
            driver,
            config: SyncConfig::default(),
        }
    }

    /// Replace the configuration, keeping the driver.
    pub fn configured(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// The driver requests go through.
    pub fn driver(&self) -> &Arc<dyn SyncDriver> {
        &self.driver
    }

    /// The active configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Block until `fd` signals or `timeout_ms` milliseconds pass.
    ///
    /// A timeout of 0 polls without blocking; a negative timeout blocks
    /// until the fence signals.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidArgument`](crate::SyncError::InvalidArgument) for a negative `fd`, without any request
    /// - [`SyncError::TimedOut`](crate::SyncError::TimedOut) if the timeout elapsed
    /// - [`SyncError::Io`](crate::SyncError::Io) for any other failure, such as `EINTR`
    pub fn wait(&self, fd: RawFd, timeout_ms: i32) -> SyncResult<()> {
        fence::wait(self.driver.as_ref(), fd, timeout_ms)
    }

    /// [`wait`](Self::wait) with a [`Duration`]; `None` blocks until signaled.
    pub fn wait_for(&self, fd: RawFd, timeout: Option<Duration>) -> SyncResult<()> {
        self.wait(fd, fence::timeout_ms(timeout))
    }

    /// Create a fence that signals once both `fd1` and `fd2` have signaled.
    ///
    /// `name` is truncated to 31 bytes. The inputs stay valid and open.
    ///
    /// # Errors
    ///
    /// Returns the driver's OS error; no fence is created in that case.
    pub fn merge(&self, name: &str, fd1: RawFd, fd2: RawFd) -> SyncResult<RawFd> {
        fence::merge(self.driver.as_ref(), name, fd1, fd2)
    }

    /// Query the status and sub-fences of `fd`.
    ///
    /// # Errors
    ///
    /// Returns the OS error of either request, or
    /// [`SyncError::AllocationFailure`](crate::SyncError::AllocationFailure)
    /// if the sub-fence array cannot be allocated. Nothing is returned
    /// partially.
    pub fn query(&self, fd: RawFd) -> SyncResult<FenceInfo> {
        info::query(self.driver.as_ref(), fd)
    }

    /// Open a new software timeline at the configured device path.
    ///
    /// # Errors
    ///
    /// Returns the open error unchanged, e.g. `ENOENT` when the kernel was
    /// built without sw_sync.
    pub fn timeline_create(&self) -> SyncResult<RawFd> {
        timeline::create(self.driver.as_ref(), &self.config.timeline_path)
    }

    /// Advance the timeline behind `fd` by `count`, signaling every fence
    /// whose target value is reached.
    pub fn timeline_advance(&self, fd: RawFd, count: u32) -> SyncResult<()> {
        timeline::advance(self.driver.as_ref(), fd, count)
    }

    /// Create a fence that signals once the timeline behind `fd` reaches `value`.
    pub fn timeline_fence_create(&self, fd: RawFd, name: &str, value: u32) -> SyncResult<RawFd> {
        timeline::fence_create(self.driver.as_ref(), fd, name, value)
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("driver", &self.driver.name())
            .field("config", &self.config)
            .finish()
    }
}

static_assertions::assert_impl_all!(SyncContext: Send, Sync);
