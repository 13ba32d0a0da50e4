//! Sync configuration.

use std::path::{Path, PathBuf};

use crate::driver::DriverType;
use crate::error::{SyncError, SyncResult};

/// Default location of the software timeline device.
pub const SW_SYNC_DEVICE_PATH: &str = "/dev/sw_sync";

/// Location of the software timeline device on kernels that only expose it
/// through debugfs.
pub const SW_SYNC_DEBUGFS_PATH: &str = "/sys/kernel/debug/sync/sw_sync";

/// Environment variable selecting the driver (`kernel` or `dummy`).
pub const DRIVER_ENV: &str = "REDLILIUM_SYNC_DRIVER";

/// Environment variable overriding the software timeline device path.
pub const TIMELINE_PATH_ENV: &str = "REDLILIUM_SW_SYNC_PATH";

/// Configuration for a [`SyncContext`](crate::SyncContext).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Which driver executes requests.
    pub driver: DriverType,
    /// Device opened by `timeline_create`.
    pub timeline_path: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            driver: DriverType::Kernel,
            timeline_path: PathBuf::from(SW_SYNC_DEVICE_PATH),
        }
    }
}

impl SyncConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from the process environment.
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> SyncResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(name) = lookup(DRIVER_ENV) {
            config.driver = DriverType::from_name(&name).ok_or_else(|| {
                SyncError::InvalidArgument(format!("{DRIVER_ENV}: unknown driver {name:?}"))
            })?;
        }
        if let Some(path) = lookup(TIMELINE_PATH_ENV)
            && !path.is_empty()
        {
            config.timeline_path = PathBuf::from(path);
        }

        Ok(config)
    }

    /// Set the driver.
    pub fn with_driver(mut self, driver: DriverType) -> Self {
        self.driver = driver;
        self
    }

    /// Set the software timeline device path.
    pub fn with_timeline_path(mut self, path: impl AsRef<Path>) -> Self {
        self.timeline_path = path.as_ref().to_path_buf();
        self
    }
}
