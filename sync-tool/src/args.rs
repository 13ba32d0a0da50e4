//! Command line arguments.

use std::os::fd::RawFd;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use redlilium_sync::DriverType;

/// Sync driver selection for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CliDriver {
    /// The kernel's sync_file and sw_sync drivers.
    #[default]
    Kernel,
    /// In-process simulation, no kernel access.
    Dummy,
}

impl From<CliDriver> for DriverType {
    fn from(cli: CliDriver) -> Self {
        match cli {
            CliDriver::Kernel => DriverType::Kernel,
            CliDriver::Dummy => DriverType::Dummy,
        }
    }
}

/// Inspect and exercise Linux sync fences.
#[derive(Parser, Debug)]
#[command(
    name = "sync-tool",
    version,
    about = "Inspect and exercise Linux sync fences",
    long_about = "Inspect and exercise Linux sync fences.\n\n\
        Fence descriptors are passed as numbers and must be inherited from the\n\
        calling process, e.g. `sync-tool info 3 3<&$FENCE`.\n\n\
        The driver and device default to REDLILIUM_SYNC_DRIVER and\n\
        REDLILIUM_SW_SYNC_PATH when set."
)]
pub struct Args {
    /// Sync driver to use.
    #[arg(long, value_enum)]
    pub driver: Option<CliDriver>,

    /// Path of the sw_sync device used to create timelines.
    #[arg(long, value_name = "PATH")]
    pub device: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Wait for a fence to signal. Exits with 2 on timeout.
    Wait {
        /// Fence descriptor.
        fd: RawFd,
        /// Timeout in milliseconds; negative waits forever.
        #[arg(long, short, default_value_t = -1, allow_negative_numbers = true)]
        timeout_ms: i32,
    },
    /// Print the status and sub-fences of a fence.
    Info {
        /// Fence descriptor.
        fd: RawFd,
    },
    /// Build a merged fence over software timelines, signal it, and report it.
    Demo {
        /// Number of timelines to merge.
        #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..=64))]
        leaves: u32,
    },
}
