//! sync-tool: inspect and exercise Linux sync fences.
//!
//! ```bash
//! # Merge three software timelines, signal them, and print the result
//! sudo sync-tool demo --leaves 3
//!
//! # Same without kernel access
//! sync-tool --driver dummy demo
//!
//! # Wait up to 100ms for a fence inherited as fd 3
//! sync-tool wait 3 --timeout-ms 100
//! ```

mod args;

use std::os::fd::RawFd;
use std::process::ExitCode;

use clap::Parser;
use redlilium_sync::{
    FenceInfo, FenceStatus, SyncConfig, SyncContext, SyncError, SyncResult, latest_timestamp,
    release,
};

use args::{Args, Command};

/// Exit code for a wait that timed out.
const EXIT_TIMEOUT: u8 = 2;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(SyncError::TimedOut) => {
            log::warn!("Timed out");
            ExitCode::from(EXIT_TIMEOUT)
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> SyncResult<()> {
    let mut config = SyncConfig::from_env()?;
    if let Some(driver) = args.driver {
        config = config.with_driver(driver.into());
    }
    if let Some(device) = &args.device {
        config = config.with_timeline_path(device);
    }

    redlilium_sync::init();
    let ctx = SyncContext::with_config(config)?;
    log::debug!("{ctx:?}");

    match args.command {
        Command::Wait { fd, timeout_ms } => {
            ctx.wait(fd, timeout_ms)?;
            println!("fence {fd} signaled");
            Ok(())
        }
        Command::Info { fd } => {
            let info = ctx.query(fd)?;
            print_info(fd, &info);
            release(Some(info));
            Ok(())
        }
        Command::Demo { leaves } => demo(&ctx, leaves),
    }
}

/// Merge one fence per timeline, advance every timeline, and report.
///
/// Descriptors are left to process exit.
fn demo(ctx: &SyncContext, leaves: u32) -> SyncResult<()> {
    let mut timelines = Vec::with_capacity(leaves as usize);
    let mut merged: Option<RawFd> = None;

    for i in 0..leaves {
        let timeline = ctx.timeline_create()?;
        let fence = ctx.timeline_fence_create(timeline, &format!("leaf_{i}"), 1)?;
        log::info!("Timeline {timeline}: fence {fence} at value 1");
        merged = Some(match merged {
            None => fence,
            Some(prev) => ctx.merge("demo", prev, fence)?,
        });
        timelines.push(timeline);
    }
    let Some(merged) = merged else {
        return Err(SyncError::InvalidArgument("no leaves".into()));
    };

    match ctx.wait(merged, 0) {
        Err(SyncError::TimedOut) => log::info!("Merged fence {merged} pending"),
        other => other?,
    }

    for &timeline in &timelines {
        ctx.timeline_advance(timeline, 1)?;
    }
    ctx.wait(merged, 1_000)?;
    log::info!("Merged fence {merged} signaled");

    let info = ctx.query(merged)?;
    print_info(merged, &info);
    release(Some(info));
    Ok(())
}

fn status_label(status: FenceStatus) -> String {
    match status {
        FenceStatus::Active => "active".to_string(),
        FenceStatus::Signaled => "signaled".to_string(),
        FenceStatus::Error(code) => format!("error {code}"),
    }
}

fn print_info(fd: RawFd, info: &FenceInfo) {
    println!(
        "fence {fd} {:?}: {}, {} sub-fences, latest timestamp {} ns",
        info.name(),
        status_label(info.status()),
        info.sub_fence_count(),
        latest_timestamp(info)
    );
    for (i, sub) in info.sub_fences().iter().enumerate() {
        println!(
            "  [{i}] {} ({}): {}, timestamp {} ns",
            sub.object_name(),
            sub.driver_name(),
            status_label(sub.status()),
            sub.timestamp_ns()
        );
    }
}
