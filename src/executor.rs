//! Orchestration of one sandboxed run: launch, attach, supervise, account.

use crate::cgroup::ResourceBoundary;
use crate::launcher;
use crate::report;
use crate::supervisor;
use crate::types::{CompletedCommand, ExitOutcome, Result, RunConfig};
use std::time::Instant;

/// Runs one command to completion inside `boundary` and assembles the result.
///
/// Ordering is load-bearing: the pid is attached before supervision begins,
/// so accounting covers the run minus the single syscall gap between spawn
/// and attach, and `stat` is read only after the exit outcome is final.
///
/// The boundary stays owned by the caller. Every error path propagates, so
/// the owner's scope releases it regardless of where the run failed.
pub fn run_command(
    config: &RunConfig,
    boundary: &mut dyn ResourceBoundary,
) -> Result<CompletedCommand> {
    let start = Instant::now();

    let handle = launcher::launch(&config.command, config.uid, config.gid)?;
    log::info!("pid: {}", handle.pid);

    if let Err(e) = boundary.attach(handle.pid) {
        // The child must not run unaccounted: kill and reap before aborting.
        handle.kill();
        handle.reap();
        return Err(e);
    }

    let supervised = supervisor::supervise(handle, config.timeout)?;
    match supervised.outcome {
        ExitOutcome::Completed { .. } => log::info!("status: done in {:?}", start.elapsed()),
        ExitOutcome::TimedOut => log::info!("status: timeout in {:?}", start.elapsed()),
    }

    // Reading earlier would under-report while the child still ran.
    let accounting = boundary.stat();

    Ok(report::assemble(supervised, accounting))
}
