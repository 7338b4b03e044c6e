//! Deadline supervision: race natural completion against a wall-clock
//! timeout, kill on expiry, and always yield a reaped exit status.

use crate::launcher::{kill_pid, ChildHandle};
use crate::types::{ExitOutcome, Result, RunnerError};
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// Outcome plus the captured output, finalized only after the child exited.
pub struct Supervised {
    pub outcome: ExitOutcome,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Races the child's completion against `timeout`. Exactly one of
/// `Completed`/`TimedOut` fires; either way the child is reaped and the
/// output buffers are sealed before returning.
pub fn supervise(handle: ChildHandle, timeout: Duration) -> Result<Supervised> {
    let ChildHandle {
        pid,
        mut child,
        stdout_reader,
        stderr_reader,
    } = handle;

    // Capacity 1 so the background sender is never blocked delivering to a
    // receiver that already moved on; the timeout path drains it later.
    let (status_tx, status_rx) = mpsc::sync_channel::<std::io::Result<ExitStatus>>(1);
    thread::spawn(move || {
        let _ = status_tx.send(child.wait());
    });

    let outcome = match status_rx.recv_timeout(timeout) {
        Ok(status) => {
            let status =
                status.map_err(|e| RunnerError::Process(format!("wait failed: {}", e)))?;
            ExitOutcome::Completed {
                return_code: exit_code(status),
            }
        }
        Err(RecvTimeoutError::Timeout) => {
            kill_pid(pid);
            // Killing does not bypass reaping: drain the real exit status so
            // the wait thread finishes and no zombie is left behind. The code
            // it carries is not surfaced to the caller.
            let status = status_rx.recv().map_err(|_| {
                RunnerError::Process("wait thread exited without reporting a status".to_string())
            })?;
            status.map_err(|e| RunnerError::Process(format!("wait after kill failed: {}", e)))?;
            ExitOutcome::TimedOut
        }
        Err(RecvTimeoutError::Disconnected) => {
            return Err(RunnerError::Process(
                "wait thread exited without reporting a status".to_string(),
            ));
        }
    };

    // The pipes hit EOF once the child is gone; joining only now keeps the
    // buffers single-owner for as long as the child could still write.
    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();

    Ok(Supervised {
        outcome,
        stdout,
        stderr,
    })
}

/// Signal deaths map to the shell convention (128 + signal) so a natural
/// non-zero exit and a signal exit stay distinguishable.
fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}
