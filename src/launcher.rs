//! Child process launch: credential de-escalation and piped output capture.

use crate::types::{Result, RunnerError};
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};

/// Handle to a launched child: its pid, the waitable process, and the reader
/// threads that own the output buffers exclusively until the child exits.
pub struct ChildHandle {
    pub pid: u32,
    pub(crate) child: Child,
    pub(crate) stdout_reader: JoinHandle<Vec<u8>>,
    pub(crate) stderr_reader: JoinHandle<Vec<u8>>,
}

/// Starts `argv[0]` with the remaining arguments, running as (uid, gid)
/// instead of the invoking identity. Stdin is nulled; stdout and stderr are
/// drained into private in-memory buffers.
pub fn launch(argv: &[String], uid: u32, gid: u32) -> Result<ChildHandle> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| RunnerError::Config("empty command".to_string()))?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // Runs after fork, before exec: only async-signal-safe calls, hence raw
    // libc instead of the std wrappers.
    unsafe {
        cmd.pre_exec(move || {
            if libc::setgroups(0, std::ptr::null()) != 0 {
                let err = std::io::Error::last_os_error();
                // An unprivileged executor cannot touch supplementary groups,
                // but it also cannot change uid, so there is nothing to strip.
                if err.raw_os_error() != Some(libc::EPERM) {
                    return Err(err);
                }
            }
            // GID must change before UID: once the UID drops, setresgid is no
            // longer permitted.
            if libc::setresgid(gid, gid, gid) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            if libc::setresuid(uid, uid, uid) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| RunnerError::Launch(format!("failed to start {:?}: {}", program, e)))?;
    let pid = child.id();

    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    Ok(ChildHandle {
        pid,
        child,
        stdout_reader,
        stderr_reader,
    })
}

fn spawn_reader<R: Read + Send + 'static>(stream: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut stream) = stream {
            let _ = stream.read_to_end(&mut buffer);
        }
        buffer
    })
}

impl ChildHandle {
    /// Best-effort SIGKILL. Killing an already-exited process is a no-op
    /// outcome, not a fault.
    pub fn kill(&self) {
        kill_pid(self.pid);
    }

    /// Consumes the handle and reaps the child so no zombie outlives an
    /// aborted run. Used on fatal paths after launch.
    pub(crate) fn reap(mut self) {
        let _ = self.child.wait();
        let _ = self.stdout_reader.join();
        let _ = self.stderr_reader.join();
    }
}

pub(crate) fn kill_pid(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
}
