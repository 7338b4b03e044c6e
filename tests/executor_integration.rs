//! End-to-end runs through the executor against a counting boundary double.
//!
//! These tests exercise the orchestration contract without root or mounted
//! cgroups: the double stands in for the kernel facility, so what is being
//! verified is ordering, teardown, and the shape of the result record.

use nix::unistd::{getgid, getuid};
use runbox::cgroup::ResourceBoundary;
use runbox::executor::run_command;
use runbox::types::{
    Accounting, CompletedCommand, ResourceLimits, Result, RunConfig, RunnerError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct MockBoundary {
    destroy_count: Arc<AtomicUsize>,
    fail_attach: bool,
    accounting: Accounting,
    destroyed: bool,
}

impl MockBoundary {
    fn new(destroy_count: Arc<AtomicUsize>) -> Self {
        Self {
            destroy_count,
            fail_attach: false,
            accounting: Accounting::default(),
            destroyed: false,
        }
    }
}

impl ResourceBoundary for MockBoundary {
    fn attach(&self, _pid: u32) -> Result<()> {
        if self.fail_attach {
            Err(RunnerError::Attach("boundary gone".to_string()))
        } else {
            Ok(())
        }
    }

    fn stat(&self) -> Accounting {
        self.accounting
    }

    fn destroy(&mut self) {
        if !self.destroyed {
            self.destroyed = true;
            self.destroy_count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MockBoundary {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn config(command: &[&str], timeout_ms: u64) -> RunConfig {
    RunConfig {
        command: command.iter().map(|s| s.to_string()).collect(),
        uid: getuid().as_raw(),
        gid: getgid().as_raw(),
        timeout: Duration::from_millis(timeout_ms),
        limits: ResourceLimits::default(),
    }
}

fn run(command: &[&str], timeout_ms: u64) -> (Result<CompletedCommand>, Arc<AtomicUsize>) {
    let destroys = Arc::new(AtomicUsize::new(0));
    let result = {
        let mut boundary = MockBoundary::new(destroys.clone());
        run_command(&config(command, timeout_ms), &mut boundary)
    };
    (result, destroys)
}

#[test]
fn true_exits_cleanly_within_the_deadline() {
    let (result, destroys) = run(&["true"], 1000);
    let result = result.expect("run should succeed");

    assert_eq!(result.return_code, 0);
    assert!(!result.timed_out);
    assert!(result.stdout.is_empty());
    assert!(result.stderr.is_empty());
    assert_eq!(destroys.load(Ordering::SeqCst), 1);
}

#[test]
fn exit_code_and_stdout_are_reported() {
    let (result, _) = run(&["sh", "-c", "echo hi; exit 3"], 1000);
    let result = result.expect("run should succeed");

    assert_eq!(result.return_code, 3);
    assert!(!result.timed_out);
    assert_eq!(result.stdout, b"hi\n");
}

#[test]
fn stderr_is_captured_separately() {
    let (result, _) = run(&["sh", "-c", "echo oops >&2"], 1000);
    let result = result.expect("run should succeed");

    assert!(result.stdout.is_empty());
    assert_eq!(result.stderr, b"oops\n");
}

#[test]
fn deadline_kills_a_long_running_command() {
    let start = Instant::now();
    let (result, destroys) = run(&["sleep", "5"], 1000);
    let elapsed = start.elapsed();
    let result = result.expect("run should succeed");

    assert!(result.timed_out);
    assert_eq!(result.return_code, 0, "timeout path fixes the code to 0");
    assert!(
        elapsed >= Duration::from_millis(900),
        "deadline fired early: {:?}",
        elapsed
    );
    assert!(
        elapsed < Duration::from_secs(3),
        "kill should not wait out the sleep: {:?}",
        elapsed
    );
    assert_eq!(destroys.load(Ordering::SeqCst), 1);
}

#[test]
fn output_before_the_kill_is_preserved() {
    let (result, _) = run(&["sh", "-c", "echo partial; sleep 5"], 500);
    let result = result.expect("run should succeed");

    assert!(result.timed_out);
    assert_eq!(result.stdout, b"partial\n");
}

#[test]
fn launch_failure_still_destroys_the_boundary() {
    let (result, destroys) = run(&["runbox-definitely-not-a-binary"], 1000);

    assert!(matches!(result, Err(RunnerError::Launch(_))));
    assert_eq!(destroys.load(Ordering::SeqCst), 1);
}

#[test]
fn attach_failure_kills_the_child_and_aborts() {
    let destroys = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();
    let result = {
        let mut boundary = MockBoundary::new(destroys.clone());
        boundary.fail_attach = true;
        run_command(&config(&["sleep", "5"], 1000), &mut boundary)
    };

    assert!(matches!(result, Err(RunnerError::Attach(_))));
    assert!(
        start.elapsed() < Duration::from_secs(3),
        "the child must be killed, not waited out"
    );
    assert_eq!(destroys.load(Ordering::SeqCst), 1);
}

#[test]
fn accounting_is_plumbed_into_the_result() {
    let destroys = Arc::new(AtomicUsize::new(0));
    let result = {
        let mut boundary = MockBoundary::new(destroys.clone());
        boundary.accounting = Accounting {
            cpu_time_ns: 123_456_789,
            memory_peak_bytes: 655_360,
        };
        run_command(&config(&["true"], 1000), &mut boundary)
    }
    .expect("run should succeed");

    assert_eq!(result.time, 123_456_789);
    assert_eq!(result.memory, 655_360);
}

/// Privilege de-escalation verified by effect: a child running under a
/// non-privileged identity cannot write to a root-owned location. Requires a
/// privileged executor, so it degrades to the OS-rejection check otherwise.
#[test]
fn deescalated_child_cannot_write_where_root_can() {
    if !getuid().is_root() {
        // Unprivileged executors cannot switch identity at all; the OS
        // rejecting the transition is the observable effect here.
        let destroys = Arc::new(AtomicUsize::new(0));
        let mut boundary = MockBoundary::new(destroys);
        let mut cfg = config(&["true"], 1000);
        cfg.uid = 0;
        cfg.gid = 0;
        let result = run_command(&cfg, &mut boundary);
        assert!(matches!(result, Err(RunnerError::Launch(_))));
        return;
    }

    let dir = tempfile::TempDir::new().expect("tempdir");
    let target = dir.path().join("root-only");
    std::fs::create_dir(&target).expect("mkdir");
    let mut perms = std::fs::metadata(&target).expect("meta").permissions();
    std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o700);
    std::fs::set_permissions(&target, perms).expect("chmod");

    let probe = format!("touch {}/denied", target.display());
    let destroys = Arc::new(AtomicUsize::new(0));
    let mut boundary = MockBoundary::new(destroys);
    let mut cfg = config(&["sh", "-c", &probe], 1000);
    // nobody: the conventional unprivileged identity
    let (uid, gid) = runbox::identity::resolve("nobody").expect("nobody must exist");
    cfg.uid = uid;
    cfg.gid = gid;

    let result = run_command(&cfg, &mut boundary).expect("run should succeed");
    assert_ne!(result.return_code, 0, "write into a 0700 root dir must fail");
    assert!(!target.join("denied").exists());
}
