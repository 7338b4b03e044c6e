/// Core types and structures for the runbox executor
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Optional resource ceilings applied to the boundary at creation.
/// An absent field keeps the host default.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// CPU share weight (cgroup v1 `cpu.shares`, valid range 2..=262144)
    pub cpu_shares: Option<u64>,
    /// Memory ceiling in bytes (`memory.limit_in_bytes`)
    pub memory_bytes: Option<u64>,
}

/// Everything one invocation needs: the command, the identity to run it as,
/// the wall-clock deadline, and the ceilings to plumb into the boundary.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Command and arguments to execute
    pub command: Vec<String>,
    /// User ID the child runs as
    pub uid: u32,
    /// Group ID the child runs as
    pub gid: u32,
    /// Wall-clock deadline for the run
    pub timeout: Duration,
    /// Resource ceilings for the boundary
    pub limits: ResourceLimits,
}

/// Cumulative accounting sampled from a resource boundary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Accounting {
    /// Accumulated CPU time in nanoseconds
    pub cpu_time_ns: u64,
    /// Peak resident bytes observed by the boundary
    pub memory_peak_bytes: u64,
}

/// Terminal outcome of the deadline race. Exactly one per run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The child exited on its own before the deadline
    Completed { return_code: i32 },
    /// The deadline elapsed first and the child was killed
    TimedOut,
}

/// The immutable result record, produced exactly once per invocation.
///
/// `memory` is known to read as zero when the child was killed before the
/// boundary could sample it. That is documented boundary behavior, not a
/// failure to be patched over.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedCommand {
    /// Meaningful only when `timed_out` is false; fixed to 0 on the timeout path
    pub return_code: i32,
    /// Captured standard output, untruncated
    #[serde(with = "serde_bytes")]
    pub stdout: Vec<u8>,
    /// Captured standard error, untruncated
    #[serde(with = "serde_bytes")]
    pub stderr: Vec<u8>,
    /// Whether the child was killed for exceeding its deadline
    pub timed_out: bool,
    /// Accumulated CPU time in nanoseconds, boundary-scoped
    pub time: u64,
    /// Peak resident bytes observed by the boundary
    pub memory: u64,
}

/// Custom error types for runbox
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("identity resolution failed: {0}")]
    Identity(String),

    #[error("boundary create failed: {0}")]
    BoundaryCreate(String),

    #[error("boundary attach failed: {0}")]
    Attach(String),

    #[error("launch failed: {0}")]
    Launch(String),

    #[error("process error: {0}")]
    Process(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("result encoding failed: {0}")]
    Encode(String),
}

/// Result type alias for runbox operations
pub type Result<T> = std::result::Result<T, RunnerError>;
