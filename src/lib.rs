//! runbox: a single-shot sandboxed process executor
//!
//! Given one command, runbox runs it inside a cgroup-accounted boundary under
//! a de-escalated identity, races its completion against a wall-clock
//! deadline, and reports exactly one [`types::CompletedCommand`] record over
//! a msgpack transport on stdout.
//!
//! # Architecture
//!
//! - [`cgroup`]: resource boundary lifecycle (create, attach, stat, destroy)
//! - [`identity`]: principal name to numeric (uid, gid)
//! - [`launcher`]: child spawn with credential drop and piped capture
//! - [`supervisor`]: completion-vs-deadline race with guaranteed reaping
//! - [`report`]: result assembly and the msgpack transport
//! - [`executor`]: per-run orchestration
//! - [`cli`]: invocation boundary used by the `runbox` binary
//!
//! # Design notes
//!
//! Each invocation owns its boundary for the boundary's entire lifetime;
//! destruction runs exactly once on every exit path (explicit on success,
//! `Drop` on failure). The deadline race preserves the one-shot contract:
//! a single background wait reports once through a capacity-1 channel, the
//! first event wins, and the loser is drained rather than discarded.

pub mod cgroup;
pub mod cli;
pub mod executor;
pub mod identity;
pub mod launcher;
pub mod report;
pub mod supervisor;
pub mod types;

// Re-export commonly used types for convenience
pub use types::*;
