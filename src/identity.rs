//! Identity collaborator: principal name to numeric (uid, gid).

use crate::types::{Result, RunnerError};
use nix::unistd::User;

/// Resolves a principal to the (uid, gid) pair the child must run as.
///
/// Failure here aborts the whole run before any boundary or process is
/// created, so the caller never has anything to tear down.
pub fn resolve(principal: &str) -> Result<(u32, u32)> {
    let user = User::from_name(principal)
        .map_err(|e| RunnerError::Identity(format!("lookup for {:?} failed: {}", principal, e)))?
        .ok_or_else(|| RunnerError::Identity(format!("unknown user {:?}", principal)))?;

    Ok((user.uid.as_raw(), user.gid.as_raw()))
}
