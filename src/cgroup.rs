//! Cgroup v1 resource boundary: create, attach, stat, destroy.
//!
//! One boundary exists per run. Accounting files may vanish once the member
//! process is gone; `stat` reads those as zero rather than failing, because a
//! killed child routinely exits before the kernel samples its peak usage.

use crate::types::{Accounting, ResourceLimits, Result, RunnerError};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const CGROUP_BASE: &str = "/sys/fs/cgroup";
const CONTROLLERS: [&str; 3] = ["memory", "cpu", "cpuacct"];

/// Seam between the executor and the OS accounting facility.
///
/// Creation stays on the concrete type since each implementation constructs
/// differently; the executor only needs membership, accounting, and release.
pub trait ResourceBoundary {
    /// Adds `pid` as a member. Failure is fatal for the run: the child must
    /// not execute unaccounted.
    fn attach(&self, pid: u32) -> Result<()>;

    /// Reads cumulative CPU time and peak memory. Tolerates the member having
    /// already exited: a vanished or unparsable accounting file reads as zero.
    fn stat(&self) -> Accounting;

    /// Idempotent release of the boundary.
    fn destroy(&mut self);
}

/// Cgroup v1 boundary backed by one directory per controller.
pub struct CgroupBoundary {
    name: String,
    controller_paths: HashMap<String, PathBuf>,
    destroyed: bool,
}

impl CgroupBoundary {
    /// Creates `/sys/fs/cgroup/{memory,cpu,cpuacct}/<name>` and applies the
    /// given ceilings. A directory that already exists means another live
    /// boundary holds the name, which is an exclusive-use failure.
    pub fn create(name: &str, limits: &ResourceLimits) -> Result<Self> {
        if name.is_empty() || name.len() > 255 {
            return Err(RunnerError::BoundaryCreate(
                "invalid cgroup name length".to_string(),
            ));
        }
        let sanitized = name.replace('/', "_").replace("..", "_");

        if !Self::cgroups_available() {
            return Err(RunnerError::BoundaryCreate(
                "cgroup v1 controllers not mounted under /sys/fs/cgroup".to_string(),
            ));
        }

        let mut controller_paths = HashMap::new();
        for controller in CONTROLLERS {
            let path = Path::new(CGROUP_BASE).join(controller).join(&sanitized);
            // create_dir, not create_dir_all: an existing directory must
            // surface as AlreadyExists instead of being silently adopted.
            if let Err(e) = fs::create_dir(&path) {
                let msg = if e.kind() == std::io::ErrorKind::AlreadyExists {
                    format!("{} already in exclusive use", path.display())
                } else {
                    format!("failed to create {}: {}", path.display(), e)
                };
                // Roll back the controllers created so far.
                let mut partial = Self {
                    name: sanitized,
                    controller_paths,
                    destroyed: false,
                };
                partial.destroy();
                return Err(RunnerError::BoundaryCreate(msg));
            }
            controller_paths.insert(controller.to_string(), path);
        }

        let boundary = Self {
            name: sanitized,
            controller_paths,
            destroyed: false,
        };
        // On failure the boundary drops here, which removes the directories.
        boundary.apply_limits(limits)?;
        Ok(boundary)
    }

    fn apply_limits(&self, limits: &ResourceLimits) -> Result<()> {
        if let Some(bytes) = limits.memory_bytes {
            if bytes < 1024 * 1024 {
                return Err(RunnerError::BoundaryCreate(
                    "memory limit too small (minimum 1MB)".to_string(),
                ));
            }
            let memory_path = self.controller_path("memory")?;
            fs::write(memory_path.join("memory.limit_in_bytes"), bytes.to_string()).map_err(
                |e| RunnerError::BoundaryCreate(format!("failed to set memory limit: {}", e)),
            )?;
            // Memory+swap limit, where the kernel exposes it. Without this a
            // memory-capped child can spill into swap unbounded.
            let memsw_file = memory_path.join("memory.memsw.limit_in_bytes");
            if memsw_file.exists() {
                let _ = fs::write(&memsw_file, bytes.to_string());
            }
        }

        if let Some(shares) = limits.cpu_shares {
            if !(2..=262144).contains(&shares) {
                return Err(RunnerError::BoundaryCreate(format!(
                    "invalid CPU shares: {} (must be between 2 and 262144)",
                    shares
                )));
            }
            let cpu_path = self.controller_path("cpu")?;
            fs::write(cpu_path.join("cpu.shares"), shares.to_string()).map_err(|e| {
                RunnerError::BoundaryCreate(format!("failed to set CPU shares: {}", e))
            })?;
        }

        Ok(())
    }

    fn controller_path(&self, controller: &str) -> Result<&PathBuf> {
        self.controller_paths.get(controller).ok_or_else(|| {
            RunnerError::BoundaryCreate(format!("{} controller path not available", controller))
        })
    }

    pub fn cgroups_available() -> bool {
        Path::new("/proc/cgroups").exists()
            && Path::new(CGROUP_BASE).join("memory").exists()
            && Path::new(CGROUP_BASE).join("cpu").exists()
    }
}

/// Reads a single-value accounting file, treating a vanished or garbled file
/// as zero.
fn read_counter(path: &Path) -> u64 {
    fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

impl ResourceBoundary for CgroupBoundary {
    fn attach(&self, pid: u32) -> Result<()> {
        if pid == 0 {
            return Err(RunnerError::Attach("invalid pid: 0".to_string()));
        }
        if !Path::new(&format!("/proc/{}", pid)).exists() {
            return Err(RunnerError::Attach(format!("process {} does not exist", pid)));
        }

        for (controller, path) in &self.controller_paths {
            fs::write(path.join("tasks"), pid.to_string())
                .map_err(|e| RunnerError::Attach(format!("{}: {}", controller, e)))?;
        }
        Ok(())
    }

    fn stat(&self) -> Accounting {
        let cpu_time_ns = self
            .controller_paths
            .get("cpuacct")
            .map(|p| read_counter(&p.join("cpuacct.usage")))
            .unwrap_or(0);
        let memory_peak_bytes = self
            .controller_paths
            .get("memory")
            .map(|p| read_counter(&p.join("memory.max_usage_in_bytes")))
            .unwrap_or(0);

        Accounting {
            cpu_time_ns,
            memory_peak_bytes,
        }
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        for (controller, path) in &self.controller_paths {
            // Migrate any straggler back to the root group; an occupied
            // cgroup directory cannot be removed.
            if let Ok(tasks) = fs::read_to_string(path.join("tasks")) {
                for line in tasks.lines() {
                    if let Ok(pid) = line.trim().parse::<u32>() {
                        let root_tasks = Path::new(CGROUP_BASE).join(controller).join("tasks");
                        let _ = fs::write(&root_tasks, pid.to_string());
                    }
                }
            }
            if path.exists() {
                if let Err(e) = fs::remove_dir(path) {
                    log::warn!("failed to remove cgroup {}: {}", path.display(), e);
                }
            }
        }

        log::debug!("boundary {} destroyed", self.name);
    }
}

impl Drop for CgroupBoundary {
    fn drop(&mut self) {
        self.destroy();
    }
}
