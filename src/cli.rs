//! Invocation boundary: argument parsing, logging setup, and run wiring.

use crate::cgroup::{CgroupBoundary, ResourceBoundary};
use crate::executor;
use crate::identity;
use crate::report;
use crate::types::{ResourceLimits, RunConfig};
use anyhow::Context;
use clap::Parser;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about = "Single-shot sandboxed process executor", long_about = None)]
struct Cli {
    /// Wall-clock deadline in milliseconds
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,
    /// Memory ceiling in bytes (host default when omitted)
    #[arg(long)]
    memory: Option<u64>,
    /// CPU share weight (host default when omitted)
    #[arg(long)]
    cpu_shares: Option<u64>,
    /// Principal to run the command as (defaults to $SUDO_USER)
    #[arg(long)]
    user: Option<String>,
    /// Command and arguments to execute
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

pub fn run() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if cli.command.is_empty() {
        eprintln!("usage: runbox [OPTIONS] <command> [args...]");
        std::process::exit(1);
    }

    // Identity resolves before anything exists that would need tearing down.
    let principal = cli
        .user
        .or_else(|| std::env::var("SUDO_USER").ok())
        .context("no principal to run as: pass --user or invoke via sudo")?;
    let (uid, gid) = identity::resolve(&principal)?;
    log::info!("running as {} (uid={}, gid={})", principal, uid, gid);

    let config = RunConfig {
        command: cli.command,
        uid,
        gid,
        timeout: Duration::from_millis(cli.timeout_ms),
        limits: ResourceLimits {
            cpu_shares: cli.cpu_shares,
            memory_bytes: cli.memory,
        },
    };

    // One boundary per run; the uuid suffix keeps concurrent invocations from
    // colliding on the group path.
    let boundary_name = format!("runbox-{}", uuid::Uuid::new_v4().simple());
    let mut boundary = CgroupBoundary::create(&boundary_name, &config.limits)?;

    // On error the boundary drops here, which destroys the group.
    let result = executor::run_command(&config, &mut boundary)?;
    boundary.destroy();

    log::info!("return_code: {}", result.return_code);
    log::info!("time: {}", result.time);
    log::info!("memory: {}", result.memory);
    log::info!("stdout: {}", String::from_utf8_lossy(&result.stdout));
    log::info!("stderr: {}", String::from_utf8_lossy(&result.stderr));
    log::info!("timed_out: {}", result.timed_out);

    report::emit(&result, &mut std::io::stdout().lock())?;
    Ok(())
}
