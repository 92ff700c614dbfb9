/// Worker process hygiene
///
/// Applied to every worker spawned for process isolation:
/// - cleared environment (only logging configuration survives)
/// - own process group, so a timeout kill reaches anything the worker started
/// - core dumps disabled, CPU and address-space backstops
/// - parent death signal, so an aborted host never leaves a runaway worker
///
/// These are resource and crash boundaries. The worker still runs as the
/// invoking user; nothing here is a hardened security boundary.
use crate::config::types::SandboxConfig;
use std::os::unix::process::CommandExt;
use std::process::Command;

/// Environment variables copied into the worker
const PRESERVED_ENV: &[&str] = &["RUST_LOG", "RUST_LOG_STYLE"];

#[cfg(all(target_os = "linux", target_env = "gnu"))]
type RlimitResource = libc::__rlimit_resource_t;
#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
type RlimitResource = libc::c_int;

/// Kernel-enforced limits for one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerLimits {
    /// RLIMIT_AS in bytes
    pub address_space: Option<u64>,
    /// RLIMIT_CPU in seconds; a backstop behind the wall-clock kill
    pub cpu_seconds: u64,
}

impl WorkerLimits {
    pub fn from_config(config: &SandboxConfig) -> Self {
        let timeout_secs = config.timeout_ms.div_ceil(1000);
        Self {
            address_space: config.memory_limit_bytes,
            cpu_seconds: timeout_secs + 1,
        }
    }
}

/// Prepare `cmd` to launch a worker under `limits`.
pub fn configure_worker_command(cmd: &mut Command, limits: WorkerLimits) {
    cmd.env_clear();
    for key in PRESERVED_ENV {
        if let Ok(value) = std::env::var(key) {
            cmd.env(key, value);
        }
    }

    cmd.process_group(0);

    // SAFETY: the hook only calls async-signal-safe libc functions
    // (getrlimit/setrlimit/prctl) and allocates nothing.
    unsafe {
        cmd.pre_exec(move || apply_worker_limits(limits));
    }
}

/// Runs in the forked child between fork and exec.
fn apply_worker_limits(limits: WorkerLimits) -> std::io::Result<()> {
    lower_rlimit(libc::RLIMIT_CORE, 0)?;
    lower_rlimit(libc::RLIMIT_CPU, limits.cpu_seconds)?;
    if let Some(bytes) = limits.address_space {
        lower_rlimit(libc::RLIMIT_AS, bytes)?;
    }

    #[cfg(target_os = "linux")]
    {
        let rc = unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL as libc::c_ulong) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }

    Ok(())
}

/// Lower soft and hard limits to `value`, never raising an existing hard limit.
fn lower_rlimit(resource: RlimitResource, value: u64) -> std::io::Result<()> {
    let mut current = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    if unsafe { libc::getrlimit(resource, &mut current) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    let wanted = value as libc::rlim_t;
    let hard = if current.rlim_max < wanted {
        current.rlim_max
    } else {
        wanted
    };
    let limit = libc::rlimit {
        rlim_cur: hard,
        rlim_max: hard,
    };
    if unsafe { libc::setrlimit(resource, &limit) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}
