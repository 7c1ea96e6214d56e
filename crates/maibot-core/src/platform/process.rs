//! Platform-specific process management.
//!
//! Liveness checks, termination of launched consoles and their children, and
//! lookups of external services (NapCat, MongoDB) by executable name.

use crate::error::{LauncherError, Result};
use std::process::Command;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{debug, warn};

/// Check if a process with the given PID is alive.
///
/// # Platform Behavior
/// - **Linux/macOS**: `kill(pid, 0)`
/// - **Windows**: `OpenProcess` with `PROCESS_QUERY_LIMITED_INFORMATION`
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        match kill(Pid::from_raw(raw), None) {
            Ok(()) => true,
            // Exists but owned by another user
            Err(nix::errno::Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    #[cfg(windows)]
    {
        is_process_alive_windows(pid)
    }

    #[cfg(not(any(unix, windows)))]
    {
        warn!("Process alive check not implemented for this platform");
        true
    }
}

#[cfg(windows)]
#[allow(unsafe_code)]
fn is_process_alive_windows(pid: u32) -> bool {
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

    // SAFETY: OpenProcess has no preconditions; the handle is closed before returning.
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle.is_null() {
            false
        } else {
            CloseHandle(handle);
            true
        }
    }
}

/// Terminate a single process, gracefully first.
///
/// Returns `true` if the process is gone (or was never running).
pub fn terminate_process(pid: u32, timeout_ms: u64) -> Result<bool> {
    if !is_process_alive(pid) {
        debug!("Process {} is not running", pid);
        return Ok(true);
    }

    #[cfg(unix)]
    {
        terminate_unix(pid, timeout_ms)
    }

    #[cfg(windows)]
    {
        let _ = timeout_ms;
        taskkill(pid, false)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = timeout_ms;
        Err(LauncherError::UnsupportedPlatform {
            feature: "process termination".into(),
        })
    }
}

/// Terminate a process together with the console it owns.
///
/// # Platform Behavior
/// - **Linux/macOS**: SIGTERM to the process group, then SIGKILL after `timeout_ms`
/// - **Windows**: `taskkill /F /T`
pub fn terminate_process_tree(pid: u32, timeout_ms: u64) -> Result<bool> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::{getpgid, Pid};

        if !is_process_alive(pid) {
            reap(pid);
            return Ok(true);
        }

        let nix_pid = Pid::from_raw(pid as i32);
        // Launched children call setsid, so they lead their own group.
        let leads_group = getpgid(Some(nix_pid)).map(|pgid| pgid == nix_pid).unwrap_or(false);
        if leads_group {
            debug!("Sending SIGTERM to process group {}", pid);
            if let Err(e) = killpg(nix_pid, Signal::SIGTERM) {
                debug!("killpg({}) failed: {}", pid, e);
            }
        }
        terminate_unix(pid, timeout_ms)?;
        if leads_group {
            let _ = killpg(nix_pid, Signal::SIGKILL);
        }
        Ok(!is_process_alive(pid))
    }

    #[cfg(windows)]
    {
        let _ = timeout_ms;
        taskkill(pid, true)
    }

    #[cfg(not(any(unix, windows)))]
    {
        terminate_process(pid, timeout_ms)
    }
}

#[cfg(unix)]
fn reap(pid: u32) {
    use nix::sys::wait::{waitpid, WaitPidFlag};
    use nix::unistd::Pid;

    match waitpid(Pid::from_raw(pid as i32), Some(WaitPidFlag::WNOHANG)) {
        Ok(status) => debug!("Reaped process {}: {:?}", pid, status),
        Err(nix::errno::Errno::ECHILD) => {}
        Err(e) => debug!("waitpid({}) failed: {}", pid, e),
    }
}

#[cfg(unix)]
fn terminate_unix(pid: u32, timeout_ms: u64) -> Result<bool> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    use std::thread::sleep;
    use std::time::Duration;

    let nix_pid = Pid::from_raw(pid as i32);

    debug!("Sending SIGTERM to process {}", pid);
    if let Err(e) = kill(nix_pid, Signal::SIGTERM) {
        if e == nix::errno::Errno::ESRCH {
            return Ok(true);
        }
        warn!("Failed to send SIGTERM to {}: {}", pid, e);
    }

    let wait_interval = Duration::from_millis(100);
    for _ in 0..(timeout_ms / 100).max(1) {
        sleep(wait_interval);
        reap(pid);
        if !is_process_alive(pid) {
            debug!("Process {} terminated gracefully", pid);
            return Ok(true);
        }
    }

    debug!("Process {} still running, sending SIGKILL", pid);
    if let Err(e) = kill(nix_pid, Signal::SIGKILL) {
        if e == nix::errno::Errno::ESRCH {
            return Ok(true);
        }
        return Err(LauncherError::Other(format!(
            "Failed to kill process {}: {}",
            pid, e
        )));
    }

    sleep(wait_interval);
    reap(pid);
    Ok(!is_process_alive(pid))
}

#[cfg(windows)]
fn taskkill(pid: u32, tree: bool) -> Result<bool> {
    let pid_arg = pid.to_string();
    let mut args = vec!["/PID", pid_arg.as_str(), "/F"];
    if tree {
        args.push("/T");
    }

    debug!("Terminating process {} with taskkill", pid);
    let output = Command::new("taskkill")
        .args(&args)
        .output()
        .map_err(|e| LauncherError::Other(format!("Failed to run taskkill: {}", e)))?;

    if output.status.success() {
        return Ok(true);
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.contains("not found") || stderr.contains("not running") {
        Ok(true)
    } else {
        warn!("taskkill failed for {}: {}", pid, stderr);
        Ok(false)
    }
}

/// Scan for processes whose command line contains `pattern` (case-insensitive).
///
/// Returns `(pid, cmdline)` pairs.
pub fn find_processes_by_cmdline(pattern: &str) -> Vec<(u32, String)> {
    let pattern = pattern.to_lowercase();
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::new().with_cmd(sysinfo::UpdateKind::OnlyIfNotSet),
    );

    let mut found: Vec<(u32, String)> = system
        .processes()
        .iter()
        .filter_map(|(pid, process)| {
            let cmdline = process
                .cmd()
                .iter()
                .map(|part| part.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ");
            if cmdline.to_lowercase().contains(&pattern) {
                Some((pid.as_u32(), cmdline))
            } else {
                None
            }
        })
        .collect();
    found.sort_by_key(|(pid, _)| *pid);
    found
}

/// PIDs of processes whose executable name matches `name`.
///
/// The comparison is case-insensitive and ignores a trailing `.exe`, so
/// `mongod` also matches `mongod.exe`.
pub fn find_processes_by_name(name: &str) -> Vec<u32> {
    let wanted = strip_exe(&name.to_lowercase()).to_string();
    let mut system = System::new();
    system.refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::new());

    let mut pids: Vec<u32> = system
        .processes()
        .iter()
        .filter(|(_, process)| {
            let name = process.name().to_string_lossy().to_lowercase();
            strip_exe(&name) == wanted
        })
        .map(|(pid, _)| pid.as_u32())
        .collect();
    pids.sort_unstable();
    pids
}

fn strip_exe(name: &str) -> &str {
    name.strip_suffix(".exe").unwrap_or(name)
}

/// True if any process with the given executable name is running.
pub fn is_process_running(name: &str) -> bool {
    let running = !find_processes_by_name(name).is_empty();
    debug!("Process {} running: {}", name, running);
    running
}

fn command_stdout_contains(program: &str, args: &[&str], needle: &str) -> bool {
    match Command::new(program).args(args).output() {
        Ok(output) => String::from_utf8_lossy(&output.stdout).contains(needle),
        Err(e) => {
            debug!("Failed to run {}: {}", program, e);
            false
        }
    }
}

/// Whether a MongoDB server is up, as a service or as a plain process.
pub fn is_mongodb_running() -> bool {
    if cfg!(windows) {
        if command_stdout_contains("sc", &["query", "MongoDB"], "RUNNING") {
            return true;
        }
    } else {
        for unit in ["mongod", "mongodb"] {
            let active = Command::new("systemctl")
                .args(["is-active", "--quiet", unit])
                .status()
                .map(|s| s.success())
                .unwrap_or(false);
            if active {
                return true;
            }
        }
    }
    is_process_running("mongod")
}
