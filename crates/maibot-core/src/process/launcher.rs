//! Process launching functionality.

use crate::error::{LauncherError, Result};
use crate::platform::{self, TerminalCommand, TerminalKind};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use tracing::{debug, error, info, warn};

// Platform-specific imports for process detachment
#[cfg(unix)]
use std::os::unix::process::CommandExt;

#[cfg(windows)]
use std::os::windows::process::CommandExt;

/// Configuration for launching a shell command in its own console.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Window title, also used to label the process in status views.
    pub title: String,
    /// Shell command line.
    pub command: String,
    /// Working directory.
    pub cwd: PathBuf,
    /// Environment variables to set.
    pub env_vars: HashMap<String, String>,
    /// Output file when no console window is available.
    pub log_file: Option<PathBuf>,
    /// Path to write the PID file.
    pub pid_file: Option<PathBuf>,
}

impl LaunchConfig {
    pub fn new(
        title: impl Into<String>,
        command: impl Into<String>,
        cwd: impl AsRef<Path>,
    ) -> Self {
        Self {
            title: title.into(),
            command: command.into(),
            cwd: cwd.as_ref().to_path_buf(),
            env_vars: HashMap::new(),
            log_file: None,
            pid_file: None,
        }
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    /// Set the log file path.
    pub fn with_log_file(mut self, path: impl AsRef<Path>) -> Self {
        self.log_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the PID file path.
    pub fn with_pid_file(mut self, path: impl AsRef<Path>) -> Self {
        self.pid_file = Some(path.as_ref().to_path_buf());
        self
    }
}

/// Result of launching a process.
#[derive(Debug)]
pub struct LaunchResult {
    /// Whether the launch was successful.
    pub success: bool,
    /// The child process (if launched successfully).
    pub process: Option<Child>,
    /// PID of the child.
    pub pid: Option<u32>,
    /// Path to the log file, for background launches.
    pub log_path: Option<PathBuf>,
    /// Error message (if failed).
    pub error: Option<String>,
}

impl LaunchResult {
    fn failed(error: String, log_path: Option<PathBuf>) -> Self {
        Self {
            success: false,
            process: None,
            pid: None,
            log_path,
            error: Some(error),
        }
    }
}

/// Spawns detached console windows.
pub struct ProcessLauncher;

impl ProcessLauncher {
    /// Launch with the terminal detected for this machine.
    pub fn launch(config: &LaunchConfig) -> Result<LaunchResult> {
        Self::launch_with(config, TerminalKind::detect())
    }

    /// Launch using a specific terminal host.
    pub fn launch_with(config: &LaunchConfig, kind: TerminalKind) -> Result<LaunchResult> {
        if !config.cwd.is_dir() {
            return Ok(LaunchResult::failed(
                format!("Working directory not found: {}", config.cwd.display()),
                None,
            ));
        }

        let terminal = TerminalCommand::for_kind(kind, &config.title, &config.command, &config.cwd);
        let mut cmd = terminal.to_command();
        cmd.current_dir(&config.cwd);

        for (key, value) in &config.env_vars {
            cmd.env(key, value);
        }

        let log_path = if terminal.is_background() {
            config.log_file.clone()
        } else {
            None
        };
        if let Some(ref log_file) = log_path {
            if let Some(parent) = log_file.parent() {
                fs::create_dir_all(parent).ok();
            }
            let file = fs::File::create(log_file)
                .map_err(|e| LauncherError::io_with_path(e, log_file))?;
            let stdout_file = file
                .try_clone()
                .map_err(|e| LauncherError::io_with_path(e, log_file))?;
            cmd.stdout(Stdio::from(stdout_file));
            cmd.stderr(Stdio::from(file));
        } else {
            cmd.stdout(Stdio::null());
            cmd.stderr(Stdio::null());
        }
        cmd.stdin(Stdio::null());

        Self::detach(&mut cmd, &terminal.kind);

        info!(
            "Launching {} in {}: {}",
            config.title,
            config.cwd.display(),
            config.command
        );

        let child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to spawn {}: {}", config.title, e);
                return Ok(LaunchResult::failed(
                    format!("Failed to spawn process: {}", e),
                    log_path,
                ));
            }
        };

        let pid = child.id();
        if let Some(ref pid_file) = config.pid_file {
            if let Err(e) = fs::write(pid_file, pid.to_string()) {
                warn!("Failed to write PID file: {}", e);
            }
        }

        info!("Launched {} with PID {}", config.title, pid);

        Ok(LaunchResult {
            success: true,
            process: Some(child),
            pid: Some(pid),
            log_path,
            error: None,
        })
    }

    /// Put the child in its own session so Ctrl+C in the launcher does not reach it.
    #[cfg(unix)]
    #[allow(unsafe_code)]
    fn detach(cmd: &mut std::process::Command, _kind: &TerminalKind) {
        // SAFETY: setsid() is async-signal-safe and touches no parent state.
        unsafe {
            cmd.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    #[cfg(windows)]
    fn detach(cmd: &mut std::process::Command, kind: &TerminalKind) {
        const CREATE_NEW_CONSOLE: u32 = 0x00000010;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
        const CREATE_NO_WINDOW: u32 = 0x08000000;

        let console = if *kind == TerminalKind::Background {
            CREATE_NO_WINDOW
        } else {
            CREATE_NEW_CONSOLE
        };
        cmd.creation_flags(console | CREATE_NEW_PROCESS_GROUP);
    }

    #[cfg(not(any(unix, windows)))]
    fn detach(_cmd: &mut std::process::Command, _kind: &TerminalKind) {}

    /// Stop a process and everything in its console.
    pub fn stop_process(pid: u32, timeout_ms: u64) -> Result<bool> {
        info!("Stopping process {} (timeout: {}ms)", pid, timeout_ms);
        platform::terminate_process_tree(pid, timeout_ms)
    }

    /// Stop all processes matching a pattern in their command line.
    ///
    /// Returns the number of processes that were stopped.
    pub fn stop_processes_by_pattern(pattern: &str, timeout_ms: u64) -> Result<u32> {
        let own_pid = std::process::id();
        let mut stopped = 0;

        for (pid, cmdline) in platform::find_processes_by_cmdline(pattern) {
            if pid == own_pid {
                continue;
            }
            debug!("Found process {} matching '{}': {}", pid, pattern, cmdline);
            if platform::terminate_process(pid, timeout_ms)? {
                info!("Stopped process {} (matched pattern '{}')", pid, pattern);
                stopped += 1;
            }
        }

        Ok(stopped)
    }

    /// Remove a PID file.
    pub fn remove_pid_file(pid_file: &Path) -> Result<()> {
        if pid_file.exists() {
            fs::remove_file(pid_file).map_err(|e| LauncherError::io_with_path(e, pid_file))?;
        }
        Ok(())
    }
}
