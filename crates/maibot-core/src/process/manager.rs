//! Tracking of every console the launcher has opened.

use super::launcher::{LaunchConfig, LaunchResult, ProcessLauncher};
use crate::config::InstallationConfig;
use crate::error::{LauncherError, Result};
use crate::platform::TerminalKind;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// A child the launcher started and still owns.
#[derive(Debug)]
pub struct TrackedProcess {
    pub title: String,
    pub command: String,
    pub cwd: PathBuf,
    pub pid: u32,
    pub started_at: DateTime<Local>,
    pub child: Child,
}

/// Snapshot of a tracked process for status views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub title: String,
    pub pid: u32,
    pub cwd: PathBuf,
    pub command: String,
    pub runtime_secs: i64,
    pub running: bool,
}

/// Owns launched children and stops them on request or on drop.
pub struct ProcessManager {
    /// Directory for background-launch logs.
    log_dir: Option<PathBuf>,
    /// Forced terminal host; detected per launch when unset.
    terminal: Option<TerminalKind>,
    processes: Mutex<Vec<TrackedProcess>>,
    last_launch_error: Mutex<Option<String>>,
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ProcessManager {
    pub fn new(log_dir: Option<&Path>) -> Self {
        Self {
            log_dir: log_dir.map(Path::to_path_buf),
            terminal: None,
            processes: Mutex::new(Vec::new()),
            last_launch_error: Mutex::new(None),
        }
    }

    /// Always launch through the given terminal host.
    pub fn with_terminal(mut self, kind: TerminalKind) -> Self {
        self.terminal = Some(kind);
        self
    }

    fn tracked(&self) -> MutexGuard<'_, Vec<TrackedProcess>> {
        self.processes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_last_error(&self, error: Option<String>) {
        *self.last_launch_error.lock().unwrap_or_else(|e| e.into_inner()) = error;
    }

    fn log_file_for(&self, title: &str) -> Option<PathBuf> {
        self.log_dir.as_ref().map(|dir| {
            let slug: String = title
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
                .collect();
            let timestamp = Local::now().format("%Y%m%d_%H%M%S");
            dir.join(format!("{}_{}.log", slug.trim_matches('_'), timestamp))
        })
    }

    /// Launch and start tracking.
    ///
    /// Returns the PID of the new child.
    pub fn spawn(&self, mut config: LaunchConfig) -> Result<u32> {
        self.set_last_error(None);
        if config.log_file.is_none() {
            config.log_file = self.log_file_for(&config.title);
        }

        let kind = self.terminal.clone().unwrap_or_else(TerminalKind::detect);
        let result: LaunchResult = ProcessLauncher::launch_with(&config, kind)?;

        match (result.success, result.process, result.pid) {
            (true, Some(child), Some(pid)) => {
                if let Some(log) = result.log_path {
                    info!("{} output is written to {}", config.title, log.display());
                }
                self.tracked().push(TrackedProcess {
                    title: config.title,
                    command: config.command,
                    cwd: config.cwd,
                    pid,
                    started_at: Local::now(),
                    child,
                });
                Ok(pid)
            }
            _ => {
                let message = result
                    .error
                    .unwrap_or_else(|| "unknown launch failure".to_string());
                self.set_last_error(Some(message.clone()));
                Err(LauncherError::LaunchFailed {
                    app: config.title,
                    message,
                })
            }
        }
    }

    /// Status of every tracked process.
    pub fn running(&self) -> Vec<ProcessInfo> {
        let now = Local::now();
        self.tracked()
            .iter_mut()
            .map(|proc| {
                let running = matches!(proc.child.try_wait(), Ok(None));
                ProcessInfo {
                    title: proc.title.clone(),
                    pid: proc.pid,
                    cwd: proc.cwd.clone(),
                    command: proc.command.clone(),
                    runtime_secs: (now - proc.started_at).num_seconds(),
                    running,
                }
            })
            .collect()
    }

    /// Forget processes that have exited. Returns how many were dropped.
    pub fn prune(&self) -> usize {
        let mut processes = self.tracked();
        let before = processes.len();
        processes.retain_mut(|proc| match proc.child.try_wait() {
            Ok(Some(status)) => {
                debug!("{} (PID {}) exited with {}", proc.title, proc.pid, status);
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!("Failed to poll {} (PID {}): {}", proc.title, proc.pid, e);
                false
            }
        });
        before - processes.len()
    }

    pub fn len(&self) -> usize {
        self.tracked().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked().is_empty()
    }

    /// Terminate everything still running and clear the list.
    ///
    /// Returns how many processes were stopped.
    pub fn stop_all(&self) -> usize {
        let processes: Vec<TrackedProcess> = self.tracked().drain(..).collect();
        if processes.is_empty() {
            return 0;
        }
        info!("Stopping {} tracked processes", processes.len());

        let mut stopped = 0;
        for mut proc in processes {
            if !matches!(proc.child.try_wait(), Ok(None)) {
                continue;
            }
            match ProcessLauncher::stop_process(proc.pid, InstallationConfig::PROCESS_STOP_TIMEOUT_MS)
            {
                Ok(true) => {
                    stopped += 1;
                    let _ = proc.child.try_wait();
                    info!("Stopped {} (PID {})", proc.title, proc.pid);
                }
                Ok(false) => warn!("{} (PID {}) did not stop", proc.title, proc.pid),
                Err(e) => warn!("Failed to stop {} (PID {}): {}", proc.title, proc.pid, e),
            }
        }
        stopped
    }

    pub fn last_launch_error(&self) -> Option<String> {
        self.last_launch_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Drop for ProcessManager {
    fn drop(&mut self) {
        let stopped = self.stop_all();
        if stopped > 0 {
            debug!("Stopped {} processes on shutdown", stopped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn background_manager(dir: &Path) -> ProcessManager {
        ProcessManager::new(Some(dir)).with_terminal(TerminalKind::Background)
    }

    #[test]
    fn test_new_manager_is_empty() {
        let manager = ProcessManager::default();
        assert!(manager.is_empty());
        assert!(manager.running().is_empty());
        assert_eq!(manager.stop_all(), 0);
        assert!(manager.last_launch_error().is_none());
    }

    #[test]
    fn test_spawn_failure_records_error() {
        let temp_dir = TempDir::new().unwrap();
        let manager = background_manager(temp_dir.path());

        let config = LaunchConfig::new("Bot", "true", temp_dir.path().join("missing"));
        let err = manager.spawn(config).unwrap_err();
        assert!(matches!(err, LauncherError::LaunchFailed { .. }));
        assert!(manager.last_launch_error().is_some());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_log_file_name() {
        let temp_dir = TempDir::new().unwrap();
        let manager = background_manager(temp_dir.path());
        let log = manager.log_file_for("MaiBot 本体").unwrap();
        let name = log.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("maibot_"));
        assert!(name.ends_with(".log"));
    }

    #[cfg(unix)]
    #[test]
    fn test_spawn_track_and_stop() {
        let temp_dir = TempDir::new().unwrap();
        let manager = background_manager(temp_dir.path());

        let pid = manager
            .spawn(LaunchConfig::new("Sleeper", "sleep 30", temp_dir.path()))
            .unwrap();

        let running = manager.running();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].pid, pid);
        assert!(running[0].running);

        assert_eq!(manager.stop_all(), 1);
        assert!(manager.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_prune_drops_exited() {
        let temp_dir = TempDir::new().unwrap();
        let manager = background_manager(temp_dir.path());

        manager
            .spawn(LaunchConfig::new("Quick", "true", temp_dir.path()))
            .unwrap();

        let mut pruned = 0;
        for _ in 0..50 {
            pruned += manager.prune();
            if manager.is_empty() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
        assert_eq!(pruned, 1);
    }
}
