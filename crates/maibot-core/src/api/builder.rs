//! Builder for configuring Launcher initialization.

use crate::error::{LauncherError, Result};
use crate::network::{DownloadManager, GitHubClient};
use crate::platform::{launcher_data_dir, TerminalKind};
use crate::process::ProcessManager;
use crate::Launcher;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Builder for configuring Launcher initialization.
///
/// # Example
///
/// ```rust,no_run
/// use maibot_core::Launcher;
///
/// let launcher = Launcher::builder("./config.toml")
///     .data_dir("./.maibot-launcher")
///     .offline(true)
///     .auto_create_dirs(true)
///     .build()?;
/// # Ok::<(), maibot_core::LauncherError>(())
/// ```
pub struct LauncherBuilder {
    config_path: PathBuf,
    data_dir: Option<PathBuf>,
    auto_create_dirs: bool,
    offline: bool,
    terminal: Option<TerminalKind>,
}

impl LauncherBuilder {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            data_dir: None,
            auto_create_dirs: false,
            offline: false,
            terminal: None,
        }
    }

    /// Override the data directory.
    ///
    /// Default: `{data_local_dir}/maibot-launcher`, or `./.maibot-launcher`.
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Create the data, cache and log directories when missing.
    ///
    /// Default: `false`
    pub fn auto_create_dirs(mut self, enable: bool) -> Self {
        self.auto_create_dirs = enable;
        self
    }

    /// Never call the GitHub API; serve cached or built-in version lists.
    ///
    /// Default: `false`
    pub fn offline(mut self, enable: bool) -> Self {
        self.offline = enable;
        self
    }

    /// Force how launched processes are hosted instead of detecting a terminal.
    pub fn terminal(mut self, kind: TerminalKind) -> Self {
        self.terminal = Some(kind);
        self
    }

    fn create_directory_structure(data_dir: &Path) -> Result<()> {
        let dirs = [
            data_dir.to_path_buf(),
            data_dir.join(crate::AppConfig::CACHE_DIR_NAME),
            data_dir.join(crate::AppConfig::LOGS_DIR_NAME),
        ];

        for dir in &dirs {
            if !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|e| LauncherError::Io {
                    message: format!("Failed to create directory: {}", dir.display()),
                    path: Some(dir.clone()),
                    source: Some(e),
                })?;
            }
        }
        Ok(())
    }

    pub fn build(self) -> Result<Launcher> {
        let data_dir = launcher_data_dir(self.data_dir.as_deref());
        if self.auto_create_dirs {
            Self::create_directory_structure(&data_dir)?;
        }
        debug!("Launcher data directory: {}", data_dir.display());

        let logs_dir = data_dir.join(crate::AppConfig::LOGS_DIR_NAME);
        let mut processes = ProcessManager::new(logs_dir.exists().then_some(logs_dir.as_path()));
        if let Some(kind) = self.terminal {
            processes = processes.with_terminal(kind);
        }

        let github = GitHubClient::new(data_dir.join(crate::AppConfig::CACHE_DIR_NAME))?;
        github.set_offline(self.offline);
        if self.offline {
            info!("Offline mode: GitHub API requests are disabled");
        }

        Ok(Launcher {
            config_path: self.config_path,
            data_dir,
            processes: Arc::new(processes),
            github: Arc::new(github),
            downloads: Arc::new(DownloadManager::new()?),
        })
    }
}
