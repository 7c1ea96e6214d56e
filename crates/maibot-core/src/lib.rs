//! MaiBot Launcher Core - headless library behind the MaiBot console launcher.
//!
//! This crate manages local MaiBot instances: the `config.toml` store,
//! detection and validation of installations, launching the bot and its
//! companions (adapter, NapCat, MongoDB, WebUI), and deploying new instances
//! from GitHub. It has no terminal UI of its own; the `maibot-launcher`
//! binary drives it.
//!
//! # Example
//!
//! ```rust,no_run
//! use maibot_core::Launcher;
//!
//! #[tokio::main]
//! async fn main() -> maibot_core::Result<()> {
//!     let launcher = Launcher::builder("config.toml")
//!         .auto_create_dirs(true)
//!         .build()?;
//!
//!     let store = launcher.load_store()?;
//!     for (name, instance) in store.iter() {
//!         println!("{}: {} ({})", name, instance.label(), instance.version_path);
//!     }
//!
//!     if let Some(instance) = store.current() {
//!         let report = launcher.instance_launcher().launch_bot_only(instance).await?;
//!         println!("started {} processes", report.steps.len());
//!     }
//!
//!     launcher.shutdown();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod deploy;
pub mod detection;
pub mod error;
pub mod knowledge;
pub mod migration;
pub mod models;
pub mod network;
pub mod platform;
pub mod process;
pub mod store;
pub mod validation;
pub mod version;

mod api;

pub use api::LauncherBuilder;
pub use config::{AppConfig, InstallationConfig, LaunchTimings, NetworkConfig, RepoConfig};
pub use deploy::{DeployPlan, Deployer, Updater, VersionEntry};
pub use error::{LauncherError, Result};
pub use knowledge::{KnowledgeBuilder, LpmmStep};
pub use migration::Migrator;
pub use models::{ConfigDocument, InstallOptions, InstanceConfig};
pub use network::{DownloadManager, GitHubClient};
pub use process::{InstanceLauncher, ProcessInfo, ProcessManager};
pub use store::ConfigStore;

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared services for one launcher session.
///
/// Owns the long-lived pieces (process tracking, the GitHub client and the
/// download manager) and hands out the per-task helpers built on them. The
/// config store itself is loaded on demand and owned by the caller.
pub struct Launcher {
    config_path: PathBuf,
    data_dir: PathBuf,
    processes: Arc<ProcessManager>,
    github: Arc<GitHubClient>,
    downloads: Arc<DownloadManager>,
}

impl Launcher {
    /// Create a builder for a launcher using the store at `config_path`.
    pub fn builder(config_path: impl Into<PathBuf>) -> LauncherBuilder {
        LauncherBuilder::new(config_path)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Directory for caches and logs.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join(AppConfig::LOGS_DIR_NAME)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join(AppConfig::CACHE_DIR_NAME)
    }

    /// Load (or create) the config store.
    pub fn load_store(&self) -> Result<ConfigStore> {
        ConfigStore::load(&self.config_path)
    }

    pub fn processes(&self) -> &Arc<ProcessManager> {
        &self.processes
    }

    pub fn github(&self) -> &Arc<GitHubClient> {
        &self.github
    }

    pub fn downloads(&self) -> &Arc<DownloadManager> {
        &self.downloads
    }

    pub fn is_offline(&self) -> bool {
        self.github.is_offline()
    }

    pub fn instance_launcher(&self) -> InstanceLauncher {
        InstanceLauncher::new(self.processes.clone())
    }

    pub fn deployer(&self) -> Deployer {
        Deployer::new(self.downloads.clone())
    }

    pub fn updater(&self) -> Updater {
        Updater::new(self.downloads.clone())
    }

    pub fn knowledge(&self) -> KnowledgeBuilder {
        KnowledgeBuilder::new(self.processes.clone())
    }

    pub fn migrator(&self) -> Migrator {
        Migrator::new(self.processes.clone())
    }

    /// Stop every tracked process. Returns how many were stopped.
    pub fn shutdown(&self) -> usize {
        self.downloads.cancel();
        self.processes.stop_all()
    }
}
