//! Deploying, updating and removing bot instances.
//!
//! Each component (bot, adapter, NapCat, MongoDB, WebUI) has its own module
//! that knows how to fetch and lay out its files. [`Deployer`] runs them in
//! order for a [`DeployPlan`] and records the result in the [`ConfigStore`].
//!
//! [`ConfigStore`]: crate::store::ConfigStore

pub mod adapter;
pub mod archive;
mod installer;
pub mod mongodb;
pub mod napcat;
mod progress;
pub mod python;
mod remove;
pub mod templates;
mod update;
pub mod versions;
pub mod webui;

pub use installer::{DeployHooks, DeployOutcome, DeployPlan, Deployer, NoHooks};
pub use progress::{DeployEvent, DeployStep, ProgressSink};
pub use remove::{confirmation_token, delete_instance, deletion_target, RemovalReport};
pub use update::{same_version, UpdateReport, Updater};
pub use versions::{maibot_versions, napcat_versions, VersionEntry, VersionKind};

use crate::config::InstallationConfig;
use crate::network::{DownloadManager, DownloadProgress};
use crate::{LauncherError, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tracing::debug;

/// Download `url` into a fresh temp dir and unpack it.
///
/// Returns the temp dir guard together with the archive's root directory.
/// The files live only as long as the guard.
pub(crate) async fn fetch_archive(
    downloads: &DownloadManager,
    url: &str,
    archive_name: &str,
    progress_tx: Option<mpsc::Sender<DownloadProgress>>,
) -> Result<(TempDir, PathBuf)> {
    let temp = TempDir::new().map_err(|e| LauncherError::Io {
        message: "Failed to create temporary directory".into(),
        path: None,
        source: Some(e),
    })?;
    let archive = temp.path().join(archive_name);
    downloads
        .download_with_retry(url, &archive, InstallationConfig::DOWNLOAD_RETRY_ATTEMPTS, progress_tx)
        .await?;

    let root = unpack(archive, temp.path().join("extract")).await?;
    debug!("{} unpacked to {}", url, root.display());
    Ok((temp, root))
}

/// Extract off the async runtime and locate the archive root.
pub(crate) async fn unpack(archive: PathBuf, dest: PathBuf) -> Result<PathBuf> {
    tokio::task::spawn_blocking(move || {
        archive::extract_archive(&archive, &dest)?;
        archive::single_root_dir(&dest)
    })
    .await
    .map_err(|e| LauncherError::Other(format!("extraction task failed: {}", e)))?
}

/// Copy an unpacked bot checkout into `install_dir/MaiBot`.
pub fn install_bot_from(source_root: &Path, install_dir: &Path) -> Result<PathBuf> {
    let target = install_dir.join(InstallationConfig::BOT_DIR_NAME);
    if target.exists() {
        return Err(LauncherError::InstallationFailed {
            message: format!("{} already exists", target.display()),
        });
    }
    archive::copy_dir_recursive(source_root, &target)?;
    Ok(target)
}
