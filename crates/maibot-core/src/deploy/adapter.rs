//! The NapCat adapter that sits between the bot and NapCat.

use crate::config::{InstallationConfig, RepoConfig};
use crate::deploy::archive::copy_dir_recursive;
use crate::deploy::fetch_archive;
use crate::network::{DownloadManager, DownloadProgress};
use crate::version::{adapter_version_for, AdapterVersion};
use crate::{LauncherError, Result};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::info;

/// Directory names an adapter may already live under inside the bot dir.
const EXISTING_ADAPTER_DIRS: &[&str] = &["adapter", "MaiBot-Napcat-Adapter", "napcat-adapter"];

/// Result of the adapter step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterInstall {
    /// An adapter already shipped with the bot checkout.
    Existing(PathBuf),
    Installed { path: PathBuf, version: String },
    /// Legacy bots connect without one.
    NotRequired,
}

impl AdapterInstall {
    pub fn path(&self) -> Option<&Path> {
        match self {
            AdapterInstall::Existing(path) | AdapterInstall::Installed { path, .. } => Some(path),
            AdapterInstall::NotRequired => None,
        }
    }
}

/// An adapter directory already present inside `mai_dir`.
pub fn existing_adapter(mai_dir: &Path) -> Option<PathBuf> {
    EXISTING_ADAPTER_DIRS
        .iter()
        .map(|name| mai_dir.join(name))
        .find(|path| path.is_dir())
}

/// Archive URL for an adapter ref: branch heads by archive, tags by codeload.
pub fn adapter_download_url(version: &AdapterVersion) -> Option<String> {
    let name = version.as_ref_name()?;
    Some(if version.is_branch() {
        RepoConfig::branch_archive_url(RepoConfig::ADAPTER_REPO, name)
    } else {
        RepoConfig::tag_archive_url(RepoConfig::ADAPTER_REPO, name)
    })
}

/// Replace `mai_dir/adapter` with the contents of `source_root`.
pub fn install_adapter_from(source_root: &Path, mai_dir: &Path) -> Result<PathBuf> {
    let target = mai_dir.join(InstallationConfig::ADAPTER_DIR_NAME);
    if target.exists() {
        std::fs::remove_dir_all(&target).map_err(|e| LauncherError::io_with_path(e, &target))?;
    }
    copy_dir_recursive(source_root, &target)?;
    Ok(target)
}

/// Make sure the bot at `mai_dir` has the adapter its `bot_version` expects.
pub async fn install_adapter(
    downloads: &DownloadManager,
    bot_version: &str,
    mai_dir: &Path,
    progress_tx: Option<mpsc::Sender<DownloadProgress>>,
) -> Result<AdapterInstall> {
    if let Some(existing) = existing_adapter(mai_dir) {
        info!("Using adapter shipped at {}", existing.display());
        return Ok(AdapterInstall::Existing(existing));
    }

    let version = adapter_version_for(bot_version);
    let url = match &version {
        AdapterVersion::NotRequired => return Ok(AdapterInstall::NotRequired),
        AdapterVersion::Unknown => {
            return Err(LauncherError::InstallationFailed {
                message: format!("No adapter is known for version {}", bot_version),
            })
        }
        AdapterVersion::Ref(_) => adapter_download_url(&version).ok_or_else(|| {
            LauncherError::Other(format!("adapter ref missing for {}", bot_version))
        })?,
    };

    info!("Installing adapter {} for MaiBot {}", version, bot_version);
    let archive_name = format!("adapter_{}.zip", version);
    let (_temp, root) = fetch_archive(downloads, &url, &archive_name, progress_tx).await?;
    let path = install_adapter_from(&root, mai_dir)?;

    Ok(AdapterInstall::Installed {
        path,
        version: version.to_string(),
    })
}
