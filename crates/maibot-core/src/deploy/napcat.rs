//! NapCat download and installer handling.
//!
//! NapCat ships as Windows "OneKey" archives containing an installer. The
//! launcher unpacks the archive, optionally starts the installer, then polls
//! for the installed `NapCatWinBootMain.exe`.

use crate::config::InstallationConfig;
use crate::deploy::archive::extract_archive;
use crate::deploy::versions::VersionEntry;
use crate::detection::find_files;
use crate::network::{DownloadManager, DownloadProgress};
use crate::{LauncherError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub use crate::detection::find_installed_napcat;

fn archive_file_name(url: &str) -> String {
    url.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("napcat.zip")
        .to_string()
}

/// Download `version` and unpack it into `install_dir/NapCat`.
pub async fn download_napcat(
    downloads: &DownloadManager,
    version: &VersionEntry,
    install_dir: &Path,
    progress_tx: Option<mpsc::Sender<DownloadProgress>>,
) -> Result<PathBuf> {
    let temp = tempfile::TempDir::new()?;
    let archive = temp.path().join(archive_file_name(&version.download_url));
    downloads
        .download_with_retry(
            &version.download_url,
            &archive,
            InstallationConfig::DOWNLOAD_RETRY_ATTEMPTS,
            progress_tx,
        )
        .await?;

    let napcat_dir = install_dir.join(InstallationConfig::NAPCAT_DIR_NAME);
    let dest = napcat_dir.clone();
    tokio::task::spawn_blocking(move || extract_archive(&archive, &dest))
        .await
        .map_err(|e| LauncherError::Other(format!("extraction task failed: {}", e)))??;

    info!("NapCat {} unpacked to {}", version.name, napcat_dir.display());
    Ok(napcat_dir)
}

/// `NapCatInstaller.exe` anywhere below `dir`.
pub fn find_installer(dir: &Path) -> Option<PathBuf> {
    find_files(dir, InstallationConfig::NAPCAT_INSTALLER_EXE, InstallationConfig::SEARCH_MAX_DEPTH + 1)
        .into_iter()
        .next()
}

/// Start the NapCat installer in its own console window.
#[cfg(windows)]
pub fn run_installer(installer: &Path) -> Result<()> {
    use std::os::windows::process::CommandExt;
    const CREATE_NEW_CONSOLE: u32 = 0x00000010;

    let dir = installer.parent().unwrap_or_else(|| Path::new("."));
    std::process::Command::new(installer)
        .current_dir(dir)
        .creation_flags(CREATE_NEW_CONSOLE)
        .spawn()
        .map_err(|e| LauncherError::LaunchFailed {
            app: "NapCatInstaller".to_string(),
            message: e.to_string(),
        })?;
    info!("Started NapCat installer {}", installer.display());
    Ok(())
}

/// Start the NapCat installer in its own console window.
#[cfg(not(windows))]
pub fn run_installer(installer: &Path) -> Result<()> {
    warn!("Cannot run {} on this platform", installer.display());
    Err(LauncherError::UnsupportedPlatform {
        feature: "NapCat installer".to_string(),
    })
}

/// Poll `dir` for an installed NapCat, `attempts` times `interval` apart.
pub async fn wait_for_installation(dir: &Path, attempts: u32, interval: Duration) -> Option<PathBuf> {
    for attempt in 1..=attempts {
        if let Some(exe) = find_installed_napcat(dir) {
            info!("Found NapCat at {} (attempt {})", exe.display(), attempt);
            return Some(exe);
        }
        if attempt < attempts {
            warn!(
                "NapCat not found (attempt {}/{}), retrying in {:?}",
                attempt, attempts, interval
            );
            tokio::time::sleep(interval).await;
        }
    }
    None
}
