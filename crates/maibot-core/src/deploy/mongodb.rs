//! Portable MongoDB for bot versions that still store data in it.

use crate::config::{InstallationConfig, RepoConfig};
use crate::deploy::archive::copy_dir_recursive;
use crate::deploy::fetch_archive;
use crate::network::{DownloadManager, DownloadProgress};
use crate::version::needs_mongodb;
use crate::{LauncherError, Result};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::info;

pub use crate::detection::find_mongod;

/// Whether a deployment of `version` should include MongoDB.
pub fn should_install(version: &str) -> bool {
    !version.trim().is_empty() && needs_mongodb(version)
}

fn archive_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or("mongodb.zip")
}

/// Move an unpacked server distribution into `target` and add `data/`.
pub fn install_mongodb_from(extracted_root: &Path, target: &Path) -> Result<PathBuf> {
    if target.exists() {
        std::fs::remove_dir_all(target).map_err(|e| LauncherError::io_with_path(e, target))?;
    }
    copy_dir_recursive(extracted_root, target)?;

    let data = target.join("data");
    std::fs::create_dir_all(&data).map_err(|e| LauncherError::io_with_path(e, &data))?;

    if find_mongod(target).is_none() {
        return Err(LauncherError::InstallationFailed {
            message: format!("no mongod binary in {}", target.display()),
        });
    }
    Ok(target.to_path_buf())
}

/// Download the platform's MongoDB build into `install_dir/mongodb`.
pub async fn install_mongodb(
    downloads: &DownloadManager,
    install_dir: &Path,
    progress_tx: Option<mpsc::Sender<DownloadProgress>>,
) -> Result<PathBuf> {
    let url = RepoConfig::mongodb_url();
    info!("Installing MongoDB from {}", url);
    let (_temp, root) = fetch_archive(downloads, url, archive_name(url), progress_tx).await?;
    let installed = install_mongodb_from(&root, &install_dir.join(InstallationConfig::MONGODB_DIR_NAME))?;
    info!("MongoDB installed at {}", installed.display());
    Ok(installed)
}

/// Run the Compass installer script bundled with the Windows build.
#[cfg(windows)]
pub async fn install_compass(mongodb_dir: &Path) -> Result<()> {
    let script = mongodb_dir.join("bin").join("Install-Compass.ps1");
    if !script.is_file() {
        return Err(LauncherError::FileNotFound(script));
    }
    let status = tokio::process::Command::new("powershell")
        .args(["-ExecutionPolicy", "Bypass", "-File"])
        .arg(&script)
        .current_dir(mongodb_dir)
        .status()
        .await
        .map_err(|e| LauncherError::LaunchFailed {
            app: "Install-Compass.ps1".to_string(),
            message: e.to_string(),
        })?;
    if !status.success() {
        return Err(LauncherError::InstallationFailed {
            message: format!("Install-Compass.ps1 exited with {}", status),
        });
    }
    Ok(())
}

/// Run the Compass installer script bundled with the Windows build.
#[cfg(not(windows))]
pub async fn install_compass(_mongodb_dir: &Path) -> Result<()> {
    Err(LauncherError::UnsupportedPlatform {
        feature: "MongoDB Compass installer".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::mongod_name;
    use tempfile::TempDir;

    #[test]
    fn test_should_install() {
        assert!(should_install("0.6.3"));
        assert!(should_install("classical"));
        assert!(!should_install("0.7.0"));
        assert!(!should_install("main"));
        assert!(!should_install(""));
    }

    #[test]
    fn test_archive_name() {
        assert_eq!(
            archive_name(RepoConfig::MONGODB_LINUX_URL),
            "mongodb-linux-x86_64-ubuntu2204-7.0.14.tgz"
        );
    }

    #[test]
    fn test_install_mongodb_from() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("mongodb-win32-x86_64-windows-7.0.14");
        std::fs::create_dir_all(root.join("bin")).unwrap();
        std::fs::write(root.join("bin").join(mongod_name()), "").unwrap();

        let target = temp.path().join("deploy/mongodb");
        let installed = install_mongodb_from(&root, &target).unwrap();
        assert!(installed.join("data").is_dir());
        assert_eq!(find_mongod(&installed).unwrap(), target.join("bin").join(mongod_name()));
    }

    #[test]
    fn test_install_mongodb_from_without_binary() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("empty");
        std::fs::create_dir_all(&root).unwrap();
        let err = install_mongodb_from(&root, &temp.path().join("mongodb")).unwrap_err();
        assert!(matches!(err, LauncherError::InstallationFailed { .. }));
    }
}
