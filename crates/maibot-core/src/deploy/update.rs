//! In-place update of a deployed bot.

use crate::config::InstallationConfig;
use crate::deploy::archive::copy_dir_recursive;
use crate::deploy::python::{create_venv, install_requirements};
use crate::deploy::versions::VersionEntry;
use crate::deploy::fetch_archive;
use crate::models::InstanceConfig;
use crate::network::DownloadManager;
use crate::platform::venv_python;
use crate::store::ConfigStore;
use crate::{LauncherError, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Result of a successful update.
#[derive(Debug, Clone)]
pub struct UpdateReport {
    pub config_name: String,
    pub previous_version: String,
    pub new_version: String,
    /// Copy of the old checkout, kept for manual rollback.
    pub backup_dir: PathBuf,
    pub warnings: Vec<String>,
}

/// True when `version` is what the instance already runs.
pub fn same_version(instance: &InstanceConfig, version: &str) -> bool {
    let strip = |v: &str| v.trim().trim_start_matches(['v', 'V']).to_lowercase();
    strip(&instance.version_path) == strip(version)
}

/// `{mai}_backup_%Y%m%d_%H%M%S`.
pub fn backup_path(mai_dir: &Path, at: DateTime<Local>) -> PathBuf {
    let mut name = mai_dir.as_os_str().to_os_string();
    name.push(format!("_backup_{}", at.format("%Y%m%d_%H%M%S")));
    PathBuf::from(name)
}

/// Entries an update never deletes or overwrites.
pub fn is_protected(name: &str) -> bool {
    InstallationConfig::PROTECTED_ENTRIES.contains(&name)
        || Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| InstallationConfig::PROTECTED_EXTENSIONS.contains(&ext))
}

fn entry_names(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| LauncherError::io_with_path(e, dir))? {
        let entry = entry.map_err(|e| LauncherError::io_with_path(e, dir))?;
        entries.push((entry.file_name().to_string_lossy().to_string(), entry.path()));
    }
    Ok(entries)
}

fn remove_path(path: &Path) -> Result<()> {
    let is_dir = fs::symlink_metadata(path)
        .map(|meta| meta.is_dir())
        .map_err(|e| LauncherError::io_with_path(e, path))?;
    let result = if is_dir {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| LauncherError::io_with_path(e, path))
}

/// Swap the checkout at `mai_dir` for `source_root`, keeping protected entries.
pub fn replace_files(mai_dir: &Path, source_root: &Path) -> Result<()> {
    for (name, path) in entry_names(mai_dir)? {
        if !is_protected(&name) {
            remove_path(&path)?;
        }
    }

    for (name, path) in entry_names(source_root)? {
        let target = mai_dir.join(&name);
        if is_protected(&name) && target.exists() {
            continue;
        }
        if path.is_dir() {
            copy_dir_recursive(&path, &target)?;
        } else {
            fs::copy(&path, &target).map_err(|e| LauncherError::io_with_path(e, &target))?;
        }
    }
    Ok(())
}

/// Copy `mai_dir` to `backup`, leaving nothing behind when the copy fails.
fn create_backup(mai_dir: &Path, backup: &Path) -> Result<()> {
    info!("Backing up {} to {}", mai_dir.display(), backup.display());
    if let Err(e) = copy_dir_recursive(mai_dir, backup) {
        error!("Backup failed: {}", e);
        if backup.exists() {
            if let Err(cleanup) = fs::remove_dir_all(backup) {
                warn!("Could not remove partial backup {}: {}", backup.display(), cleanup);
            }
        }
        return Err(e);
    }
    Ok(())
}

fn restore(mai_dir: &Path, backup: &Path) -> Result<()> {
    if mai_dir.exists() {
        fs::remove_dir_all(mai_dir).map_err(|e| LauncherError::io_with_path(e, mai_dir))?;
    }
    copy_dir_recursive(backup, mai_dir)
}

/// Updates deployed instances to another bot version.
pub struct Updater {
    downloads: Arc<DownloadManager>,
    reinstall_requirements: bool,
}

impl Updater {
    pub fn new(downloads: Arc<DownloadManager>) -> Self {
        Self {
            downloads,
            reinstall_requirements: true,
        }
    }

    /// Skip the pip step.
    pub fn without_requirements(mut self) -> Self {
        self.reinstall_requirements = false;
        self
    }

    /// Update configuration `name` to `version`, restoring the backup on failure.
    pub async fn update(&self, store: &mut ConfigStore, name: &str, version: &VersionEntry) -> Result<UpdateReport> {
        let (instance, backup) = self.prepare(store, name)?;
        let mai = PathBuf::from(&instance.mai_path);

        let fetched = fetch_archive(
            &self.downloads,
            &version.download_url,
            &format!("MaiBot_{}.zip", version.name),
            None,
        )
        .await;
        let result = match fetched {
            Ok((_temp, root)) => self.apply(store, name, instance, &version.name, &root, &backup).await,
            Err(e) => Err(e),
        };
        settle(result, &mai, &backup)
    }

    /// Update from an already unpacked checkout.
    pub async fn update_from_source(
        &self,
        store: &mut ConfigStore,
        name: &str,
        version_name: &str,
        source_root: &Path,
    ) -> Result<UpdateReport> {
        let (instance, backup) = self.prepare(store, name)?;
        let mai = PathBuf::from(&instance.mai_path);
        let result = self
            .apply(store, name, instance, version_name, source_root, &backup)
            .await;
        settle(result, &mai, &backup)
    }

    fn prepare(&self, store: &ConfigStore, name: &str) -> Result<(InstanceConfig, PathBuf)> {
        let instance = store
            .get(name)
            .cloned()
            .ok_or_else(|| LauncherError::ConfigNotFound { name: name.to_string() })?;
        let mai = instance.mai_dir();
        if instance.mai_path.trim().is_empty() || !mai.is_dir() {
            return Err(LauncherError::validation(
                "mai_path",
                format!("MaiBot 路径无效: {}", instance.mai_path),
            ));
        }

        let backup = backup_path(mai, Local::now());
        create_backup(mai, &backup)?;
        Ok((instance, backup))
    }

    async fn apply(
        &self,
        store: &mut ConfigStore,
        name: &str,
        mut instance: InstanceConfig,
        version_name: &str,
        source_root: &Path,
        backup: &Path,
    ) -> Result<UpdateReport> {
        let mai = PathBuf::from(&instance.mai_path);
        replace_files(&mai, source_root)?;

        let mut warnings = Vec::new();
        if self.reinstall_requirements {
            self.refresh_requirements(&mut instance, &mut warnings).await;
        }

        let previous_version = std::mem::replace(&mut instance.version_path, version_name.to_string());
        store.update(name, instance)?;
        store.save()?;
        info!("Updated {} from {} to {}", name, previous_version, version_name);

        Ok(UpdateReport {
            config_name: name.to_string(),
            previous_version,
            new_version: version_name.to_string(),
            backup_dir: backup.to_path_buf(),
            warnings,
        })
    }

    async fn refresh_requirements(&self, instance: &mut InstanceConfig, warnings: &mut Vec<String>) {
        let mai = PathBuf::from(&instance.mai_path);
        let requirements = mai.join("requirements.txt");
        if !requirements.is_file() {
            return;
        }

        let existing = instance
            .venv_dir()
            .map(|venv| venv_python(&venv))
            .filter(|python| python.exists());
        let python = match existing {
            Some(python) => python,
            None => match create_venv(&mai).await {
                Ok(python) => {
                    instance.venv_path = mai
                        .join(InstallationConfig::VENV_DIR_NAME)
                        .display()
                        .to_string();
                    python
                }
                Err(e) => {
                    warn!("Could not recreate virtual environment: {}", e);
                    warnings.push(format!("虚拟环境创建失败: {}", e));
                    return;
                }
            },
        };

        if let Err(e) = install_requirements(&python, &requirements, true).await {
            warn!("Requirement upgrade failed: {}", e);
            warnings.push(format!("依赖更新失败，请手动更新: {}", e));
        }
    }
}

fn settle(result: Result<UpdateReport>, mai: &Path, backup: &Path) -> Result<UpdateReport> {
    match result {
        Ok(report) => Ok(report),
        Err(e) => {
            error!("Update failed: {}, restoring {}", e, backup.display());
            if let Err(restore_err) = restore(mai, backup) {
                error!(
                    "Restore failed: {}. Recover manually from {}",
                    restore_err,
                    backup.display()
                );
            }
            Err(e)
        }
    }
}
