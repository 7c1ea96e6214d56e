//! Deleting an instance and, optionally, its files.

use crate::config::InstallationConfig;
use crate::models::InstanceConfig;
use crate::store::ConfigStore;
use crate::{LauncherError, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// What [`delete_instance`] did.
#[derive(Debug, Clone)]
pub struct RemovalReport {
    pub config_name: String,
    pub instance: InstanceConfig,
    /// Deployment directory that was removed from disk.
    pub deleted_dir: Option<PathBuf>,
}

/// Text the user types as the last confirmation.
pub fn confirmation_token(serial: &str) -> String {
    format!("delete-{}", serial.trim())
}

/// Deployment root of a bot checkout, if it looks like one the deployer made.
fn deployment_root(mai_path: &Path) -> Option<&Path> {
    let name = mai_path.file_name()?.to_string_lossy();
    if name.contains(InstallationConfig::BOT_DIR_NAME) {
        mai_path.parent().filter(|p| !p.as_os_str().is_empty())
    } else {
        None
    }
}

/// Directory [`delete_instance`] removes for `instance` when asked to delete files.
///
/// `None` when the checkout is missing or does not sit in a deployment
/// directory the deployer made.
pub fn deletion_target(instance: &InstanceConfig) -> Option<PathBuf> {
    if instance.mai_path.trim().is_empty() {
        return None;
    }
    let mai = instance.mai_dir();
    if !mai.exists() {
        return None;
    }
    let root = deployment_root(mai);
    if root.is_none() {
        warn!("{} is not a MaiBot directory, leaving files in place", mai.display());
    }
    root.map(Path::to_path_buf)
}

/// Remove configuration `name`; with `delete_files`, also its deployment dir.
///
/// The record is removed and saved first, so files are never deleted for a
/// record that is still on disk.
pub fn delete_instance(store: &mut ConfigStore, name: &str, delete_files: bool) -> Result<RemovalReport> {
    let instance = store
        .get(name)
        .cloned()
        .ok_or_else(|| LauncherError::ConfigNotFound { name: name.to_string() })?;
    let target = if delete_files { deletion_target(&instance) } else { None };

    // Fails before anything changes when the file cannot be written.
    store.save()?;
    store.remove(name)?;
    store.save()?;
    info!("Removed configuration {}", name);

    let mut deleted_dir = None;
    if let Some(root) = target {
        std::fs::remove_dir_all(&root).map_err(|e| LauncherError::io_with_path(e, &root))?;
        info!("Deleted deployment directory {}", root.display());
        deleted_dir = Some(root);
    }

    Ok(RemovalReport {
        config_name: name.to_string(),
        instance,
        deleted_dir,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_with(temp: &TempDir, mai: &Path) -> ConfigStore {
        let mut store = ConfigStore::load(temp.path().join("config.toml")).unwrap();
        let mut instance = InstanceConfig::new("9", "0.8.0");
        instance.mai_path = mai.display().to_string();
        store.add("instance_9", instance).unwrap();
        store.set_current("instance_9").unwrap();
        store
    }

    #[test]
    fn test_confirmation_token() {
        assert_eq!(confirmation_token("9"), "delete-9");
        assert_eq!(confirmation_token(" abc "), "delete-abc");
    }

    #[test]
    fn test_delete_with_files() {
        let temp = TempDir::new().unwrap();
        let mai = temp.path().join("deploy").join("MaiBot");
        std::fs::create_dir_all(&mai).unwrap();
        let mut store = store_with(&temp, &mai);

        let report = delete_instance(&mut store, "instance_9", true).unwrap();
        assert_eq!(report.deleted_dir.as_deref(), Some(temp.path().join("deploy").as_path()));
        assert!(!temp.path().join("deploy").exists());
        assert!(!store.contains("instance_9"));
        assert_eq!(store.current_name(), "default");
    }

    #[test]
    fn test_unrecognised_dir_is_kept() {
        let temp = TempDir::new().unwrap();
        let mai = temp.path().join("my-bot");
        std::fs::create_dir_all(&mai).unwrap();
        let mut store = store_with(&temp, &mai);

        let report = delete_instance(&mut store, "instance_9", true).unwrap();
        assert!(report.deleted_dir.is_none());
        assert!(mai.exists());
        assert!(!store.contains("instance_9"));
    }

    #[test]
    fn test_delete_record_only() {
        let temp = TempDir::new().unwrap();
        let mai = temp.path().join("deploy").join("MaiBot");
        std::fs::create_dir_all(&mai).unwrap();
        let mut store = store_with(&temp, &mai);

        delete_instance(&mut store, "instance_9", false).unwrap();
        assert!(mai.exists());
        assert!(matches!(
            delete_instance(&mut store, "instance_9", false),
            Err(LauncherError::ConfigNotFound { .. })
        ));
    }

    #[test]
    fn test_deletion_target() {
        let temp = TempDir::new().unwrap();
        let mai = temp.path().join("deploy").join("MaiBot");
        let mut instance = InstanceConfig::new("9", "0.8.0");
        instance.mai_path = mai.display().to_string();
        assert_eq!(deletion_target(&instance), None);

        std::fs::create_dir_all(&mai).unwrap();
        assert_eq!(deletion_target(&instance), Some(temp.path().join("deploy")));

        instance.mai_path = String::new();
        assert_eq!(deletion_target(&instance), None);
    }

    #[test]
    fn test_unwritable_store_keeps_files() {
        let temp = TempDir::new().unwrap();
        let mai = temp.path().join("deploy").join("MaiBot");
        std::fs::create_dir_all(&mai).unwrap();
        let config = temp.path().join("config.toml");
        std::fs::write(&config, "configurations = 1\n").unwrap();
        let mut store = ConfigStore::load(&config).unwrap();
        let mut instance = InstanceConfig::new("9", "0.8.0");
        instance.mai_path = mai.display().to_string();
        store.add("instance_9", instance).unwrap();

        let err = delete_instance(&mut store, "instance_9", true).unwrap_err();
        assert!(matches!(err, LauncherError::ConfigUnreadable { .. }));
        assert!(mai.exists());
        assert!(store.contains("instance_9"));
    }
}
