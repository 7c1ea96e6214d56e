//! Moving chat history from MongoDB to SQLite for bots past 0.7.

use crate::models::InstanceConfig;
use crate::platform::is_mongodb_running;
use crate::process::{python_for, LaunchConfig, ProcessManager};
use crate::validation::validate_path;
use crate::{LauncherError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

const SCRIPT_STEM: &str = "mongodb_to_sqlite";

/// The migration script shipped with the checkout at `mai_dir`.
pub fn find_script(mai_dir: &Path) -> Option<PathBuf> {
    let wrapper = if cfg!(windows) { "bat" } else { "sh" };
    [
        mai_dir.join(format!("{}.{}", SCRIPT_STEM, wrapper)),
        mai_dir.join("scripts").join(format!("{}.py", SCRIPT_STEM)),
    ]
    .into_iter()
    .find(|path| path.is_file())
}

fn script_command(instance: &InstanceConfig, script: &Path) -> String {
    match script.extension().and_then(|e| e.to_str()) {
        Some("py") => format!("{} \"{}\"", python_for(instance), script.display()),
        Some("sh") => format!("bash \"{}\"", script.display()),
        _ => format!("\"{}\"", script.display()),
    }
}

/// Starts the migration script.
pub struct Migrator {
    manager: Arc<ProcessManager>,
}

impl Migrator {
    pub fn new(manager: Arc<ProcessManager>) -> Self {
        Self { manager }
    }

    /// Script to run, once the bot dir is valid and MongoDB is up.
    pub fn check(instance: &InstanceConfig) -> Result<PathBuf> {
        validate_path(&instance.mai_path, None).map_err(|e| LauncherError::validation("mai_path", e))?;

        let script = find_script(instance.mai_dir()).ok_or_else(|| {
            LauncherError::FileNotFound(instance.mai_dir().join(format!("{}.py", SCRIPT_STEM)))
        })?;

        if !is_mongodb_running() {
            return Err(LauncherError::ProcessNotRunning {
                app: "MongoDB".to_string(),
            });
        }
        Ok(script)
    }

    /// Open a console running the migration. Returns its PID.
    pub fn run(&self, instance: &InstanceConfig) -> Result<u32> {
        let script = Self::check(instance)?;
        info!("Starting MongoDB migration for {}", instance.label());
        self.manager.spawn(LaunchConfig::new(
            "MongoDB → SQLite",
            script_command(instance, &script),
            instance.mai_dir(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_script_prefers_wrapper() {
        let temp = TempDir::new().unwrap();
        assert!(find_script(temp.path()).is_none());

        std::fs::create_dir_all(temp.path().join("scripts")).unwrap();
        let py = temp.path().join("scripts/mongodb_to_sqlite.py");
        std::fs::write(&py, "").unwrap();
        assert_eq!(find_script(temp.path()), Some(py));

        let wrapper = if cfg!(windows) { "mongodb_to_sqlite.bat" } else { "mongodb_to_sqlite.sh" };
        std::fs::write(temp.path().join(wrapper), "").unwrap();
        assert_eq!(find_script(temp.path()), Some(temp.path().join(wrapper)));
    }

    #[test]
    fn test_script_command() {
        let instance = InstanceConfig::new("1", "0.7.0");
        assert_eq!(
            script_command(&instance, Path::new("/srv/MaiBot/mongodb_to_sqlite.sh")),
            "bash \"/srv/MaiBot/mongodb_to_sqlite.sh\""
        );
        assert!(script_command(&instance, Path::new("scripts/mongodb_to_sqlite.py"))
            .ends_with("\"scripts/mongodb_to_sqlite.py\""));
    }

    #[test]
    fn test_check_without_script() {
        let temp = TempDir::new().unwrap();
        let mut instance = InstanceConfig::new("1", "0.7.0");
        instance.mai_path = temp.path().display().to_string();
        assert!(matches!(
            Migrator::check(&instance),
            Err(LauncherError::FileNotFound(_))
        ));

        instance.mai_path = String::new();
        assert!(matches!(
            Migrator::check(&instance),
            Err(LauncherError::Validation { .. })
        ));
    }
}
