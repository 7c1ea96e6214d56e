//! Executable bits for scripts shipped inside downloaded archives.

use crate::error::{LauncherError, Result};
use std::path::Path;
use tracing::debug;

/// Make a file executable.
///
/// # Platform Behavior
/// - **Linux/macOS**: adds the execute bits to the existing mode
/// - **Windows**: no-op, executability is decided by extension
pub fn set_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = std::fs::metadata(path).map_err(|e| LauncherError::io_with_path(e, path))?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(permissions.mode() | 0o755);
        std::fs::set_permissions(path, permissions)
            .map_err(|e| LauncherError::io_with_path(e, path))?;
        debug!("Set executable permissions on: {}", path.display());
    }

    #[cfg(not(unix))]
    {
        if !path.exists() {
            return Err(LauncherError::FileNotFound(path.to_path_buf()));
        }
        debug!("Skipping executable bit for: {}", path.display());
    }

    Ok(())
}

/// Check if a file can be executed directly.
pub fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        path.extension()
            .map(|ext| {
                matches!(
                    ext.to_string_lossy().to_lowercase().as_str(),
                    "exe" | "bat" | "cmd" | "ps1"
                )
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[cfg(unix)]
    #[test]
    fn test_set_executable() {
        let temp_dir = TempDir::new().unwrap();
        let script = temp_dir.path().join("run.sh");
        std::fs::write(&script, "#!/bin/sh\n").unwrap();
        assert!(!is_executable(&script));

        set_executable(&script).unwrap();
        assert!(is_executable(&script));
    }

    #[test]
    fn test_set_executable_missing() {
        let temp_dir = TempDir::new().unwrap();
        assert!(set_executable(&temp_dir.path().join("missing.sh")).is_err());
    }
}
