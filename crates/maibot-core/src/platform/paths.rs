//! Platform-specific path utilities.
//!
//! This module provides functions to get platform-specific paths for:
//! - Python virtual environment executables
//! - The system Python interpreter
//! - The launcher's own data directory
//! - Programs on `PATH`

use crate::config::AppConfig;
use std::path::{Path, PathBuf};

/// Get the path to the Python executable within a virtual environment.
///
/// # Platform Behavior
/// - **Linux/macOS**: `{venv}/bin/python`
/// - **Windows**: `{venv}/Scripts/python.exe`
pub fn venv_python(venv_dir: &Path) -> PathBuf {
    #[cfg(windows)]
    {
        venv_dir.join("Scripts").join("python.exe")
    }
    #[cfg(not(windows))]
    {
        venv_dir.join("bin").join("python")
    }
}

/// Get the path to pip within a virtual environment.
pub fn venv_pip(venv_dir: &Path) -> PathBuf {
    #[cfg(windows)]
    {
        venv_dir.join("Scripts").join("pip.exe")
    }
    #[cfg(not(windows))]
    {
        venv_dir.join("bin").join("pip")
    }
}

/// Python inside `dir/venv` or `dir/.venv`, whichever exists first.
pub fn find_venv_python(dir: &Path) -> Option<PathBuf> {
    ["venv", ".venv"]
        .iter()
        .map(|name| venv_python(&dir.join(name)))
        .find(|python| python.exists())
}

/// Interpreter used when an instance has no virtual environment.
pub fn system_python() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

/// Directory for caches and logs.
///
/// An explicit override wins. Otherwise `{data_local_dir}/maibot-launcher`,
/// falling back to `./.maibot-launcher`.
pub fn launcher_data_dir(override_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = override_dir {
        return dir.to_path_buf();
    }
    dirs::data_local_dir()
        .map(|dir| dir.join(AppConfig::DATA_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(AppConfig::FALLBACK_DATA_DIR))
}

/// Locate an executable on `PATH`.
pub fn find_in_path(program: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    let extensions: &[&str] = if cfg!(windows) {
        &["", ".exe", ".cmd", ".bat"]
    } else {
        &[""]
    };

    std::env::split_paths(&path_var).find_map(|dir| {
        extensions
            .iter()
            .map(|ext| dir.join(format!("{}{}", program, ext)))
            .find(|candidate| candidate.is_file())
    })
}
