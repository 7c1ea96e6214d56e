//! Virtual environments and requirement installation.

use crate::config::{InstallationConfig, RepoConfig};
use crate::platform::{system_python, venv_python};
use crate::{LauncherError, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Run a prepared command, killing it when `limit` elapses.
pub(crate) async fn run_with_timeout(mut cmd: Command, limit: Duration, what: &str) -> Result<Output> {
    cmd.stdin(Stdio::null()).kill_on_drop(true);
    match tokio::time::timeout(limit, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(LauncherError::InstallationFailed {
            message: format!("Failed to run {}: {}", what, e),
        }),
        Err(_) => Err(LauncherError::Timeout(limit)),
    }
}

fn stderr_tail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stderr.lines().rev().take(5).collect();
    lines.into_iter().rev().collect::<Vec<_>>().join("\n")
}

/// Create `target_dir/venv`, replacing any existing one.
///
/// Returns the venv's python.
pub async fn create_venv(target_dir: &Path) -> Result<PathBuf> {
    let venv_dir = target_dir.join(InstallationConfig::VENV_DIR_NAME);
    if venv_dir.exists() {
        info!("Removing existing virtual environment {}", venv_dir.display());
        tokio::fs::remove_dir_all(&venv_dir)
            .await
            .map_err(|e| LauncherError::io_with_path(e, &venv_dir))?;
    }

    info!("Creating virtual environment in {}", venv_dir.display());
    let mut cmd = Command::new(system_python());
    cmd.args(["-m", "venv", InstallationConfig::VENV_DIR_NAME])
        .current_dir(target_dir);
    let output = run_with_timeout(cmd, InstallationConfig::VENV_CREATION_TIMEOUT, "python -m venv").await?;

    if !output.status.success() {
        return Err(LauncherError::InstallationFailed {
            message: format!("Virtual environment creation failed: {}", stderr_tail(&output)),
        });
    }

    let python = venv_python(&venv_dir);
    if !python.exists() {
        return Err(LauncherError::InstallationFailed {
            message: format!("Virtual environment has no interpreter at {}", python.display()),
        });
    }
    Ok(python)
}

fn pip_install_args<'a>(requirements: &'a OsStr, index_url: &'a str, upgrade: bool) -> Vec<&'a OsStr> {
    let mut args: Vec<&OsStr> = ["-m", "pip", "install", "-r"].into_iter().map(OsStr::new).collect();
    args.push(requirements);
    args.push(OsStr::new("-i"));
    args.push(OsStr::new(index_url));
    if upgrade {
        args.push(OsStr::new("--upgrade"));
    }
    args
}

/// Install `requirements` into the venv owning `python`.
///
/// Mirrors from [`RepoConfig::PYPI_MIRRORS`] are tried in order. Returns
/// the name of the mirror that worked.
pub async fn install_requirements(python: &Path, requirements: &Path, upgrade: bool) -> Result<String> {
    if !requirements.exists() {
        return Err(LauncherError::FileNotFound(requirements.to_path_buf()));
    }
    let workdir = requirements.parent().unwrap_or_else(|| Path::new("."));

    let mut upgrade_pip = Command::new(python);
    upgrade_pip.args(["-m", "pip", "install", "--upgrade", "pip"]).current_dir(workdir);
    match run_with_timeout(upgrade_pip, InstallationConfig::PIP_INSTALL_TIMEOUT, "pip").await {
        Ok(output) if output.status.success() => debug!("pip upgraded"),
        Ok(output) => warn!("pip upgrade failed: {}", stderr_tail(&output)),
        Err(e) => warn!("pip upgrade failed: {}", e),
    }

    let mut failures = Vec::new();
    for (name, url) in RepoConfig::PYPI_MIRRORS {
        info!("Installing {} via {} mirror", requirements.display(), name);
        let mut cmd = Command::new(python);
        cmd.args(pip_install_args(requirements.as_os_str(), url, upgrade))
            .current_dir(workdir)
            .env("PIP_DISABLE_PIP_VERSION_CHECK", "1");

        match run_with_timeout(cmd, InstallationConfig::PIP_INSTALL_TIMEOUT, "pip install").await {
            Ok(output) if output.status.success() => {
                info!("Requirements installed from {}", name);
                return Ok(name.to_string());
            }
            Ok(output) => {
                warn!("pip install via {} failed", name);
                failures.push(format!("{}: {}", name, stderr_tail(&output)));
            }
            Err(e) => {
                warn!("pip install via {} failed: {}", name, e);
                failures.push(format!("{}: {}", name, e));
            }
        }
    }

    Err(LauncherError::DependencyFailed {
        message: format!(
            "all mirrors failed for {}:\n{}",
            requirements.display(),
            failures.join("\n")
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pip_install_args() {
        let args = pip_install_args(OsStr::new("requirements.txt"), "https://pypi.org/simple", true);
        let rendered: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            rendered,
            [
                "-m",
                "pip",
                "install",
                "-r",
                "requirements.txt",
                "-i",
                "https://pypi.org/simple",
                "--upgrade"
            ]
        );
    }

    #[tokio::test]
    async fn test_install_requirements_missing_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = install_requirements(Path::new("python3"), &temp.path().join("requirements.txt"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::FileNotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_install_requirements_falls_through_mirrors() {
        use crate::platform::set_executable;

        let temp = tempfile::TempDir::new().unwrap();
        let requirements = temp.path().join("requirements.txt");
        std::fs::write(&requirements, "toml\n").unwrap();

        // Only the official index "works".
        let fake_python = temp.path().join("python");
        std::fs::write(
            &fake_python,
            "#!/bin/sh\ncase \"$*\" in\n  *-r*pypi.org*) exit 0 ;;\n  *-r*) exit 1 ;;\n  *) exit 0 ;;\nesac\n",
        )
        .unwrap();
        set_executable(&fake_python).unwrap();

        let mirror = install_requirements(&fake_python, &requirements, false).await.unwrap();
        assert_eq!(mirror, "pypi");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_install_requirements_all_fail() {
        use crate::platform::set_executable;

        let temp = tempfile::TempDir::new().unwrap();
        let requirements = temp.path().join("requirements.txt");
        std::fs::write(&requirements, "toml\n").unwrap();

        let fake_python = temp.path().join("python");
        std::fs::write(&fake_python, "#!/bin/sh\necho broken >&2\nexit 1\n").unwrap();
        set_executable(&fake_python).unwrap();

        let err = install_requirements(&fake_python, &requirements, true).await.unwrap_err();
        match err {
            LauncherError::DependencyFailed { message } => {
                assert!(message.contains("tsinghua"));
                assert!(message.contains("douban"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
