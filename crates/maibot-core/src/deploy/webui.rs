//! The community web UI for the bot.

use crate::config::{InstallationConfig, RepoConfig};
use crate::deploy::archive::copy_dir_recursive;
use crate::deploy::fetch_archive;
use crate::deploy::python::{install_requirements, run_with_timeout};
use crate::models::GitHubBranch;
use crate::network::{DownloadManager, DownloadProgress, GitHubClient};
use crate::{LauncherError, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info};

const FRONTEND_DIR: &str = "http_server";

/// A branch of the WebUI repository offered for install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebUiBranch {
    pub name: String,
    pub commit_sha: String,
    pub download_url: String,
}

impl From<&GitHubBranch> for WebUiBranch {
    fn from(branch: &GitHubBranch) -> Self {
        Self {
            name: branch.name.clone(),
            commit_sha: branch.short_sha().to_string(),
            download_url: RepoConfig::branch_archive_url(RepoConfig::WEBUI_REPO, &branch.name),
        }
    }
}

impl WebUiBranch {
    /// Entry for a branch known only by name.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            commit_sha: String::new(),
            download_url: RepoConfig::branch_archive_url(RepoConfig::WEBUI_REPO, name),
        }
    }
}

/// Branches of the WebUI repository.
pub async fn webui_branches(github: &GitHubClient, force_refresh: bool) -> Result<Vec<WebUiBranch>> {
    let branches = github.get_branches(RepoConfig::WEBUI_REPO, force_refresh).await?;
    Ok(branches.iter().map(WebUiBranch::from).collect())
}

async fn tool_version(candidates: &[&str]) -> Option<String> {
    for program in candidates {
        let mut cmd = Command::new(program);
        cmd.arg("--version");
        match run_with_timeout(cmd, InstallationConfig::TOOL_CHECK_TIMEOUT, program).await {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
                debug!("{} --version: {}", program, version);
                return Some(version);
            }
            _ => continue,
        }
    }
    None
}

/// Installed Node.js version, if any.
pub async fn check_node() -> Option<String> {
    tool_version(&["node", "node.exe"]).await
}

/// Installed npm version, if any.
pub async fn check_npm() -> Option<String> {
    tool_version(&["npm", "npm.cmd"]).await
}

/// How to get Node.js on this platform.
pub fn node_install_hint() -> String {
    if cfg!(windows) {
        format!("下载并运行 Node.js 安装包: {}", RepoConfig::NODE_WINDOWS_MSI)
    } else if cfg!(target_os = "macos") {
        "使用 Homebrew 安装: brew install node".to_string()
    } else {
        "Debian/Ubuntu: sudo apt-get install -y nodejs npm\nCentOS/RHEL: sudo yum install -y nodejs npm"
            .to_string()
    }
}

/// Copy an unpacked WebUI checkout into `target`, replacing same-named entries.
pub fn install_webui_from(source_root: &Path, target: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(target).map_err(|e| LauncherError::io_with_path(e, target))?;
    for entry in std::fs::read_dir(source_root).map_err(|e| LauncherError::io_with_path(e, source_root))? {
        let entry = entry.map_err(|e| LauncherError::io_with_path(e, source_root))?;
        let dst = target.join(entry.file_name());
        if entry.path().is_dir() {
            if dst.exists() {
                std::fs::remove_dir_all(&dst).map_err(|e| LauncherError::io_with_path(e, &dst))?;
            }
            copy_dir_recursive(&entry.path(), &dst)?;
        } else {
            std::fs::copy(entry.path(), &dst).map_err(|e| LauncherError::io_with_path(e, &dst))?;
        }
    }
    Ok(target.to_path_buf())
}

/// Download `branch` into `install_dir/WebUI`.
pub async fn download_webui(
    downloads: &DownloadManager,
    branch: &WebUiBranch,
    install_dir: &Path,
    progress_tx: Option<mpsc::Sender<DownloadProgress>>,
) -> Result<PathBuf> {
    let archive_name = format!("webui_{}.zip", branch.name);
    let (_temp, root) = fetch_archive(downloads, &branch.download_url, &archive_name, progress_tx).await?;
    let installed = install_webui_from(&root, &install_dir.join(InstallationConfig::WEBUI_DIR_NAME))?;
    info!("WebUI {} installed at {}", branch.name, installed.display());
    Ok(installed)
}

/// `npm install` for the frontend. Returns false when there is no frontend.
pub async fn npm_install(webui_dir: &Path) -> Result<bool> {
    let frontend = webui_dir.join(FRONTEND_DIR);
    if !frontend.join("package.json").is_file() {
        return Ok(false);
    }

    let npm = if cfg!(windows) { "npm.cmd" } else { "npm" };
    let mut cmd = Command::new(npm);
    cmd.arg("install").current_dir(&frontend);
    let output = run_with_timeout(cmd, InstallationConfig::NPM_INSTALL_TIMEOUT, "npm install").await?;
    if !output.status.success() {
        return Err(LauncherError::DependencyFailed {
            message: format!(
                "npm install failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    info!("WebUI frontend dependencies installed");
    Ok(true)
}

/// Backend requirements into the bot's venv. Returns the mirror used, or
/// `None` when the WebUI has no backend requirements.
pub async fn install_backend_requirements(webui_dir: &Path, python: &Path) -> Result<Option<String>> {
    let requirements = webui_dir.join("requirements.txt");
    if !requirements.is_file() {
        return Ok(None);
    }
    install_requirements(python, &requirements, false).await.map(Some)
}
