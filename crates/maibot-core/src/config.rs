//! Centralized configuration for the MaiBot launcher.
//!
//! This module provides configuration constants for installation, network
//! operations, launch sequencing, and the upstream repositories the launcher
//! downloads from.

use std::time::Duration;

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "MaiBot Launcher";
    pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");
    pub const CONFIG_FILE: &'static str = "config.toml";
    pub const DATA_DIR_NAME: &'static str = "maibot-launcher";
    pub const FALLBACK_DATA_DIR: &'static str = ".maibot-launcher";
    pub const LOGS_DIR_NAME: &'static str = "logs";
    pub const CACHE_DIR_NAME: &'static str = "cache";
    pub const DEFAULT_CONFIG_NAME: &'static str = "default";
    pub const DEFAULT_NICKNAME: &'static str = "默认配置";
    pub const DEFAULT_VERSION: &'static str = "0.0.0";
    /// Written into `adapter_path` for versions that predate the adapter.
    pub const NO_ADAPTER_SENTINEL: &'static str = "当前配置集的对象实例版本较低，无暂适配器";
    /// Web config editor settings, kept next to `config.toml`.
    pub const EDITOR_SETTINGS_FILE: &'static str = ".config_UI.json";
    pub const EDITOR_HOST: &'static str = "127.0.0.1";
    pub const EDITOR_DEFAULT_PORT: u16 = 8000;
}

/// Configuration for installation process.
pub struct InstallationConfig;

impl InstallationConfig {
    pub const VENV_DIR_NAME: &'static str = "venv";
    pub const BOT_DIR_NAME: &'static str = "MaiBot";
    pub const ADAPTER_DIR_NAME: &'static str = "adapter";
    pub const NAPCAT_DIR_NAME: &'static str = "NapCat";
    pub const MONGODB_DIR_NAME: &'static str = "mongodb";
    pub const WEBUI_DIR_NAME: &'static str = "WebUI";

    pub const NAPCAT_EXE: &'static str = "NapCatWinBootMain.exe";
    pub const NAPCAT_INSTALLER_EXE: &'static str = "NapCatInstaller.exe";
    /// Directories never descended into while searching for installations.
    pub const SEARCH_SKIP_DIRS: &'static [&'static str] = &[
        "venv",
        ".venv",
        "env",
        ".env",
        "__pycache__",
        "node_modules",
        ".git",
    ];
    pub const SEARCH_MAX_DEPTH: usize = 3;

    // Package manager timeouts
    pub const PIP_INSTALL_TIMEOUT: Duration = Duration::from_secs(600);
    pub const NPM_INSTALL_TIMEOUT: Duration = Duration::from_secs(300);
    pub const VENV_CREATION_TIMEOUT: Duration = Duration::from_secs(120);
    pub const TOOL_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

    // Subprocess stop timeout
    pub const PROCESS_STOP_TIMEOUT_MS: u64 = 3000;

    // Download and network
    pub const DOWNLOAD_RETRY_ATTEMPTS: u32 = 3;
    /// Downloads smaller than this share of Content-Length are rejected.
    pub const MIN_DOWNLOAD_RATIO: f64 = 0.98;

    // NapCat installer polling
    pub const NAPCAT_WAIT_ATTEMPTS: u32 = 3;
    pub const NAPCAT_WAIT_INTERVAL: Duration = Duration::from_secs(5);

    /// Estimated minutes per deployed component, shown on the confirm screen.
    pub const MINUTES_PER_COMPONENT: u32 = 2;

    /// Entries kept when updating an instance in place.
    pub const PROTECTED_ENTRIES: &'static [&'static str] = &[
        ".env",
        "config.toml",
        "bot_config.toml",
        "config",
        "data",
        "venv",
        ".venv",
    ];
    pub const PROTECTED_EXTENSIONS: &'static [&'static str] = &["db"];

    /// Port written into a fresh `.env`.
    pub const DEFAULT_BOT_PORT: u16 = 8000;
}

/// Fixed delays between starting dependent processes.
pub struct LaunchTimings;

impl LaunchTimings {
    pub const ADAPTER_TO_BOT: Duration = Duration::from_secs(2);
    pub const NAPCAT: Duration = Duration::from_secs(3);
    pub const MONGODB: Duration = Duration::from_secs(2);
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const USER_AGENT: &'static str = concat!("MaiBot-Launcher/", env!("CARGO_PKG_VERSION"));
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const QUICK_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
    pub const MAX_RETRIES: u32 = 3;
    pub const DOWNLOAD_REQUEST_TIMEOUT: Duration = Duration::from_secs(1800);
    pub const DOWNLOAD_RETRY_DELAY: Duration = Duration::from_secs(3);
    pub const DOWNLOAD_PROGRESS_INTERVAL: Duration = Duration::from_millis(500);
    pub const DOWNLOAD_TEMP_SUFFIX: &'static str = ".part";
    pub const GITHUB_API_BASE: &'static str = "https://api.github.com";
    pub const GITHUB_RELEASES_PER_PAGE: u32 = 100;
    pub const GITHUB_RELEASES_MAX_PAGES: u32 = 3;
    pub const GITHUB_CACHE_TTL: Duration = Duration::from_secs(300);
    pub const CONNECTIVITY_TARGETS: &'static [(&'static str, &'static str)] = &[
        ("github_api", "https://api.github.com"),
        ("github", "https://github.com"),
        ("mirror", "https://pypi.tuna.tsinghua.edu.cn/simple"),
    ];
}

/// Upstream repositories and download locations.
pub struct RepoConfig;

impl RepoConfig {
    pub const MAIBOT_REPO: &'static str = "MaiM-with-u/MaiBot";
    pub const ADAPTER_REPO: &'static str = "MaiM-with-u/MaiBot-Napcat-Adapter";
    pub const NAPCAT_REPO: &'static str = "NapNeko/NapCatQQ";
    pub const WEBUI_REPO: &'static str = "minecraft1024a/MaiMbot-WEBui-adapter";
    pub const SUPPORTED_BRANCHES: &'static [&'static str] = &["main", "dev"];
    pub const VERSION_MENU_LIMIT: usize = 20;
    pub const DESCRIPTION_PREVIEW_CHARS: usize = 100;

    pub const NAPCAT_VERSION: &'static str = "v4.8.90";
    pub const NAPCAT_FRAMEWORK_ASSET: &'static str = "NapCat.Framework.Windows.OneKey.zip";
    pub const NAPCAT_SHELL_ASSET: &'static str = "NapCat.Shell.Windows.OneKey.zip";

    pub const MONGODB_WINDOWS_URL: &'static str =
        "https://fastdl.mongodb.org/windows/mongodb-windows-x86_64-latest.zip";
    pub const MONGODB_LINUX_URL: &'static str =
        "https://fastdl.mongodb.org/linux/mongodb-linux-x86_64-ubuntu2204-7.0.14.tgz";
    pub const MONGODB_MACOS_URL: &'static str =
        "https://fastdl.mongodb.org/osx/mongodb-macos-x86_64-7.0.14.tgz";

    pub const NODE_WINDOWS_MSI: &'static str =
        "https://nodejs.org/dist/v18.19.1/node-v18.19.1-x64.msi";

    /// PyPI indexes tried in order when installing requirements.
    pub const PYPI_MIRRORS: &'static [(&'static str, &'static str)] = &[
        ("tsinghua", "https://pypi.tuna.tsinghua.edu.cn/simple"),
        ("pypi", "https://pypi.org/simple"),
        ("aliyun", "https://mirrors.aliyun.com/pypi/simple"),
        ("douban", "https://pypi.douban.com/simple"),
    ];

    /// Archive URL for a branch head.
    pub fn branch_archive_url(repo: &str, branch: &str) -> String {
        format!("https://github.com/{}/archive/refs/heads/{}.zip", repo, branch)
    }

    /// Archive URL for a tag via codeload.
    pub fn tag_archive_url(repo: &str, tag: &str) -> String {
        format!("https://codeload.github.com/{}/zip/refs/tags/{}", repo, tag)
    }

    /// Release asset URL for NapCat.
    pub fn napcat_asset_url(asset: &str) -> String {
        format!(
            "https://github.com/{}/releases/download/{}/{}",
            Self::NAPCAT_REPO,
            Self::NAPCAT_VERSION,
            asset
        )
    }

    /// MongoDB server archive for the current platform.
    pub fn mongodb_url() -> &'static str {
        if cfg!(windows) {
            Self::MONGODB_WINDOWS_URL
        } else if cfg!(target_os = "macos") {
            Self::MONGODB_MACOS_URL
        } else {
            Self::MONGODB_LINUX_URL
        }
    }
}
