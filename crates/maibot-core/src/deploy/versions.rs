//! Installable versions of the bot and of NapCat.

use crate::config::RepoConfig;
use crate::models::GitHubRelease;
use crate::network::GitHubClient;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::warn;

/// Where a version entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionKind {
    Release,
    Branch,
    /// Branch entry produced without reaching GitHub.
    Offline,
}

/// One selectable version in the deploy wizard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub kind: VersionKind,
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub published_at: Option<String>,
    pub prerelease: bool,
    pub download_url: String,
    pub changelog: String,
    /// Approximate archive size, when known up front.
    pub size: Option<u64>,
}

impl VersionEntry {
    pub fn is_branch(&self) -> bool {
        matches!(self.kind, VersionKind::Branch | VersionKind::Offline)
    }

    fn from_release(release: &GitHubRelease) -> Self {
        let body = release.body.clone().unwrap_or_default();
        let download_url = release
            .zipball_url
            .clone()
            .unwrap_or_else(|| RepoConfig::tag_archive_url(RepoConfig::MAIBOT_REPO, &release.tag_name));
        Self {
            kind: VersionKind::Release,
            name: release.tag_name.clone(),
            display_name: release.title().to_string(),
            description: preview(&body, RepoConfig::DESCRIPTION_PREVIEW_CHARS),
            published_at: release.published_at.clone(),
            prerelease: release.prerelease,
            download_url,
            changelog: body,
            size: None,
        }
    }

    fn branch(name: &str, offline: bool) -> Self {
        Self {
            kind: if offline {
                VersionKind::Offline
            } else {
                VersionKind::Branch
            },
            name: name.to_string(),
            display_name: format!("{} (分支)", name),
            description: if offline {
                format!("{} 分支 - 离线模式", name)
            } else {
                format!("{} 分支 - 开发版本", name)
            },
            published_at: None,
            prerelease: true,
            download_url: RepoConfig::branch_archive_url(RepoConfig::MAIBOT_REPO, name),
            changelog: if offline {
                "离线模式无法获取详细更新日志".to_string()
            } else {
                format!("来自 {} 分支的最新代码", name)
            },
            size: None,
        }
    }
}

/// First `limit` characters of `text`, with `...` when cut.
pub fn preview(text: &str, limit: usize) -> String {
    if text.chars().count() > limit {
        let cut: String = text.chars().take(limit).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

/// Branches first, then newest release first.
fn catalogue_order(a: &VersionEntry, b: &VersionEntry) -> Ordering {
    b.is_branch()
        .cmp(&a.is_branch())
        .then_with(|| b.published_at.cmp(&a.published_at))
}

/// Branch entries only, used when GitHub is unreachable.
pub fn offline_versions() -> Vec<VersionEntry> {
    RepoConfig::SUPPORTED_BRANCHES
        .iter()
        .map(|b| VersionEntry::branch(b, true))
        .collect()
}

/// Build the catalogue from a release listing.
pub fn catalogue_from_releases(releases: &[GitHubRelease]) -> Vec<VersionEntry> {
    let mut entries: Vec<VersionEntry> = RepoConfig::SUPPORTED_BRANCHES
        .iter()
        .map(|b| VersionEntry::branch(b, false))
        .chain(releases.iter().map(VersionEntry::from_release))
        .collect();
    entries.sort_by(catalogue_order);
    entries
}

/// Versions of the bot offered by the deploy wizard.
///
/// Falls back to [`offline_versions`] when the release listing cannot be
/// fetched or served from cache.
pub async fn maibot_versions(github: &GitHubClient, force_refresh: bool) -> Vec<VersionEntry> {
    match github.get_releases(RepoConfig::MAIBOT_REPO, force_refresh).await {
        Ok(releases) => catalogue_from_releases(&releases),
        Err(e) => {
            warn!("Could not list MaiBot releases, offering branches only: {}", e);
            offline_versions()
        }
    }
}

/// The two pinned NapCat builds.
pub fn napcat_versions() -> Vec<VersionEntry> {
    let entry = |variant: &str, label: &str, description: &str, asset: &str, size_mb: u64| {
        VersionEntry {
            kind: VersionKind::Release,
            name: format!("{}-{}", RepoConfig::NAPCAT_VERSION, variant),
            display_name: format!("{} {}", RepoConfig::NAPCAT_VERSION, label),
            description: description.to_string(),
            published_at: Some("2024-12-01T00:00:00Z".to_string()),
            prerelease: false,
            download_url: RepoConfig::napcat_asset_url(asset),
            changelog: format!("{} 稳定版本", RepoConfig::NAPCAT_VERSION),
            size: Some(size_mb * 1024 * 1024),
        }
    };
    vec![
        entry(
            "framework",
            "有头版本",
            "带界面的NapCat版本，适合调试和查看日志",
            RepoConfig::NAPCAT_FRAMEWORK_ASSET,
            50,
        ),
        entry(
            "shell",
            "无头版本",
            "无界面的NapCat版本，适合服务器部署",
            RepoConfig::NAPCAT_SHELL_ASSET,
            45,
        ),
    ]
}
