//! GitHub API client with release and branch listings.
//!
//! Provides:
//! - Releases (paginated) and branches for a repository
//! - Three-tier caching: in-memory → disk → network
//! - Offline-first strategy with stale data fallback
//! - Rate limit handling

use crate::config::NetworkConfig;
use crate::models::{GitHubBranch, GitHubCacheFile, GitHubRelease};
use crate::network::client::HttpClient;
use crate::network::retry::{retry_async, RetryConfig};
use crate::{LauncherError, Result};
use chrono::{DateTime, Utc};
use mini_moka::sync::Cache;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Two-level cache for one kind of listing.
struct ListingCache<T: Clone + Send + Sync + 'static> {
    kind: &'static str,
    memory: Cache<String, Vec<T>>,
    cache_dir: PathBuf,
    ttl: Duration,
}

impl<T> ListingCache<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn new(kind: &'static str, cache_dir: PathBuf, ttl: Duration) -> Self {
        Self {
            kind,
            memory: Cache::builder().time_to_live(ttl).max_capacity(16).build(),
            cache_dir,
            ttl,
        }
    }

    fn get_memory(&self, repo: &str) -> Option<Vec<T>> {
        self.memory.get(&repo.to_string())
    }

    fn set_memory(&self, repo: &str, items: Vec<T>) {
        self.memory.insert(repo.to_string(), items);
    }

    fn get_disk(&self, repo: &str) -> Option<GitHubCacheFile<T>> {
        let path = self.disk_path(repo);
        let contents = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!("Ignoring unreadable cache {}: {}", path.display(), e);
                None
            }
        }
    }

    fn set_disk(&self, repo: &str, items: &[T]) -> Result<()> {
        std::fs::create_dir_all(&self.cache_dir)
            .map_err(|e| LauncherError::io_with_path(e, &self.cache_dir))?;

        let cache = GitHubCacheFile {
            last_fetched: Utc::now().to_rfc3339(),
            ttl: self.ttl.as_secs(),
            items: items.to_vec(),
        };
        let path = self.disk_path(repo);
        std::fs::write(&path, serde_json::to_string_pretty(&cache)?)
            .map_err(|e| LauncherError::io_with_path(e, path))
    }

    fn store(&self, repo: &str, items: &[T]) {
        self.set_memory(repo, items.to_vec());
        if let Err(e) = self.set_disk(repo, items) {
            warn!("Failed to write {} cache for {}: {}", self.kind, repo, e);
        }
    }

    fn invalidate(&self, repo: &str) {
        self.memory.invalidate(&repo.to_string());
        let _ = std::fs::remove_file(self.disk_path(repo));
    }

    fn disk_path(&self, repo: &str) -> PathBuf {
        self.cache_dir
            .join(format!("github-{}-{}.json", self.kind, repo.replace('/', "-")))
    }
}

/// Whether a disk cache entry is still inside its TTL.
pub fn is_cache_fresh<T>(cache: &GitHubCacheFile<T>) -> bool {
    DateTime::parse_from_rfc3339(&cache.last_fetched)
        .map(|fetched| Utc::now().signed_duration_since(fetched).num_seconds() < cache.ttl as i64)
        .unwrap_or(false)
}

/// GitHub API client.
pub struct GitHubClient {
    http: Arc<HttpClient>,
    releases: ListingCache<GitHubRelease>,
    branches: ListingCache<GitHubBranch>,
    offline: AtomicBool,
    fetch_lock: Mutex<()>,
}

impl GitHubClient {
    /// Create a client caching under `cache_dir`.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_ttl(cache_dir, NetworkConfig::GITHUB_CACHE_TTL)
    }

    pub fn with_ttl(cache_dir: impl Into<PathBuf>, ttl: Duration) -> Result<Self> {
        let cache_dir = cache_dir.into();
        Ok(Self {
            http: Arc::new(HttpClient::new()?),
            releases: ListingCache::new("releases", cache_dir.clone(), ttl),
            branches: ListingCache::new("branches", cache_dir, ttl),
            offline: AtomicBool::new(false),
            fetch_lock: Mutex::new(()),
        })
    }

    /// In offline mode only cached listings are served.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.releases.cache_dir
    }

    /// Releases for `repo`, newest first as returned by the API.
    ///
    /// Order of lookups:
    /// 1. In-memory cache
    /// 2. Disk cache within its TTL
    /// 3. Network
    /// 4. Stale disk cache when the network fails
    ///
    /// `force_refresh` skips steps 1 and 2.
    pub async fn get_releases(&self, repo: &str, force_refresh: bool) -> Result<Vec<GitHubRelease>> {
        self.lookup(&self.releases, repo, force_refresh, || self.fetch_releases(repo))
            .await
    }

    /// Branches for `repo`.
    pub async fn get_branches(&self, repo: &str, force_refresh: bool) -> Result<Vec<GitHubBranch>> {
        self.lookup(&self.branches, repo, force_refresh, || self.fetch_branches(repo))
            .await
    }

    /// Drop both cached listings for `repo`.
    pub fn invalidate_cache(&self, repo: &str) {
        self.releases.invalidate(repo);
        self.branches.invalidate(repo);
    }

    async fn lookup<T, F, Fut>(
        &self,
        cache: &ListingCache<T>,
        repo: &str,
        force_refresh: bool,
        fetch: F,
    ) -> Result<Vec<T>>
    where
        T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Vec<T>>>,
    {
        if !force_refresh {
            if let Some(items) = cache.get_memory(repo) {
                debug!("GitHub {} cache hit (memory) for {}", cache.kind, repo);
                return Ok(items);
            }
        }

        let disk = cache.get_disk(repo);
        if let Some(disk) = &disk {
            if !force_refresh && is_cache_fresh(disk) {
                debug!("GitHub {} cache hit (disk) for {}", cache.kind, repo);
                cache.set_memory(repo, disk.items.clone());
                return Ok(disk.items.clone());
            }
        }

        if self.is_offline() {
            return match disk {
                Some(disk) => Ok(disk.items),
                None => Err(LauncherError::Network {
                    message: format!("offline and no cached {} for {}", cache.kind, repo),
                    cause: None,
                }),
            };
        }

        match fetch().await {
            Ok(items) => {
                cache.store(repo, &items);
                Ok(items)
            }
            Err(e) => match disk {
                Some(disk) => {
                    warn!(
                        "Fetching {} for {} failed, using stale cache: {}",
                        cache.kind, repo, e
                    );
                    cache.set_memory(repo, disk.items.clone());
                    Ok(disk.items)
                }
                None => Err(e),
            },
        }
    }

    async fn fetch_releases(&self, repo: &str) -> Result<Vec<GitHubRelease>> {
        let _guard = self.fetch_lock.lock().await;
        let per_page = NetworkConfig::GITHUB_RELEASES_PER_PAGE;
        let mut all = Vec::new();

        for page in 1..=NetworkConfig::GITHUB_RELEASES_MAX_PAGES {
            let url = format!(
                "{}/repos/{}/releases?per_page={}&page={}",
                NetworkConfig::GITHUB_API_BASE,
                repo,
                per_page,
                page
            );
            let releases: Vec<GitHubRelease> = self.get_json(&url).await?;
            let count = releases.len();
            all.extend(releases);
            if count < per_page as usize {
                break;
            }
        }

        info!("Fetched {} releases from GitHub for {}", all.len(), repo);
        Ok(all)
    }

    async fn fetch_branches(&self, repo: &str) -> Result<Vec<GitHubBranch>> {
        let _guard = self.fetch_lock.lock().await;
        let url = format!(
            "{}/repos/{}/branches?per_page={}",
            NetworkConfig::GITHUB_API_BASE,
            repo,
            NetworkConfig::GITHUB_RELEASES_PER_PAGE
        );
        let branches: Vec<GitHubBranch> = self.get_json(&url).await?;
        info!("Fetched {} branches from GitHub for {}", branches.len(), repo);
        Ok(branches)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let retry_config = RetryConfig::new()
            .with_max_attempts(NetworkConfig::MAX_RETRIES)
            .with_base_delay(Duration::from_secs(2));

        let (result, stats) = retry_async(
            &retry_config,
            || self.http.get(url),
            LauncherError::is_retryable,
        )
        .await;
        if stats.attempts > 1 {
            debug!("GitHub request {} needed {} attempts", url, stats.attempts);
        }

        let response = result?;
        let status = response.status();
        let quota = self.http.github_quota();
        if status == StatusCode::FORBIDDEN && quota.is_some_and(|q| q.is_exhausted()) {
            return Err(LauncherError::RateLimited {
                service: "GitHub".to_string(),
                retry_after_secs: quota.and_then(|q| q.reset_in()).map(|d| d.as_secs()),
            });
        }
        if !status.is_success() {
            return Err(LauncherError::GitHubApi {
                message: format!("GitHub API returned {} for {}", status, url),
                status_code: Some(status.as_u16()),
            });
        }

        response.json().await.map_err(|e| LauncherError::Json {
            message: format!("Failed to parse GitHub response: {}", e),
            source: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn release(tag: &str) -> GitHubRelease {
        serde_json::from_value(serde_json::json!({
            "tag_name": tag,
            "name": format!("MaiBot {}", tag),
            "published_at": "2025-06-01T00:00:00Z",
            "zipball_url": format!("https://api.github.com/repos/MaiM-with-u/MaiBot/zipball/{}", tag),
        }))
        .unwrap()
    }

    #[test]
    fn test_releases_disk_cache() {
        let temp_dir = TempDir::new().unwrap();
        let cache: ListingCache<GitHubRelease> =
            ListingCache::new("releases", temp_dir.path().to_path_buf(), Duration::from_secs(300));

        cache.set_disk("MaiM-with-u/MaiBot", &[release("0.7.0")]).unwrap();
        assert!(temp_dir
            .path()
            .join("github-releases-MaiM-with-u-MaiBot.json")
            .exists());

        let cached = cache.get_disk("MaiM-with-u/MaiBot").unwrap();
        assert_eq!(cached.items.len(), 1);
        assert_eq!(cached.items[0].tag_name, "0.7.0");
        assert!(is_cache_fresh(&cached));
    }

    #[test]
    fn test_stale_cache_detection() {
        let stale = GitHubCacheFile::<GitHubRelease> {
            last_fetched: "2020-01-01T00:00:00+00:00".to_string(),
            ttl: 300,
            items: vec![],
        };
        assert!(!is_cache_fresh(&stale));

        let garbage = GitHubCacheFile::<GitHubRelease> {
            last_fetched: "yesterday".to_string(),
            ttl: 300,
            items: vec![],
        };
        assert!(!is_cache_fresh(&garbage));
    }

    #[test]
    fn test_invalidate_removes_both_levels() {
        let temp_dir = TempDir::new().unwrap();
        let cache: ListingCache<GitHubRelease> =
            ListingCache::new("releases", temp_dir.path().to_path_buf(), Duration::from_secs(300));

        cache.store("owner/repo", &[release("0.6.3")]);
        assert!(cache.get_memory("owner/repo").is_some());

        cache.invalidate("owner/repo");
        assert!(cache.get_memory("owner/repo").is_none());
        assert!(cache.get_disk("owner/repo").is_none());
    }

    #[tokio::test]
    async fn test_offline_uses_stale_disk_cache() {
        let temp_dir = TempDir::new().unwrap();
        let client = GitHubClient::new(temp_dir.path()).unwrap();
        client.set_offline(true);

        let stale = GitHubCacheFile {
            last_fetched: "2020-01-01T00:00:00+00:00".to_string(),
            ttl: 300,
            items: vec![release("0.5.0")],
        };
        std::fs::write(
            temp_dir.path().join("github-releases-owner-repo.json"),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();

        let releases = client.get_releases("owner/repo", false).await.unwrap();
        assert_eq!(releases[0].tag_name, "0.5.0");
    }

    #[tokio::test]
    async fn test_offline_without_cache_fails() {
        let temp_dir = TempDir::new().unwrap();
        let client = GitHubClient::new(temp_dir.path()).unwrap();
        client.set_offline(true);

        let err = client.get_branches("owner/repo", false).await.unwrap_err();
        assert!(matches!(err, LauncherError::Network { .. }));
    }
}
