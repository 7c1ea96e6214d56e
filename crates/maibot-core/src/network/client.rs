//! Shared HTTP client for GitHub, release downloads and mirror checks.
//!
//! Requests to the GitHub REST API carry the v3 `Accept` header, and the
//! quota GitHub reports in `x-ratelimit-*` is remembered so an exhausted
//! quota can be told apart from a real 403. Proxies from
//! `HTTP_PROXY`/`HTTPS_PROXY` are picked up by reqwest itself.

use crate::config::{NetworkConfig, RepoConfig};
use crate::{LauncherError, Result};
use reqwest::{header, Client, Response, StatusCode};
use std::sync::RwLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";

/// Which upstream a URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Host {
    /// `api.github.com`, the only host with a request quota.
    GitHubApi,
    /// Archive and asset downloads from GitHub.
    GitHub,
    /// A PyPI index from [`RepoConfig::PYPI_MIRRORS`].
    Mirror,
    Other,
}

impl Host {
    pub fn of(url: &str) -> Self {
        let Some(host) = host_of(url) else {
            return Host::Other;
        };
        match host.as_str() {
            "api.github.com" => Host::GitHubApi,
            "github.com" | "codeload.github.com" | "objects.githubusercontent.com" => Host::GitHub,
            _ if RepoConfig::PYPI_MIRRORS
                .iter()
                .any(|(_, index)| host_of(index).as_deref() == Some(host.as_str())) =>
            {
                Host::Mirror
            }
            _ => Host::Other,
        }
    }

    fn service(&self) -> &'static str {
        match self {
            Host::GitHubApi | Host::GitHub => "GitHub",
            Host::Mirror => "PyPI mirror",
            Host::Other => "remote host",
        }
    }
}

fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url).ok()?.host_str().map(str::to_string)
}

/// GitHub API quota as of the last API response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GitHubQuota {
    pub remaining: u64,
    /// Unix timestamp when the quota refills.
    pub reset_at: u64,
}

impl GitHubQuota {
    fn from_headers(headers: &header::HeaderMap) -> Option<Self> {
        let value = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
        };
        Some(Self {
            remaining: value("x-ratelimit-remaining")?,
            reset_at: value("x-ratelimit-reset").unwrap_or(0),
        })
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Time left until the quota refills, if that is in the future.
    pub fn reset_in(&self) -> Option<Duration> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
        (self.reset_at > now).then(|| Duration::from_secs(self.reset_at - now))
    }
}

/// reqwest client with the launcher's user agent and timeout.
pub struct HttpClient {
    client: Client,
    timeout: Duration,
    github_quota: RwLock<Option<GitHubQuota>>,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(NetworkConfig::REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| LauncherError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                cause: None,
            })?;

        Ok(Self {
            client,
            timeout,
            github_quota: RwLock::new(None),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Last GitHub API quota seen, if any API call was made.
    pub fn github_quota(&self) -> Option<GitHubQuota> {
        match self.github_quota.read() {
            Ok(quota) => *quota,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// GET `url`. A 429 becomes [`LauncherError::RateLimited`]; other statuses
    /// are left to the caller.
    pub async fn get(&self, url: &str) -> Result<Response> {
        let host = Host::of(url);
        let mut request = self.client.get(url);
        if host == Host::GitHubApi {
            request = request.header(header::ACCEPT, GITHUB_ACCEPT);
        }
        let response = request.send().await.map_err(|e| request_error("GET", url, e))?;
        self.observe(host, response)
    }

    /// HEAD `url` with its own timeout. Used by the connectivity check.
    pub async fn head(&self, url: &str, timeout: Duration) -> Result<Response> {
        let response = self
            .client
            .head(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| request_error("HEAD", url, e))?;
        self.observe(Host::of(url), response)
    }

    /// Statuses worth another attempt.
    pub fn is_retryable_status(status: StatusCode) -> bool {
        matches!(status.as_u16(), 408 | 429 | 500 | 502 | 503 | 504)
    }

    fn observe(&self, host: Host, response: Response) -> Result<Response> {
        if host == Host::GitHubApi {
            if let Some(quota) = GitHubQuota::from_headers(response.headers()) {
                debug!("GitHub API quota: {} remaining", quota.remaining);
                if quota.is_exhausted() {
                    warn!("GitHub API quota exhausted, resets in {:?}", quota.reset_in());
                }
                match self.github_quota.write() {
                    Ok(mut slot) => *slot = Some(quota),
                    Err(poisoned) => *poisoned.into_inner() = Some(quota),
                }
            }
        }

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            return Err(LauncherError::RateLimited {
                service: host.service().to_string(),
                retry_after_secs: retry_after,
            });
        }
        Ok(response)
    }
}

fn request_error(method: &str, url: &str, err: reqwest::Error) -> LauncherError {
    if err.is_timeout() {
        return LauncherError::Timeout(NetworkConfig::REQUEST_TIMEOUT);
    }
    LauncherError::Network {
        message: format!("{} {} failed", method, url),
        cause: Some(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    #[test]
    fn test_host_classification() {
        assert_eq!(
            Host::of("https://api.github.com/repos/MaiM-with-u/MaiBot/releases"),
            Host::GitHubApi
        );
        assert_eq!(
            Host::of("https://codeload.github.com/MaiM-with-u/MaiBot/zip/refs/tags/0.8.1"),
            Host::GitHub
        );
        assert_eq!(Host::of("https://github.com/NapNeko/NapCatQQ"), Host::GitHub);
        assert_eq!(Host::of("https://pypi.tuna.tsinghua.edu.cn/simple"), Host::Mirror);
        assert_eq!(Host::of("https://mirrors.aliyun.com/pypi/simple"), Host::Mirror);
        assert_eq!(Host::of("https://fastdl.mongodb.org/linux/x.tgz"), Host::Other);
        assert_eq!(Host::of("not a url"), Host::Other);
    }

    #[test]
    fn test_quota_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(GitHubQuota::from_headers(&headers).is_none());

        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("1"));
        let quota = GitHubQuota::from_headers(&headers).unwrap();
        assert!(quota.is_exhausted());
        // A reset time in the past has nothing left to wait for.
        assert!(quota.reset_in().is_none());

        let future = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() + 600;
        let quota = GitHubQuota {
            remaining: 12,
            reset_at: future,
        };
        assert!(!quota.is_exhausted());
        assert!(quota.reset_in().unwrap() <= Duration::from_secs(600));
    }

    #[test]
    fn test_retryable_status_codes() {
        assert!(HttpClient::is_retryable_status(StatusCode::REQUEST_TIMEOUT));
        assert!(HttpClient::is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(HttpClient::is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(!HttpClient::is_retryable_status(StatusCode::OK));
        assert!(!HttpClient::is_retryable_status(StatusCode::FORBIDDEN));
    }

    #[test]
    fn test_client_starts_without_quota() {
        let client = HttpClient::with_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(client.timeout(), Duration::from_secs(5));
        assert!(client.github_quota().is_none());
    }
}
