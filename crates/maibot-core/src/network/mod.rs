//! Network utilities for HTTP operations and retries.
//!
//! This module provides:
//! - HTTP client that tracks the GitHub API quota
//! - Retry logic with exponential backoff and jitter
//! - GitHub API integration with offline-first caching
//! - Download manager with progress tracking
//! - Connectivity checks

mod client;
mod connectivity;
mod download;
mod github;
mod retry;

pub use client::{GitHubQuota, Host, HttpClient};
pub use connectivity::{check_connectivity, Connectivity};
pub use download::{check_completeness, format_bytes, DownloadManager, DownloadProgress};
pub use github::{is_cache_fresh, GitHubClient};
pub use retry::{is_retryable_error, retry_async, RetryConfig, RetryStats};
