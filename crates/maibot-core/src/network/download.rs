//! Download manager with progress tracking and cancellation support.
//!
//! Provides:
//! - Download with progress reports over a channel
//! - Cancellation support
//! - Retry logic for transient failures
//! - A completeness check against `Content-Length`
//! - Atomic file operations (temp file → final)

use crate::config::{InstallationConfig, NetworkConfig};
use crate::network::client::HttpClient;
use crate::network::retry::{retry_async, RetryConfig};
use crate::{LauncherError, Result};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Progress information for a download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    pub bytes_downloaded: u64,
    /// Total bytes, when the server sent `Content-Length`.
    pub total_bytes: Option<u64>,
    pub speed_bytes_per_sec: f64,
    /// Percentage complete (0-100).
    pub percent: Option<f64>,
    pub eta_seconds: Option<f64>,
}

impl DownloadProgress {
    fn new(bytes_downloaded: u64, total_bytes: Option<u64>, speed: f64) -> Self {
        let percent = total_bytes.map(|total| {
            if total > 0 {
                (bytes_downloaded as f64 / total as f64) * 100.0
            } else {
                0.0
            }
        });

        let eta_seconds = total_bytes
            .filter(|total| speed > 0.0 && bytes_downloaded < *total)
            .map(|total| (total - bytes_downloaded) as f64 / speed);

        Self {
            bytes_downloaded,
            total_bytes,
            speed_bytes_per_sec: speed,
            percent,
            eta_seconds,
        }
    }

    /// `12.3 MB / 45.6 MB (27%)`, or just the received size.
    pub fn summary(&self) -> String {
        match (self.total_bytes, self.percent) {
            (Some(total), Some(percent)) => format!(
                "{} / {} ({:.0}%)",
                format_bytes(self.bytes_downloaded),
                format_bytes(total),
                percent
            ),
            _ => format_bytes(self.bytes_downloaded),
        }
    }
}

/// Human-readable byte count.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Reject a body that stopped short of the advertised length.
pub fn check_completeness(url: &str, received: u64, expected: Option<u64>) -> Result<()> {
    let Some(expected) = expected.filter(|e| *e > 0) else {
        return Ok(());
    };
    let ratio = received as f64 / expected as f64;
    if ratio < InstallationConfig::MIN_DOWNLOAD_RATIO {
        return Err(LauncherError::DownloadFailed {
            url: url.to_string(),
            message: format!(
                "incomplete download: received {} of {} bytes",
                received, expected
            ),
        });
    }
    Ok(())
}

fn temp_path_for(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_os_string();
    name.push(NetworkConfig::DOWNLOAD_TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Download manager for archive downloads.
pub struct DownloadManager {
    http: Arc<HttpClient>,
    cancelled: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl DownloadManager {
    pub fn new() -> Result<Self> {
        let http = HttpClient::with_timeout(NetworkConfig::DOWNLOAD_REQUEST_TIMEOUT)?;
        Ok(Self::with_client(Arc::new(http)))
    }

    pub fn with_client(http: Arc<HttpClient>) -> Self {
        Self {
            http,
            cancelled: AtomicBool::new(false),
            last_error: RwLock::new(None),
        }
    }

    /// Request cancellation of the current download.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn reset_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .read()
            .map(|e| e.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    fn set_error(&self, message: Option<String>) {
        match self.last_error.write() {
            Ok(mut slot) => *slot = message,
            Err(poisoned) => *poisoned.into_inner() = message,
        }
    }

    /// Download `url` to `destination`, returning the number of bytes written.
    pub async fn download(
        &self,
        url: &str,
        destination: &Path,
        progress_tx: Option<mpsc::Sender<DownloadProgress>>,
    ) -> Result<u64> {
        self.reset_cancel();
        self.download_once(url, destination, progress_tx).await
    }

    /// Download with the fixed-interval retry policy.
    pub async fn download_with_retry(
        &self,
        url: &str,
        destination: &Path,
        attempts: u32,
        progress_tx: Option<mpsc::Sender<DownloadProgress>>,
    ) -> Result<u64> {
        self.reset_cancel();
        let retry_config = RetryConfig::for_downloads().with_max_attempts(attempts);

        let (result, stats) = retry_async(
            &retry_config,
            || self.download_once(url, destination, progress_tx.clone()),
            |e: &LauncherError| {
                !self.was_cancelled() && (e.is_retryable() || matches!(e, LauncherError::DownloadFailed { .. }))
            },
        )
        .await;

        if stats.attempts > 1 {
            debug!(
                "Download of {} took {} attempts (waited {:?})",
                url, stats.attempts, stats.total_delay
            );
        }
        result
    }

    async fn download_once(
        &self,
        url: &str,
        destination: &Path,
        progress_tx: Option<mpsc::Sender<DownloadProgress>>,
    ) -> Result<u64> {
        self.set_error(None);

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io_with_path(e, parent))?;
        }

        let temp_path = temp_path_for(destination);
        let result = match self.stream_to(url, &temp_path, progress_tx).await {
            Ok(bytes) => tokio::fs::rename(&temp_path, destination)
                .await
                .map(|_| bytes)
                .map_err(|e| LauncherError::io_with_path(e, destination)),
            Err(e) => Err(e),
        };

        match result {
            Ok(bytes) => {
                info!("Downloaded {} to {}", format_bytes(bytes), destination.display());
                Ok(bytes)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                warn!("Download of {} failed: {}", url, e);
                self.set_error(Some(e.to_string()));
                Err(e)
            }
        }
    }

    async fn stream_to(
        &self,
        url: &str,
        temp_path: &Path,
        progress_tx: Option<mpsc::Sender<DownloadProgress>>,
    ) -> Result<u64> {
        let response = self.http.get(url).await?;
        let status = response.status();
        if !status.is_success() {
            let message = format!("server returned {}", status);
            return Err(if HttpClient::is_retryable_status(status) {
                LauncherError::Network {
                    message: format!("{}: {}", url, message),
                    cause: None,
                }
            } else {
                LauncherError::DownloadFailed {
                    url: url.to_string(),
                    message,
                }
            });
        }

        let total_bytes = response.content_length();
        let mut file = tokio::fs::File::create(temp_path)
            .await
            .map_err(|e| LauncherError::io_with_path(e, temp_path))?;

        let report = |bytes: u64, speed: f64| {
            let tx = progress_tx.clone();
            async move {
                if let Some(tx) = tx {
                    let _ = tx.send(DownloadProgress::new(bytes, total_bytes, speed)).await;
                }
            }
        };

        let mut bytes_downloaded: u64 = 0;
        let mut speed = SpeedTracker::new();
        let mut last_update = Instant::now();
        let mut stream = response.bytes_stream();
        report(0, 0.0).await;

        while let Some(chunk) = stream.next().await {
            if self.was_cancelled() {
                return Err(LauncherError::DownloadCancelled);
            }
            let chunk = chunk.map_err(|e| LauncherError::Network {
                message: format!("Error reading download stream from {}", url),
                cause: Some(e.to_string()),
            })?;

            file.write_all(&chunk)
                .await
                .map_err(|e| LauncherError::io_with_path(e, temp_path))?;
            bytes_downloaded += chunk.len() as u64;
            speed.record(chunk.len() as u64);

            if last_update.elapsed() >= NetworkConfig::DOWNLOAD_PROGRESS_INTERVAL {
                report(bytes_downloaded, speed.speed()).await;
                last_update = Instant::now();
            }
        }

        file.flush()
            .await
            .map_err(|e| LauncherError::io_with_path(e, temp_path))?;
        drop(file);

        check_completeness(url, bytes_downloaded, total_bytes)?;
        report(bytes_downloaded, speed.speed()).await;
        Ok(bytes_downloaded)
    }
}

/// Average throughput since the first byte.
struct SpeedTracker {
    start_time: Instant,
    total_bytes: u64,
}

impl SpeedTracker {
    fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_bytes: 0,
        }
    }

    fn record(&mut self, bytes: u64) {
        self.total_bytes += bytes;
    }

    fn speed(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.total_bytes as f64 / elapsed
        } else {
            0.0
        }
    }
}
