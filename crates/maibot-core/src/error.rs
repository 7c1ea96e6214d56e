//! Error types for the MaiBot launcher.
//!
//! Every fallible operation in the library returns [`LauncherError`]. The CLI
//! turns these into coloured messages and drops back to the calling menu.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the launcher library.
#[derive(Debug, Error)]
pub enum LauncherError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Rate limited by {service}, retry after {retry_after_secs:?} seconds")]
    RateLimited {
        service: String,
        retry_after_secs: Option<u64>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    // Serialization errors
    #[error("TOML error: {message}")]
    Toml { message: String },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration store errors
    #[error("Configuration not found: {name}")]
    ConfigNotFound { name: String },

    #[error("Configuration already exists: {name}")]
    DuplicateConfig { name: String },

    #[error("Refusing to overwrite unreadable config {path:?}: {message}")]
    ConfigUnreadable { path: PathBuf, message: String },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Invalid version: {version}")]
    InvalidVersion { version: String },

    // Download and deployment errors
    #[error("Download failed for {url}: {message}")]
    DownloadFailed { url: String, message: String },

    #[error("Download cancelled")]
    DownloadCancelled,

    #[error("GitHub API error: {message}")]
    GitHubApi {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Installation failed: {message}")]
    InstallationFailed { message: String },

    #[error("Dependency installation failed: {message}")]
    DependencyFailed { message: String },

    // Process errors
    #[error("Process launch failed for {app}: {message}")]
    LaunchFailed { app: String, message: String },

    #[error("Process not running: {app}")]
    ProcessNotRunning { app: String },

    #[error("Operation cancelled by user")]
    Cancelled,

    #[error("{feature} is not supported on this platform")]
    UnsupportedPlatform { feature: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for launcher operations.
pub type Result<T> = std::result::Result<T, LauncherError>;

impl From<std::io::Error> for LauncherError {
    fn from(err: std::io::Error) -> Self {
        LauncherError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for LauncherError {
    fn from(err: serde_json::Error) -> Self {
        LauncherError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<toml::de::Error> for LauncherError {
    fn from(err: toml::de::Error) -> Self {
        LauncherError::Toml {
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for LauncherError {
    fn from(err: toml::ser::Error) -> Self {
        LauncherError::Toml {
            message: err.to_string(),
        }
    }
}

impl From<zip::result::ZipError> for LauncherError {
    fn from(err: zip::result::ZipError) -> Self {
        LauncherError::InstallationFailed {
            message: format!("Invalid zip archive: {}", err),
        }
    }
}

impl From<reqwest::Error> for LauncherError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LauncherError::Timeout(std::time::Duration::from_secs(0))
        } else {
            LauncherError::Network {
                message: err.to_string(),
                cause: Some(err.to_string()),
            }
        }
    }
}

impl LauncherError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        LauncherError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a validation error for a named field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        LauncherError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LauncherError::Network { .. }
                | LauncherError::Timeout(_)
                | LauncherError::RateLimited { .. }
        )
    }

    /// Check if the user or a cancellation flag stopped the operation.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            LauncherError::Cancelled | LauncherError::DownloadCancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LauncherError::ConfigNotFound {
            name: "instance_1".into(),
        };
        assert_eq!(err.to_string(), "Configuration not found: instance_1");
    }

    #[test]
    fn test_retryable_errors() {
        assert!(LauncherError::Timeout(std::time::Duration::from_secs(5)).is_retryable());
        assert!(LauncherError::RateLimited {
            service: "GitHub".into(),
            retry_after_secs: None
        }
        .is_retryable());
        assert!(!LauncherError::InvalidVersion {
            version: "abc".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_cancelled_errors() {
        assert!(LauncherError::Cancelled.is_cancelled());
        assert!(LauncherError::DownloadCancelled.is_cancelled());
        assert!(!LauncherError::Other("x".into()).is_cancelled());
    }

    #[test]
    fn test_io_with_path() {
        let err = LauncherError::io_with_path(
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            "/tmp/missing",
        );
        match err {
            LauncherError::Io { path, .. } => {
                assert_eq!(path, Some(PathBuf::from("/tmp/missing")))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
