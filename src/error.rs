use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single fetch attempt.
///
/// Every step of an attempt (page creation, navigation, extraction) returns
/// this type so the retry loop can inspect the kind instead of unwinding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The browser could not be launched or reached
    #[error("Browser launch failed: {0}")]
    Launch(String),

    /// A browser command failed (page creation, header setup, script evaluation)
    #[error("Browser error: {0}")]
    Browser(String),

    /// Navigation to the target failed
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// Navigation did not settle within the configured timeout
    #[error("Navigation timeout of {0} ms exceeded")]
    Timeout(u64),

    /// The rendered document could not be turned into a content record
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// The crawl was cancelled while the attempt was in flight
    #[error("Crawl cancelled")]
    Cancelled,

    /// The engine was shut down and no longer issues pages
    #[error("Browser session manager is shut down")]
    ShutDown,
}

impl FetchError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::Cancelled | FetchError::ShutDown)
    }

    /// Short machine-friendly label, used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Launch(_) => "launch",
            FetchError::Browser(_) => "browser",
            FetchError::Navigation(_) => "navigation",
            FetchError::Timeout(_) => "timeout",
            FetchError::Extraction(_) => "extraction",
            FetchError::Cancelled => "cancelled",
            FetchError::ShutDown => "shutdown",
        }
    }
}

/// Errors raised while serializing or writing results.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to serialize results: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write configuration file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(FetchError::Timeout(30_000).is_retryable());
        assert!(FetchError::Extraction("bad selector".into()).is_retryable());
        assert!(FetchError::Navigation("net::ERR_NAME_NOT_RESOLVED".into()).is_retryable());
        assert!(!FetchError::Cancelled.is_retryable());
        assert!(!FetchError::ShutDown.is_retryable());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            FetchError::Timeout(5000).to_string(),
            "Navigation timeout of 5000 ms exceeded"
        );
        assert_eq!(
            ExportError::UnsupportedFormat("xml".into()).to_string(),
            "Unsupported format: xml"
        );
    }
}
