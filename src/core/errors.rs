// Custom error types for the annotation pipeline
//
// Each service gets its own thiserror enum. Every error carries a stable
// machine-readable kind string next to the human-readable Display detail,
// so the presentation layer can branch without string-matching messages.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Directory scanner errors
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid or non-existent path: '{}'", .0.display())]
    InvalidPath(PathBuf),

    #[error("directory not accessible: '{}': {}", .path.display(), .source)]
    NotAccessible {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    pub fn kind(&self) -> &'static str {
        // A directory that exists but cannot be read reports the same kind
        // as one that does not exist
        "INVALID_PATH"
    }
}

/// Model catalog errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("inference service unreachable at {url}: {source}")]
    ServiceUnavailable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("model catalog response malformed: {0}")]
    InvalidResponse(String),
}

impl CatalogError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ServiceUnavailable { .. } => "INFERENCE_SERVICE_UNAVAILABLE",
            Self::InvalidResponse(_) => "INFERENCE_FAILED",
        }
    }
}

/// Description generator errors
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("file does not exist: '{}'", .0.display())]
    FileNotFound(PathBuf),

    #[error("cannot read or write file: '{}'", .0.display())]
    FileAccessDenied(PathBuf),

    #[error("model '{model}' rejected the request: {detail}")]
    ModelError { model: String, detail: String },

    #[error("inference request failed: {0}")]
    InferenceFailed(String),

    #[error("generation cancelled")]
    Cancelled,
}

impl GenerateError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FileNotFound(_) => "FILE_NOT_FOUND",
            Self::FileAccessDenied(_) => "FILE_ACCESS_DENIED",
            Self::ModelError { .. } => "MODEL_ERROR",
            Self::InferenceFailed(_) => "INFERENCE_FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

/// Metadata writer errors
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("failed to spawn metadata writer '{binary}': {source}")]
    SpawnFailed {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("metadata writer did not finish within {timeout:?}")]
    TimedOut { timeout: Duration },

    #[error("metadata writer exited with code {code:?}: {stderr}")]
    ExitedNonZero { code: Option<i32>, stderr: String },
}

impl WriterError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SpawnFailed { .. } => "WRITER_SPAWN_FAILED",
            Self::TimedOut { .. } => "WRITER_TIMED_OUT",
            Self::ExitedNonZero { .. } => "WRITER_EXITED_NON_ZERO",
        }
    }
}

/// Per-item pipeline errors (generate or write)
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error(transparent)]
    Write(#[from] WriterError),
}

impl ProcessError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Generate(e) => e.kind(),
            Self::Write(e) => e.kind(),
        }
    }

    /// True when the item was aborted by cancellation rather than failing.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Generate(GenerateError::Cancelled))
    }
}

/// Batch orchestration errors
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("a batch run is already active")]
    AlreadyRunning,

    #[error("batch run interrupted: {0}")]
    Interrupted(String),
}

impl BatchError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AlreadyRunning => "BATCH_ALREADY_RUNNING",
            Self::Interrupted(_) => "INTERRUPTED",
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid inference service URL: '{0}' (expected http:// or https://)")]
    InvalidServiceUrl(String),

    #[error("writer timeout must be > 0 seconds")]
    InvalidWriterTimeout,

    #[error("metadata writer binary path is empty")]
    EmptyWriterBinary,

    #[error("environment variable parsing failed: {0}")]
    EnvVarError(String),
}

// Convenience type aliases for Results
pub type ScanResult<T> = Result<T, ScanError>;
pub type CatalogResult<T> = Result<T, CatalogError>;
pub type GenerateResult<T> = Result<T, GenerateError>;
pub type WriterResult<T> = Result<T, WriterError>;
pub type ProcessResult<T> = Result<T, ProcessError>;
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings_are_stable() {
        assert_eq!(ScanError::InvalidPath(PathBuf::from("/x")).kind(), "INVALID_PATH");
        assert_eq!(
            GenerateError::FileNotFound(PathBuf::from("/x")).kind(),
            "FILE_NOT_FOUND"
        );
        assert_eq!(
            GenerateError::FileAccessDenied(PathBuf::from("/x")).kind(),
            "FILE_ACCESS_DENIED"
        );
        assert_eq!(
            GenerateError::ModelError {
                model: "llava".into(),
                detail: "not found".into()
            }
            .kind(),
            "MODEL_ERROR"
        );
        assert_eq!(GenerateError::Cancelled.kind(), "CANCELLED");
        assert_eq!(
            WriterError::TimedOut {
                timeout: Duration::from_secs(8)
            }
            .kind(),
            "WRITER_TIMED_OUT"
        );
        assert_eq!(BatchError::Interrupted("loop panicked".into()).kind(), "INTERRUPTED");
    }

    #[test]
    fn test_process_error_delegates_kind() {
        let e = ProcessError::from(WriterError::ExitedNonZero {
            code: Some(1),
            stderr: "bad tag".into(),
        });
        assert_eq!(e.kind(), "WRITER_EXITED_NON_ZERO");
        assert!(!e.is_cancelled());

        let e = ProcessError::from(GenerateError::Cancelled);
        assert!(e.is_cancelled());
    }
}
