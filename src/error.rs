use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while processing a single mod archive.
///
/// A missing localization file is not represented here: it is a skip
/// condition handled by the pipeline, not a failure.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The input archive is unreadable, corrupt or not a zip file
    #[error("Failed to read archive {path}: {reason}")]
    ArchiveRead { path: PathBuf, reason: String },

    /// The output archive could not be written
    #[error("Failed to write archive {path}: {reason}")]
    ArchiveWrite { path: PathBuf, reason: String },

    /// Text is not a JSON object, even after comments and fences were stripped
    #[error("Malformed JSON: {0}")]
    MalformedJson(String),

    /// Network failure, non-success HTTP status or empty reply
    #[error("Translation request failed: {0}")]
    TranslationRequest(String),

    /// The translation service rejected the API key
    #[error("Translation service rejected credentials: {0}")]
    TranslationAuth(String),

    /// Translated keys differ from the source keys under the strict policy
    #[error("Translated key set differs from source (missing: {missing:?}, extra: {extra:?})")]
    KeySetMismatch {
        missing: Vec<String>,
        extra: Vec<String>,
    },

    /// Scratch or output directory handling failed
    #[error("Filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn archive_read(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ArchiveRead {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn archive_write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ArchiveWrite {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;
