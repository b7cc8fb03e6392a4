use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the normalizer, the source dispatcher and the extractors.
///
/// Per-document problems only reach the caller as an `Error` in strict mode;
/// lenient mode turns them into warnings.
#[derive(Debug, Error)]
pub enum Error {
    /// The caller handed over an empty document set.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Content does not parse as a structured document.
    #[error("{document}: invalid document: {reason}")]
    InvalidFormat { document: String, reason: String },

    /// Parses, but fails a required-field check.
    #[error("{document}: validation failed: {reason}")]
    ValidationFailed { document: String, reason: String },

    /// A `kind` the caller does not handle. Extractors treat this as a skip.
    #[error("unsupported kind '{0}'")]
    UnsupportedType(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    /// A plain document source yielded no manifest files at all.
    #[error("no documents found under {}", .0.display())]
    NoDocuments(PathBuf),

    #[error("extraction cancelled")]
    Cancelled,

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Error::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn invalid_format(document: &str, reason: impl ToString) -> Self {
        Error::InvalidFormat {
            document: document.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn validation(document: &str, reason: impl ToString) -> Self {
        Error::ValidationFailed {
            document: document.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether lenient mode may downgrade this error to a warning.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InvalidFormat { .. } | Error::ValidationFailed { .. } | Error::UnsupportedType(_)
        )
    }
}
