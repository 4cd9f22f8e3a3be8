//! Error types and handling for clindex-core operations.
//!
//! All public functions in the crate return `Result<T, Error>`. Errors are
//! categorized so the ingestion orchestrator can decide between failing a
//! run, downgrading it to `partial`, or recording a warning and moving on.
//!
//! ## Recovery Hints
//!
//! Transport-class failures (LLM/embedding timeouts) report
//! `is_recoverable() == true` and are retried by the `with_retry`
//! combinator in [`crate::llm`]. Everything else is treated as permanent:
//!
//! ```rust
//! use clindex_core::Error;
//!
//! let err = Error::Timeout("embedding call exceeded 30s".into());
//! assert!(err.is_recoverable());
//! assert_eq!(err.category(), "timeout");
//! ```

use thiserror::Error;

/// The main error type for clindex-core operations.
///
/// Only the ingestion orchestrator catches and classifies; components
/// propagate with `?`. The taxonomy mirrors the failure modes of a run:
/// missing input, malformed input, unavailable collaborators, violated
/// storage constraints.
#[derive(Error, Debug)]
pub enum Error {
    /// Source file for a document version does not exist.
    ///
    /// The run fails outright: there is nothing to parse.
    #[error("Source file missing: {0}")]
    FileMissing(String),

    /// The source file extension is not a supported DOCX container.
    ///
    /// The run finishes `partial` with a warning and needs_review rather
    /// than failing.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Document structure could not be parsed.
    ///
    /// Per-paragraph problems surface as run warnings; this variant is
    /// fatal only when zero paragraphs could be recovered.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The reader did not expose a footnote collection.
    ///
    /// Always downgraded to a run warning; ingestion continues without FN
    /// anchors.
    #[error("Footnotes unavailable: {0}")]
    FootnotesUnavailable(String),

    /// More than one table scored within the ambiguity band of the best
    /// SoA candidate.
    ///
    /// The extractor picks the earliest table deterministically and
    /// records this as a warning.
    #[error("Ambiguous SoA candidates: {0}")]
    SoaAmbiguous(String),

    /// Chat provider failed after retries were exhausted.
    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    /// Embedding provider failed after retries were exhausted.
    ///
    /// Downstream scorers fall back to non-semantic evidence; this is a
    /// warning, not a fatal error.
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// A storage uniqueness or referential constraint was violated.
    ///
    /// A duplicate `anchor_id` indicates corrupt source ids. Fatal: the
    /// run rolls back.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Storage operation failed for a reason other than a constraint.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Requested entity was not found in the store.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration is invalid or could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An external call exceeded its configured timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The ingestion was cancelled cooperatively at a suspension point.
    ///
    /// The run records `failed` with reason "cancelled".
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for uncategorized failures.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl Error {
    /// Check if the error might be recoverable through retry logic.
    ///
    /// Only transport-class failures qualify: timeouts and interrupted
    /// I/O. HTTP status errors and structural failures are permanent by
    /// policy, so provider adapters must map status errors to
    /// [`Error::LlmUnavailable`] / [`Error::EmbeddingUnavailable`] only
    /// after deciding they are terminal.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Get the error category as a string identifier.
    ///
    /// Used for structured logging and for grouping failures in run
    /// summaries.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::FileMissing(_) => "file_missing",
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::Parse(_) => "parse",
            Self::FootnotesUnavailable(_) => "footnotes_unavailable",
            Self::SoaAmbiguous(_) => "soa_ambiguous",
            Self::LlmUnavailable(_) => "llm_unavailable",
            Self::EmbeddingUnavailable(_) => "embedding_unavailable",
            Self::ConstraintViolation(_) => "constraint_violation",
            Self::Storage(_) => "storage",
            Self::NotFound(_) => "not_found",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
            Self::Timeout(_) => "timeout",
            Self::Cancelled(_) => "cancelled",
            Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }

    /// Whether the error fails a run outright, as opposed to downgrading
    /// it to `partial` with a warning.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::FileMissing(_)
                | Self::Parse(_)
                | Self::ConstraintViolation(_)
                | Self::Storage(_)
                | Self::Cancelled(_)
                | Self::Io(_)
        )
    }
}

/// Convenience type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
