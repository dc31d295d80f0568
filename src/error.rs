//! Error taxonomy for the ingestion and chat pipelines.
//!
//! Every pipeline stage returns [`Result<T>`](Result) and the HTTP layer maps
//! each variant to a status code at the request boundary. Configuration and
//! CLI code keep using `anyhow`.

use std::fmt;

use thiserror::Error;

/// Failure kinds reported by a generation provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationErrorKind {
    /// Provider rejected the call because of a rate or quota limit (HTTP 429).
    RateLimited,
    /// Model unknown, decommissioned, or the provider is unreachable / failing.
    ModelUnavailable,
    /// The request did not complete within the client timeout.
    Timeout,
    /// The provider refused the request as malformed.
    InvalidRequest,
}

impl fmt::Display for GenerationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GenerationErrorKind::RateLimited => "rate_limited",
            GenerationErrorKind::ModelUnavailable => "model_unavailable",
            GenerationErrorKind::Timeout => "timeout",
            GenerationErrorKind::InvalidRequest => "invalid_request",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum RagError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("text extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("generation failed ({kind}): {message}")]
    GenerationFailed {
        kind: GenerationErrorKind,
        message: String,
    },

    #[error("ingestion of '{document}' failed: {source}")]
    IngestionFailed {
        document: String,
        #[source]
        source: Box<RagError>,
    },
}

impl RagError {
    pub fn ingestion(document: impl Into<String>, source: RagError) -> Self {
        RagError::IngestionFailed {
            document: document.into(),
            source: Box::new(source),
        }
    }

    pub fn generation(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        RagError::GenerationFailed {
            kind,
            message: message.into(),
        }
    }

    /// True for errors caused by the caller rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(self, RagError::InvalidInput(_))
    }
}

impl From<sqlx::Error> for RagError {
    fn from(err: sqlx::Error) -> Self {
        RagError::IndexUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
