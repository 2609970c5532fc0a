//! Error types for the correlation engine.
//!
//! Mirrors the propagation policy of spec §7: configuration and source
//! errors are fatal, backend and per-event errors are recoverable and are
//! handled locally by the callers that can degrade gracefully.

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the insider-threat correlation engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("event source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("backend call timed out or failed transiently: {0}")]
    BackendTransient(String),

    #[error("malformed event: {0}")]
    MalformedEvent(String),

    #[error("failed to emit findings: {0}")]
    EmissionFailure(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error represents a condition the caller may retry or
    /// degrade past, rather than one that must abort the run.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::BackendTransient(_) | Error::MalformedEvent(_) | Error::Io(_) => true,
            Error::Configuration(_)
            | Error::SourceUnavailable(_)
            | Error::EmissionFailure(_)
            | Error::Serialization(_) => false,
        }
    }
}
