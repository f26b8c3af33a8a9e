//! Common error type used throughout convertforge.
//!
//! Conversion failures have their own taxonomy in the engine; this covers
//! input refused before it reaches the engine.

/// Common error type for convertforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The upload was refused before reaching the conversion engine.
    #[error("Rejected upload: {0}")]
    Rejected(String),
}

impl Error {
    /// Create a new Rejected error.
    pub fn rejected<S: Into<String>>(msg: S) -> Self {
        Self::Rejected(msg.into())
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
