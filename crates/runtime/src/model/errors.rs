use thiserror::Error;

/// Errors from a streaming exchange with an LLM provider.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// The request was rejected locally, before any network activity.
    #[error("validation: {0}")]
    Validation(String),

    /// A network error occurred while sending or reading.
    #[error("network: {0}")]
    Network(String),

    /// The provider answered with a non-success status.
    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The provider response as a whole could not be understood.
    #[error("invalid provider response: {0}")]
    Parse(String),

    /// The exchange was cancelled or replaced.
    #[error("exchange cancelled")]
    Cancelled,
}

impl ModelError {
    /// Cancellation is benign and never shown to the user as a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
