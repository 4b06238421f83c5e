use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A secret or endpoint needed by the requested feature is not set.
    #[error("${0} not set")]
    ConfigurationMissing(String),

    #[error("Missing value for prompt variable `{0}`.")]
    MissingVariable(String),

    #[error("Output key `{0}` is declared by more than one chain step.")]
    DuplicateOutputKey(String),

    #[error("A chain needs at least one step.")]
    EmptyChain,

    #[error("Invalid chunking: overlap ({overlap}) must be smaller than chunk size ({size}).")]
    InvalidChunking { size: usize, overlap: usize },

    #[error("Model backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Authentication with the model backend failed: {0}")]
    AuthenticationFailed(String),

    #[error("Could not load {url}: {reason}")]
    SourceUnreachable { url: String, reason: String },

    #[error("Failed to embed text: {0}")]
    EmbeddingFailure(String),
}

impl Error {
    /// Whether the failure happened while talking to a model or embedding backend.
    #[must_use]
    pub const fn is_backend(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable(_) | Self::AuthenticationFailed(_) | Self::EmbeddingFailure(_)
        )
    }
}
