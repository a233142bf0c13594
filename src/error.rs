use thiserror::Error;

use crate::jobs::StoreError;
use crate::llm::LlmError;

#[derive(Debug, Error)]
pub enum DialogenError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Job store error: {0}")]
    Store(#[from] StoreError),

    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Everything that can abort one conversation generation.
///
/// A single error at any step is terminal for the generation; nothing here is
/// retried and no partial conversation is returned alongside it.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("could not extract a conversation from the model output: {0}")]
    Extraction(String),

    #[error("turn {index} is malformed: {reason}")]
    InvalidTurn { index: usize, reason: String },

    #[error("the model returned an empty conversation")]
    EmptyConversation,
}

impl GenerationError {
    /// Classifies the failure for the job's failure metadata.
    pub fn kind(&self) -> FailureKind {
        match self {
            GenerationError::Config(_) | GenerationError::Llm(_) => FailureKind::System,
            GenerationError::Extraction(_)
            | GenerationError::InvalidTurn { .. }
            | GenerationError::EmptyConversation => FailureKind::Business,
        }
    }

    /// True when the model stopped because it ran out of token budget.
    pub fn is_truncation(&self) -> bool {
        matches!(self, GenerationError::Llm(LlmError::Truncated { .. }))
    }
}

/// Classifies a generation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// The model answered but its output was unusable (unparseable, empty, malformed turns).
    Business,
    /// Infrastructure or setup failed (credentials, network, upstream status, truncation).
    System,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Business => write!(f, "Business"),
            FailureKind::System => write!(f, "System"),
        }
    }
}
