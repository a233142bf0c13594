pub mod client;
pub mod error;
pub mod types;

pub use client::{CompletionClient, OpenAiClient};
pub use error::LlmError;
pub use types::{ChatMessage, Completion, ModelSettings, TokenUsage};
