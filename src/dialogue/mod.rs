pub mod engine;
pub mod metrics;
pub mod parser;
pub mod prompt;
pub mod purpose;
pub mod settings;
pub mod turn;

pub use engine::{ConversationEngine, GenerationMetadata, GenerationOutcome};
pub use prompt::TemplatePromptBuilder;
pub use settings::GenerationConfig;
pub use turn::Turn;
