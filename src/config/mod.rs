//! Configuration module for Joinery.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{
    vars, AnswerPrompts, CannedPrompts, CitationPrompts, Prompts, RelevancePrompts, RewritePrompts,
};
pub use settings::{
    EmbeddingSettings, GeneralSettings, OpenAISettings, PromptSettings, RagSettings,
    ServerSettings, Settings, StoreProvider, VectorStoreSettings,
};
