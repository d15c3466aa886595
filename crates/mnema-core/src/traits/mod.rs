//! Traits for external collaborators.

mod llm;

pub use llm::{GenerationOptions, Llm, LlmConfig, LlmResponse, ResponseFormat, TokenUsage};
