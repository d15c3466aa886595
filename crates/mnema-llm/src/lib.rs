//! mnema-llm - Generation-service providers for mnema.
//!
//! Implements the [`Llm`] trait from mnema-core over the OpenAI and
//! Anthropic HTTP APIs, with a factory that picks the provider from
//! configuration. Every call carries a hard wall-clock timeout; a
//! timeout surfaces as a retryable network error.

mod anthropic;
mod openai;

pub use anthropic::AnthropicLlm;
pub use openai::OpenAiLlm;

use std::sync::Arc;

use mnema_core::config::{LlmProvider, LlmProviderConfig};
use mnema_core::error::MnemaResult;
use mnema_core::traits::Llm;

/// Create an LLM provider from configuration.
pub fn create_llm(config: &LlmProviderConfig) -> MnemaResult<Arc<dyn Llm>> {
    match config.provider {
        LlmProvider::OpenAI => Ok(Arc::new(OpenAiLlm::new(config.config.clone())?)),
        LlmProvider::Anthropic => Ok(Arc::new(AnthropicLlm::new(config.config.clone())?)),
    }
}
