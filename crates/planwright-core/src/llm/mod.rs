//! LLM client abstraction
//!
//! A single operation: given a prompt and model options, return a textual
//! completion. Vendors plug in behind the trait; the HTTP implementation
//! lives in the planner crate.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Completion request options.
#[derive(Debug, Clone)]
pub struct LlmOptions {
    /// Model identifier passed to the vendor.
    pub model: String,
    /// Upper bound on response size.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Higher-priority instruction prefixed to the conversation.
    pub system_prompt: Option<String>,
}

impl Default for LlmOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: None,
            temperature: None,
            system_prompt: None,
        }
    }
}

impl LlmOptions {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

/// LLM call errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    #[error("llm network error: {0}")]
    Network(String),

    #[error("llm rate limited: {0}")]
    RateLimited(String),

    #[error("llm invalid response: {0}")]
    InvalidResponse(String),

    #[error("llm call cancelled")]
    Cancelled,
}

impl LlmError {
    /// Stable machine-readable code.
    pub fn kind(&self) -> &'static str {
        match self {
            LlmError::Network(_) => "llm_network",
            LlmError::RateLimited(_) => "llm_rate_limited",
            LlmError::InvalidResponse(_) => "llm_invalid_response",
            LlmError::Cancelled => "llm_cancelled",
        }
    }
}

/// Pluggable completion backend.
///
/// Implementations honour the supplied cancellation token and return
/// [`LlmError::Cancelled`] promptly once it fires.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        options: &LlmOptions,
        cancellation: &CancellationToken,
    ) -> Result<String, LlmError>;
}

#[async_trait]
impl LlmClient for Arc<dyn LlmClient> {
    async fn complete(
        &self,
        prompt: &str,
        options: &LlmOptions,
        cancellation: &CancellationToken,
    ) -> Result<String, LlmError> {
        (**self).complete(prompt, options, cancellation).await
    }
}
