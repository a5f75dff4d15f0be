//! # Planwright Config
//!
//! Configuration comes from a closed set of environment variables; every
//! knob has a default so the engine runs with nothing but `LLM_API_KEY`
//! set.

use std::env;
use std::time::Duration;

use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{variable} has invalid value '{value}': {message}")]
    Parse {
        variable: &'static str,
        value: String,
        message: String,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Vendor API key; absent means the HTTP LLM client cannot be built.
    pub llm_api_key: Option<String>,
    /// Model identifier for planning and llm steps.
    pub llm_model: String,
    /// Default iteration budget when a plan omits `max_iterations`.
    pub max_agent_iterations: u32,
    /// Approximate context window for planning prompts, in tokens.
    pub max_context_tokens: usize,
    /// Tokens reserved for the model's response.
    pub context_token_buffer: usize,
    /// Entry cap for the `list_files` tool.
    pub list_files_limit: usize,
    /// How long terminal execution records stay available for replay.
    pub execution_grace: Duration,
    /// Bounded per-subscriber event buffer.
    pub subscriber_buffer: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            llm_api_key: None,
            llm_model: "gpt-4o-mini".to_string(),
            max_agent_iterations: 10,
            max_context_tokens: 25_000,
            context_token_buffer: 2_000,
            list_files_limit: 20,
            execution_grace: Duration::from_secs(600),
            subscriber_buffer: 64,
        }
    }
}

impl AgentConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through a variable lookup function.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            llm_api_key: lookup("LLM_API_KEY").filter(|v| !v.trim().is_empty()),
            llm_model: lookup("LLM_MODEL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.llm_model),
            max_agent_iterations: parse_var(
                &lookup,
                "MAX_AGENT_ITERATIONS",
                defaults.max_agent_iterations,
            )?,
            max_context_tokens: parse_var(
                &lookup,
                "MAX_CONTEXT_TOKENS",
                defaults.max_context_tokens,
            )?,
            context_token_buffer: parse_var(
                &lookup,
                "CONTEXT_TOKEN_BUFFER",
                defaults.context_token_buffer,
            )?,
            list_files_limit: parse_var(&lookup, "LIST_FILES_LIMIT", defaults.list_files_limit)?,
            execution_grace: Duration::from_secs(parse_var(
                &lookup,
                "EXECUTION_GRACE_SECONDS",
                defaults.execution_grace.as_secs(),
            )?),
            subscriber_buffer: parse_var(&lookup, "SUBSCRIBER_BUFFER", defaults.subscriber_buffer)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_agent_iterations == 0 {
            return Err(ConfigError::Invalid(
                "MAX_AGENT_ITERATIONS must be > 0".to_string(),
            ));
        }
        if self.subscriber_buffer == 0 {
            return Err(ConfigError::Invalid(
                "SUBSCRIBER_BUFFER must be > 0".to_string(),
            ));
        }
        if self.context_token_buffer >= self.max_context_tokens {
            return Err(ConfigError::Invalid(
                "CONTEXT_TOKEN_BUFFER must be smaller than MAX_CONTEXT_TOKENS".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    variable: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(variable) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map_err(|e: T::Err| ConfigError::Parse {
                variable,
                value: raw,
                message: e.to_string(),
            })
        }
        _ => Ok(default),
    }
}
