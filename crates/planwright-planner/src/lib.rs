//! # Planwright Planner
//!
//! LLM-backed plan synthesis: prompt composition over the tool catalog,
//! JSON extraction from model output, schema validation, and a single
//! structured repair round. Also home to the OpenAI-compatible HTTP client
//! and the mock clients used by tests.

mod client;
mod extract;
mod planner;
pub mod prompt;

pub use client::{HttpLlmClient, HttpLlmClientConfig, MockLlmClient, ScriptedLlmClient};
pub use extract::{extract_object, ExtractError};
pub use planner::{Planner, PlannerConfig, PlannerError};
pub use prompt::EXECUTION_SYSTEM_PROMPT;
