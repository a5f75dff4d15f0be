//! # Planwright Core
//!
//! Core abstractions and deterministic logic for the Planwright engine.
//!
//! This crate contains:
//! - Plan / Step definitions and the collecting schema validator
//! - The write-once variable environment and template rendering
//! - The restricted condition grammar
//! - Tool trait, registry, and argument validation
//! - The LlmClient trait
//! - The plan interpreter and its observer protocol
//!
//! This crate does NOT care about:
//! - Which vendor serves completions
//! - How executions are registered or streamed to subscribers
//! - How the boundary is transported

pub mod condition;
pub mod environment;
pub mod event;
pub mod interpreter;
pub mod llm;
pub mod schema;
pub mod tool;
pub mod types;

pub use condition::{ConditionError, Verdict};
pub use environment::{EnvError, Environment, Rendering};
pub use event::ExecutionEvent;
pub use interpreter::{ExecutionObserver, Interpreter, RunOutcome};
pub use llm::{LlmClient, LlmError, LlmOptions};
pub use schema::{is_identifier, parse_plan, PlanDefect, SchemaOptions};
pub use tool::{Tool, ToolContext, ToolError, ToolInfo, ToolRegistry};
pub use types::{Plan, Step, StepKind, ITERATION_HARD_CAP};
