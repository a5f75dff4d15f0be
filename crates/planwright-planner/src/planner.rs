//! Planner
//!
//! Composes the planning prompt from the user query and the tool catalog,
//! invokes the LLM, and runs the output through extraction and validation.
//! A failed round earns exactly one structured repair attempt carrying the
//! complete diagnostic list; a second failure is unrecoverable.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use planwright_core::{parse_plan, LlmClient, LlmError, LlmOptions, Plan, SchemaOptions, ToolRegistry};

use crate::extract::extract_object;
use crate::prompt::{approx_tokens, build_planning_prompt, build_repair_prompt};

const MAX_OUTPUT_LOG_CHARS: usize = 8_000;

/// Planner errors surfaced to the boundary.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("planner output unusable after repair: {}", diagnostics.join("; "))]
    Unrecoverable { diagnostics: Vec<String> },
}

impl PlannerError {
    /// Stable machine-readable code.
    pub fn kind(&self) -> &'static str {
        match self {
            PlannerError::Llm(inner) => inner.kind(),
            PlannerError::Unrecoverable { .. } => "planner_unrecoverable",
        }
    }

    /// Validator/extractor diagnostics, empty for transport failures.
    pub fn diagnostics(&self) -> &[String] {
        match self {
            PlannerError::Llm(_) => &[],
            PlannerError::Unrecoverable { diagnostics } => diagnostics,
        }
    }
}

/// Planner configuration.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Model options for planning calls.
    pub options: LlmOptions,
    /// Schema options: iteration caps and the tool catalog restriction.
    pub schema: SchemaOptions,
    /// Approximate context window of the planning model, in tokens.
    pub max_context_tokens: usize,
    /// Tokens reserved for the model's response.
    pub token_buffer: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            options: LlmOptions::default().with_temperature(0.2),
            schema: SchemaOptions::default(),
            max_context_tokens: 25_000,
            token_buffer: 2_000,
        }
    }
}

/// LLM-backed plan synthesizer.
pub struct Planner {
    client: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    config: PlannerConfig,
}

impl Planner {
    pub fn new(client: Arc<dyn LlmClient>, tools: Arc<ToolRegistry>, config: PlannerConfig) -> Self {
        Self {
            client,
            tools,
            config,
        }
    }

    /// Produce a validated plan for `query`.
    pub async fn plan(
        &self,
        query: &str,
        cancellation: &CancellationToken,
    ) -> Result<Plan, PlannerError> {
        let catalog = self.tools.catalog();
        let schema = self
            .config
            .schema
            .clone()
            .with_known_tools(catalog.iter().map(|t| t.name.clone()));

        let budget = self
            .config
            .max_context_tokens
            .saturating_sub(self.config.token_buffer);
        let system = build_planning_prompt(&catalog, schema.hard_cap, budget);
        let options = self
            .config
            .options
            .clone()
            .with_system_prompt(system);

        let user_prompt = format!("Create an execution plan for: {}", query);
        tracing::info!(
            model = %options.model,
            tool_count = catalog.len(),
            prompt_tokens = approx_tokens(&user_prompt)
                + options.system_prompt.as_deref().map(approx_tokens).unwrap_or(0),
            "planner request prepared"
        );

        let output = self
            .client
            .complete(&user_prompt, &options, cancellation)
            .await?;
        let diagnostics = match self.try_parse(&output, &schema) {
            Ok(plan) => {
                tracing::info!(step_count = plan.steps.len(), "plan accepted");
                return Ok(plan);
            }
            Err(diagnostics) => diagnostics,
        };

        tracing::warn!(
            diagnostics = diagnostics.len(),
            "plan rejected, attempting one repair round"
        );
        let repair_prompt = build_repair_prompt(&output, &diagnostics);
        let repaired = self
            .client
            .complete(&repair_prompt, &options, cancellation)
            .await?;

        match self.try_parse(&repaired, &schema) {
            Ok(plan) => {
                tracing::info!(step_count = plan.steps.len(), "repaired plan accepted");
                Ok(plan)
            }
            Err(diagnostics) => {
                tracing::error!(
                    diagnostics = diagnostics.len(),
                    "repaired plan still invalid"
                );
                Err(PlannerError::Unrecoverable { diagnostics })
            }
        }
    }

    fn try_parse(&self, output: &str, schema: &SchemaOptions) -> Result<Plan, Vec<String>> {
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(
                output = %truncate_for_log(output, MAX_OUTPUT_LOG_CHARS),
                "planner raw output"
            );
        }
        let value = extract_object(output).map_err(|e| vec![e.to_string()])?;
        parse_plan(&value, schema)
            .map_err(|defects| defects.iter().map(|d| d.to_string()).collect())
    }
}

fn truncate_for_log(input: &str, max_chars: usize) -> String {
    let char_count = input.chars().count();
    if char_count <= max_chars {
        return input.to_string();
    }
    let mut preview: String = input.chars().take(max_chars).collect();
    preview.push_str(&format!("... [truncated, total_chars={}]", char_count));
    preview
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ScriptedLlmClient;
    use async_trait::async_trait;
    use planwright_core::{Tool, ToolContext, ToolError};
    use serde_json::{json, Map, Value};

    struct TimeTool;

    #[async_trait]
    impl Tool for TimeTool {
        fn name(&self) -> &str {
            "get_current_time"
        }

        fn description(&self) -> &str {
            "Returns the current date and time. It takes no arguments."
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object", "properties": {}, "required": []})
        }

        async fn run(
            &self,
            _args: Map<String, Value>,
            _ctx: ToolContext,
        ) -> Result<String, ToolError> {
            Ok("12:00".to_string())
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(TimeTool));
        Arc::new(registry)
    }

    fn planner(client: ScriptedLlmClient) -> (Planner, Arc<ScriptedLlmClient>) {
        let client = Arc::new(client);
        (
            Planner::new(client.clone(), registry(), PlannerConfig::default()),
            client,
        )
    }

    const GOOD_PLAN: &str = r#"{
        "plan": [
            {"id": "T1", "type": "tool", "tool_name": "get_current_time",
             "arguments": {}, "output_name": "now"},
            {"id": "END", "type": "end"}
        ],
        "max_iterations": 2,
        "reasoning": "tool lookup"
    }"#;

    #[tokio::test]
    async fn test_first_round_success() {
        let (planner, client) = planner(ScriptedLlmClient::with_texts([GOOD_PLAN]));
        let plan = planner
            .plan("What time is it?", &CancellationToken::new())
            .await
            .expect("plan");
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(client.prompts().len(), 1);
        assert!(client.prompts()[0].contains("What time is it?"));
    }

    #[tokio::test]
    async fn test_repair_round_recovers_malformed_json() {
        let (planner, client) =
            planner(ScriptedLlmClient::with_texts(["no json here at all", GOOD_PLAN]));
        let plan = planner
            .plan("What time is it?", &CancellationToken::new())
            .await
            .expect("plan");
        assert_eq!(plan.steps.len(), 2);

        let prompts = client.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("no json here at all"));
        assert!(prompts[1].contains("PROBLEMS"));
    }

    #[tokio::test]
    async fn test_repair_prompt_carries_validator_diagnostics() {
        let invalid = r#"{
            "plan": [
                {"id": "T1", "type": "tool", "tool_name": "invent_tool",
                 "output_name": "x"},
                {"id": "G1", "type": "goto", "goto_id": "NOWHERE"}
            ],
            "max_iterations": 2
        }"#;
        let (planner, client) = planner(ScriptedLlmClient::with_texts([invalid, GOOD_PLAN]));
        planner
            .plan("q", &CancellationToken::new())
            .await
            .expect("plan");

        let repair = &client.prompts()[1];
        assert!(repair.contains("invent_tool"));
        assert!(repair.contains("NOWHERE"));
    }

    #[tokio::test]
    async fn test_second_failure_is_unrecoverable() {
        let (planner, _client) =
            planner(ScriptedLlmClient::with_texts(["still prose", "more prose"]));
        let err = planner.plan("q", &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind(), "planner_unrecoverable");
        assert!(!err.diagnostics().is_empty());
    }

    #[tokio::test]
    async fn test_llm_error_surfaces_without_repair() {
        let (planner, client) = planner(ScriptedLlmClient::new([Err(LlmError::RateLimited(
            "slow down".to_string(),
        ))]));
        let err = planner.plan("q", &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind(), "llm_rate_limited");
        assert_eq!(client.prompts().len(), 1);
    }
}
