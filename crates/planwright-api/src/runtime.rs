//! Agent runtime
//!
//! The boundary adapter implementation: wires planner, interpreter, tool
//! registry, and execution registry together behind the [`AgentService`]
//! operations. Transports (HTTP, CLI, in-process) call these methods and
//! serialize the results however they like.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use planwright_config::AgentConfig;
use planwright_core::{
    parse_plan, Interpreter, LlmClient, LlmOptions, SchemaOptions, ToolInfo, ToolRegistry,
};
use planwright_planner::{Planner, PlannerConfig, EXECUTION_SYSTEM_PROMPT};
use planwright_runtime::{
    start_execution, EventStream, ExecutionRegistry, ExecutionView, RegistryConfig,
};

use crate::dto::{PlanResponse, StartRequest, StartResponse};
use crate::error::ApiError;

/// The three boundary operations plus the status, catalog, and stop
/// surfaces built on the same state.
#[async_trait]
pub trait AgentService: Send + Sync {
    /// Turn a user query into a validated plan.
    async fn submit(&self, query: &str) -> Result<PlanResponse, ApiError>;

    /// Register a plan for execution and launch it in the background.
    async fn start(&self, request: StartRequest) -> Result<StartResponse, ApiError>;

    /// Subscribe to an execution's ordered event stream (replay + live).
    async fn subscribe(&self, execution_id: &str) -> Result<EventStream, ApiError>;

    /// Point-in-time execution status.
    async fn status(&self, execution_id: &str) -> Result<ExecutionView, ApiError>;

    /// Ask a live execution to stop at its next safe point.
    async fn stop(&self, execution_id: &str) -> Result<(), ApiError>;

    /// Registered tools, in registration order.
    fn tools(&self) -> Vec<ToolInfo>;
}

/// Concrete in-process agent runtime.
pub struct AgentRuntime {
    planner: Planner,
    interpreter: Arc<Interpreter>,
    registry: Arc<ExecutionRegistry>,
    tools: Arc<ToolRegistry>,
    schema: SchemaOptions,
}

impl AgentRuntime {
    pub fn new(llm: Arc<dyn LlmClient>, tools: Arc<ToolRegistry>, config: &AgentConfig) -> Self {
        let schema = SchemaOptions::default()
            .with_default_iterations(config.max_agent_iterations)
            .with_known_tools(tools.names());

        let planner_options = LlmOptions::default()
            .with_model(config.llm_model.clone())
            .with_temperature(0.2);
        let planner = Planner::new(
            llm.clone(),
            tools.clone(),
            PlannerConfig {
                options: planner_options,
                schema: schema.clone(),
                max_context_tokens: config.max_context_tokens,
                token_buffer: config.context_token_buffer,
            },
        );

        let execution_options = LlmOptions::default()
            .with_model(config.llm_model.clone())
            .with_system_prompt(EXECUTION_SYSTEM_PROMPT);
        let interpreter = Arc::new(Interpreter::new(llm, tools.clone(), execution_options));

        let registry = Arc::new(ExecutionRegistry::new(RegistryConfig {
            subscriber_buffer: config.subscriber_buffer,
            grace: config.execution_grace,
            ..RegistryConfig::default()
        }));

        Self {
            planner,
            interpreter,
            registry,
            tools,
            schema,
        }
    }

    /// The shared execution registry, e.g. for transports that expose it.
    pub fn registry(&self) -> Arc<ExecutionRegistry> {
        self.registry.clone()
    }

    /// Launch the periodic sweeper for expired execution records.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        self.registry
            .spawn_sweeper(std::time::Duration::from_secs(30))
    }

    /// Cancel everything still running; used on shutdown.
    pub fn shutdown(&self) {
        self.registry.drain();
    }
}

#[async_trait]
impl AgentService for AgentRuntime {
    async fn submit(&self, query: &str) -> Result<PlanResponse, ApiError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ApiError::InvalidArgument(
                "query must not be empty".to_string(),
            ));
        }

        let plan = self.planner.plan(query, &CancellationToken::new()).await?;
        Ok(PlanResponse {
            plan,
            query: query.to_string(),
        })
    }

    async fn start(&self, request: StartRequest) -> Result<StartResponse, ApiError> {
        if request.query.trim().is_empty() {
            return Err(ApiError::InvalidArgument(
                "query must not be empty".to_string(),
            ));
        }

        // Outside callers may hand-construct plans; validate before launch.
        let plan = parse_plan(&request.plan, &self.schema).map_err(|defects| {
            ApiError::Validation {
                diagnostics: defects.iter().map(|d| d.to_string()).collect(),
            }
        })?;

        let execution_id = start_execution(
            &self.registry,
            self.interpreter.clone(),
            plan,
            request.query,
        );
        Ok(StartResponse { execution_id })
    }

    async fn subscribe(&self, execution_id: &str) -> Result<EventStream, ApiError> {
        self.registry
            .attach_subscriber(execution_id)
            .ok_or_else(|| ApiError::NotFound(execution_id.to_string()))
    }

    async fn status(&self, execution_id: &str) -> Result<ExecutionView, ApiError> {
        self.registry
            .get(execution_id)
            .ok_or_else(|| ApiError::NotFound(execution_id.to_string()))
    }

    async fn stop(&self, execution_id: &str) -> Result<(), ApiError> {
        if self.registry.get(execution_id).is_none() {
            return Err(ApiError::NotFound(execution_id.to_string()));
        }
        self.registry.cancel(execution_id);
        Ok(())
    }

    fn tools(&self) -> Vec<ToolInfo> {
        self.tools.catalog()
    }
}
