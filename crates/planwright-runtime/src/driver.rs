//! Execution driver
//!
//! Wires a validated plan to the interpreter: registers the execution,
//! seeds the environment, and runs the interpreter in its own background
//! task so the caller returns immediately with the execution id.

use std::sync::Arc;

use planwright_core::{Environment, Interpreter, Plan, RunOutcome};

use crate::registry::{ExecutionRegistry, RegistryObserver};

/// Register and launch one execution. Returns the execution id at once;
/// progress is observable through the registry's event streams.
pub fn start_execution(
    registry: &Arc<ExecutionRegistry>,
    interpreter: Arc<Interpreter>,
    plan: Plan,
    query: String,
) -> String {
    let (execution_id, cancellation) = registry.create(plan.clone(), query.clone());
    let observer = RegistryObserver::new(registry.clone(), execution_id.clone());
    let registry = registry.clone();
    let task_id = execution_id.clone();

    tokio::spawn(async move {
        registry.mark_running(&task_id);

        let mut env = Environment::new();
        env.seed("user_query", query);

        let outcome = interpreter
            .run(&plan, &mut env, &observer, &cancellation)
            .await;
        registry.store_environment(&task_id, env.snapshot());

        match outcome {
            RunOutcome::Completed { .. } => {
                tracing::info!(execution_id = %task_id, "execution task finished")
            }
            RunOutcome::Failed { reason, .. } => {
                tracing::warn!(execution_id = %task_id, reason = %reason, "execution task failed")
            }
            RunOutcome::Stopped => {
                tracing::info!(execution_id = %task_id, "execution task stopped")
            }
        }
    });

    execution_id
}
