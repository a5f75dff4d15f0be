use std::env;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;

use planwright_api::{AgentRuntime, AgentService, StartRequest};
use planwright_config::AgentConfig;
use planwright_core::{ExecutionEvent, ToolRegistry};
use planwright_planner::{HttpLlmClient, HttpLlmClientConfig};
use planwright_tools::register_builtin_tools;

#[derive(Debug, Parser)]
#[command(name = "planwright", about = "Plan and execute a query with an LLM agent")]
pub struct Cli {
    /// The query to plan and execute.
    #[arg(value_name = "QUERY", required = true)]
    query: Vec<String>,

    /// Print the generated plan before executing it.
    #[arg(long)]
    show_plan: bool,

    /// Log everything; otherwise RUST_LOG (default "warn") applies.
    #[arg(long)]
    verbose: bool,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<i32> {
        init_logging(self.verbose);

        let query = self.query.join(" ");
        let config = AgentConfig::from_env().context("loading configuration")?;
        let Some(api_key) = config.llm_api_key.clone() else {
            bail!("LLM_API_KEY is not set; the agent cannot reach its model");
        };

        let llm = Arc::new(
            HttpLlmClient::new(HttpLlmClientConfig {
                api_key: Some(api_key),
                ..HttpLlmClientConfig::default()
            })
            .context("building LLM client")?,
        );

        let mut tools = ToolRegistry::new();
        register_builtin_tools(&mut tools, config.list_files_limit);
        let runtime = AgentRuntime::new(llm, Arc::new(tools), &config);
        runtime.spawn_sweeper();

        eprintln!("planning...");
        let planned = match runtime.submit(&query).await {
            Ok(planned) => planned,
            Err(error) => {
                let body = error.to_body();
                eprintln!("planning failed ({}): {}", body.kind, body.error);
                for diagnostic in &body.diagnostics {
                    eprintln!("  - {}", diagnostic);
                }
                return Ok(1);
            }
        };

        if self.show_plan {
            println!(
                "{}",
                serde_json::to_string_pretty(&planned.plan).context("rendering plan")?
            );
        }
        eprintln!(
            "plan ready: {} steps, max {} iterations",
            planned.plan.steps.len(),
            planned.plan.max_iterations
        );

        let started = runtime
            .start(StartRequest {
                plan: serde_json::to_value(&planned.plan).context("serializing plan")?,
                query: planned.query,
            })
            .await
            .map_err(|e| anyhow::anyhow!(e.to_body().error))?;

        let mut stream = runtime
            .subscribe(&started.execution_id)
            .await
            .map_err(|e| anyhow::anyhow!(e.to_body().error))?;

        let mut exit_code = 1;
        while let Some(event) = stream.next().await {
            match &event {
                ExecutionEvent::Heartbeat {} => continue,
                ExecutionEvent::ExecutionCompleted { result, .. } => {
                    println!("{}", result);
                    exit_code = 0;
                }
                ExecutionEvent::ExecutionFailed { reason, error, .. } => {
                    eprintln!("execution failed ({}): {}", reason, error);
                    exit_code = 1;
                }
                ExecutionEvent::ExecutionStopped { .. } => {
                    eprintln!("execution stopped");
                    exit_code = 2;
                }
                other => print_progress(other),
            }
        }

        runtime.shutdown();
        Ok(exit_code)
    }
}

fn print_progress(event: &ExecutionEvent) {
    match event {
        ExecutionEvent::ExecutionStarted { .. } => eprintln!("executing..."),
        ExecutionEvent::StepStarted {
            step_id,
            step_type,
            description,
        } => {
            if description.is_empty() {
                eprintln!("[{}] {} step started", step_id, step_type);
            } else {
                eprintln!("[{}] {}", step_id, description);
            }
        }
        ExecutionEvent::StepCompleted {
            step_id,
            success,
            error,
            ..
        } => {
            if *success {
                eprintln!("[{}] done", step_id);
            } else {
                eprintln!(
                    "[{}] failed: {}",
                    step_id,
                    error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        _ => {}
    }
}

fn init_logging(verbose: bool) {
    if verbose && env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "debug");
    }
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
