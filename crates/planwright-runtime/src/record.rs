//! Execution records
//!
//! The live state of one plan being run: status, timestamps, the
//! append-only event log, the subscriber set, and the cancellation signal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use planwright_core::{ExecutionEvent, Plan};

/// Lifecycle status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Starting,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Stopped
        )
    }
}

/// One attached subscriber with its bounded delivery buffer.
pub(crate) struct Subscriber {
    pub id: u64,
    pub tx: mpsc::Sender<ExecutionEvent>,
}

/// Registry-internal state of one execution.
pub(crate) struct ExecutionRecord {
    pub plan: Plan,
    pub query: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub event_log: Vec<ExecutionEvent>,
    pub subscribers: Vec<Subscriber>,
    pub current_step_id: Option<String>,
    pub final_result: Option<String>,
    pub error: Option<String>,
    pub environment: Vec<(String, String)>,
    pub cancellation: CancellationToken,
    /// Set when the record turns terminal; swept once past this deadline.
    pub expires_at: Option<Instant>,
}

impl ExecutionRecord {
    pub fn new(plan: Plan, query: String) -> Self {
        Self {
            plan,
            query,
            status: ExecutionStatus::Starting,
            started_at: Utc::now(),
            finished_at: None,
            event_log: Vec::new(),
            subscribers: Vec::new(),
            current_step_id: None,
            final_result: None,
            error: None,
            environment: Vec::new(),
            cancellation: CancellationToken::new(),
            expires_at: None,
        }
    }
}

/// Point-in-time view of an execution, the status-query payload.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionView {
    pub execution_id: String,
    pub plan: Plan,
    pub query: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub environment: Vec<(String, String)>,
    pub event_log: Vec<ExecutionEvent>,
}
