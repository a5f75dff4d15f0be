//! Execution lifecycle events
//!
//! The closed event set delivered to subscribers, defined independently of
//! any wire transport. Events are ordered per execution; the execution id
//! travels with the channel, not the payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One lifecycle event of a running execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    ExecutionStarted {
        started_at: DateTime<Utc>,
    },
    StepStarted {
        step_id: String,
        step_type: String,
        description: String,
    },
    StepCompleted {
        step_id: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    ExecutionCompleted {
        result: String,
        finished_at: DateTime<Utc>,
    },
    ExecutionFailed {
        reason: String,
        finished_at: DateTime<Utc>,
        error: String,
    },
    ExecutionStopped {
        finished_at: DateTime<Utc>,
    },
    /// Emitted by the stream layer when no other event occurs for the
    /// heartbeat interval; never stored in the event log.
    Heartbeat {},
}

impl ExecutionEvent {
    /// Completed, failed, and stopped close the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionEvent::ExecutionCompleted { .. }
                | ExecutionEvent::ExecutionFailed { .. }
                | ExecutionEvent::ExecutionStopped { .. }
        )
    }

    /// Wire name of the event type.
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionEvent::ExecutionStarted { .. } => "execution_started",
            ExecutionEvent::StepStarted { .. } => "step_started",
            ExecutionEvent::StepCompleted { .. } => "step_completed",
            ExecutionEvent::ExecutionCompleted { .. } => "execution_completed",
            ExecutionEvent::ExecutionFailed { .. } => "execution_failed",
            ExecutionEvent::ExecutionStopped { .. } => "execution_stopped",
            ExecutionEvent::Heartbeat {} => "heartbeat",
        }
    }

    pub fn step_completed_ok(step_id: impl Into<String>, result: Option<String>) -> Self {
        ExecutionEvent::StepCompleted {
            step_id: step_id.into(),
            success: true,
            result,
            error: None,
        }
    }

    pub fn step_completed_err(step_id: impl Into<String>, error: impl Into<String>) -> Self {
        ExecutionEvent::StepCompleted {
            step_id: step_id.into(),
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}
