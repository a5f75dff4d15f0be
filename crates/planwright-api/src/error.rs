//! Boundary error mapping
//!
//! Every internal error kind maps to a client-facing `{error, kind}` body;
//! the kind strings are stable across releases.

use serde::Serialize;
use thiserror::Error;

use planwright_planner::PlannerError;

/// Boundary errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("execution '{0}' not found")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error("plan rejected: {}", diagnostics.join("; "))]
    Validation { diagnostics: Vec<String> },

    #[error("internal: {0}")]
    Internal(String),
}

impl ApiError {
    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::InvalidArgument(_) => "invalid_argument",
            ApiError::Planner(inner) => inner.kind(),
            ApiError::Validation { .. } => "schema_violation",
            ApiError::Internal(_) => "internal",
        }
    }

    /// Client-facing body.
    pub fn to_body(&self) -> ErrorBody {
        let diagnostics = match self {
            ApiError::Planner(planner) => planner.diagnostics().to_vec(),
            ApiError::Validation { diagnostics } => diagnostics.clone(),
            _ => Vec::new(),
        };
        ErrorBody {
            error: self.to_string(),
            kind: self.kind().to_string(),
            diagnostics,
        }
    }
}

/// Serializable error payload for any transport.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}
