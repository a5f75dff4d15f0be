//! Boundary data transfer objects

use serde::{Deserialize, Serialize};

use planwright_core::{Plan, ToolInfo};

/// Successful planning response: the plan plus the originating query.
#[derive(Debug, Clone, Serialize)]
pub struct PlanResponse {
    pub plan: Plan,
    pub query: String,
}

/// Request to start executing a plan, as round-tripped from planning.
#[derive(Debug, Clone, Deserialize)]
pub struct StartRequest {
    pub plan: serde_json::Value,
    pub query: String,
}

/// Execution start acknowledgement.
#[derive(Debug, Clone, Serialize)]
pub struct StartResponse {
    pub execution_id: String,
}

/// Tool catalog response.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCatalogResponse {
    pub tools: Vec<ToolInfo>,
}
