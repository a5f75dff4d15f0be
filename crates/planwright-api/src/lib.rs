//! # Planwright API
//!
//! The boundary adapter: submit a query for planning, start an execution
//! from a plan, subscribe to its ordered event stream, query status and the
//! tool catalog. Defined independently of any wire transport; an HTTP or
//! websocket layer serializes these DTOs however it likes.

mod dto;
mod error;
mod runtime;

pub use dto::{PlanResponse, StartRequest, StartResponse, ToolCatalogResponse};
pub use error::{ApiError, ErrorBody};
pub use runtime::{AgentRuntime, AgentService};
