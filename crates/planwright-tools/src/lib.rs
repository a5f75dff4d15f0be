//! # Planwright Tools
//!
//! Illustrative built-in tools: a clock and a directory listing. Handlers
//! return JSON-encoded strings; the registry treats them as opaque.

mod list_files;
mod time;

pub use list_files::ListFilesTool;
pub use time::GetCurrentTimeTool;

use std::sync::Arc;

use planwright_core::ToolRegistry;

/// Register the built-in tool set.
pub fn register_builtin_tools(registry: &mut ToolRegistry, list_files_limit: usize) {
    registry.register(Arc::new(GetCurrentTimeTool));
    registry.register(Arc::new(ListFilesTool::new(list_files_limit)));
}
