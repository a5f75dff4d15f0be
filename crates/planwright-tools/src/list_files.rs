//! Directory-listing tool

use std::path::Path;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use planwright_core::{Tool, ToolContext, ToolError};

/// Lists files and directories, like a bounded `ls`.
pub struct ListFilesTool {
    limit: usize,
}

impl ListFilesTool {
    /// `limit` caps the number of entries returned in one call.
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "Lists files and directories in a directory (like 'ls'). \
         Arguments: path (directory to list, default '.'), show_hidden \
         (include dot entries), extensions (filter by file extensions, \
         e.g. ['.rs', '.md'])."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory path to list. Defaults to the current directory."
                },
                "show_hidden": {
                    "type": "boolean",
                    "description": "If true, include entries starting with '.'."
                },
                "extensions": {
                    "type": "array",
                    "description": "Only include files with one of these extensions, e.g. ['.rs', '.md']."
                }
            },
            "required": []
        })
    }

    async fn run(&self, args: Map<String, Value>, _ctx: ToolContext) -> Result<String, ToolError> {
        let path = args
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or(".")
            .to_string();
        let show_hidden = args
            .get("show_hidden")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let extensions: Vec<String> = args
            .get("extensions")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_ascii_lowercase()))
                    .collect()
            })
            .unwrap_or_default();

        let target = Path::new(&path);
        if !target.is_dir() {
            return Err(ToolError::Runtime(format!(
                "path is not a directory: {}",
                path
            )));
        }

        let mut entries = Vec::new();
        let mut reader = tokio::fs::read_dir(target)
            .await
            .map_err(|e| ToolError::Runtime(format!("cannot read {}: {}", path, e)))?;
        let mut total = 0usize;
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| ToolError::Runtime(e.to_string()))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if !show_hidden && name.starts_with('.') {
                continue;
            }

            let file_type = entry
                .file_type()
                .await
                .map_err(|e| ToolError::Runtime(e.to_string()))?;
            if file_type.is_file() && !extensions.is_empty() {
                let matched = extensions
                    .iter()
                    .any(|ext| name.to_ascii_lowercase().ends_with(ext.as_str()));
                if !matched {
                    continue;
                }
            }

            total += 1;
            if entries.len() < self.limit {
                entries.push(json!({
                    "name": name,
                    "path": entry.path().to_string_lossy(),
                    "type": if file_type.is_dir() { "directory" } else { "file" },
                }));
            }
        }

        entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
        let truncated = total > entries.len();
        if truncated {
            tracing::debug!(path = %path, total, limit = self.limit, "listing truncated");
        }

        Ok(json!({
            "status": "success",
            "path": path,
            "total_items": total,
            "truncated": truncated,
            "files": entries,
        })
        .to_string())
    }
}
