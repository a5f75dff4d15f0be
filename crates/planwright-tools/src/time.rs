//! Current-time tool

use async_trait::async_trait;
use chrono::Local;
use serde_json::{json, Map, Value};

use planwright_core::{Tool, ToolContext, ToolError};

/// Reports the current date and time.
pub struct GetCurrentTimeTool;

#[async_trait]
impl Tool for GetCurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Returns the current date and time. It takes no arguments."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn run(&self, _args: Map<String, Value>, _ctx: ToolContext) -> Result<String, ToolError> {
        let now = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        Ok(json!({"status": "success", "current_time": now}).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_returns_json_with_current_time() {
        tokio_test::block_on(async {
            let output = GetCurrentTimeTool
                .run(Map::new(), ToolContext::default())
                .await
                .expect("run");
            let value: Value = serde_json::from_str(&output).expect("json");
            assert_eq!(value["status"], "success");
            assert!(value["current_time"].as_str().expect("time").len() >= 19);
        });
    }
}
