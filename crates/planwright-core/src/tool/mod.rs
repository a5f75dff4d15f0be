//! Tool abstraction and registry
//!
//! Tools are black boxes to the interpreter: named handlers with a JSON
//! schema describing their arguments. The registry validates arguments
//! against the schema subset (object type, typed properties, `required`,
//! `enum`) before dispatch and shields the interpreter from handler
//! failures, including panics.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Tool dispatch errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("invalid arguments for '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("{0}")]
    Runtime(String),
}

impl ToolError {
    /// Stable machine-readable code.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::UnknownTool(_) => "unknown_tool",
            ToolError::InvalidArguments { .. } => "invalid_arguments",
            ToolError::Runtime(_) => "tool_runtime_error",
        }
    }
}

/// Execution context handed to a tool run.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Cooperative cancellation; long-running tools should poll it.
    pub cancellation: CancellationToken,
}

impl ToolContext {
    pub fn new(cancellation: CancellationToken) -> Self {
        Self { cancellation }
    }
}

/// Catalog entry for one registered tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A capability handler the interpreter can dispatch to.
///
/// Handlers return a string, commonly JSON-encoded; the registry does not
/// interpret it.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique machine-readable name.
    fn name(&self) -> &str;

    /// Human-readable description used in the planning prompt.
    fn description(&self) -> &str;

    /// JSON-schema subset describing the arguments.
    fn input_schema(&self) -> Value;

    /// Run the tool with validated arguments.
    async fn run(&self, args: Map<String, Value>, ctx: ToolContext) -> Result<String, ToolError>;
}

/// Registry mapping tool names to handlers, preserving registration order
/// for the catalog.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Re-registering a name replaces the handler.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        match self.by_name.get(&name) {
            Some(&index) => {
                tracing::warn!(tool = %name, "tool already registered, replacing");
                self.tools[index] = tool;
            }
            None => {
                self.by_name.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.by_name.get(name).map(|&index| self.tools[index].clone())
    }

    /// Registered tool names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// Catalog of all registered tools in registration order.
    pub fn catalog(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|tool| ToolInfo {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
            })
            .collect()
    }

    /// Validate `args` against the tool's schema, then invoke the handler.
    ///
    /// A handler is never allowed to crash the caller: it runs in its own
    /// task and a panic is reported as a runtime error.
    pub async fn dispatch(
        &self,
        name: &str,
        args: Map<String, Value>,
        ctx: ToolContext,
    ) -> Result<String, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        validate_arguments(&args, &tool.input_schema()).map_err(|message| {
            ToolError::InvalidArguments {
                tool: name.to_string(),
                message,
            }
        })?;

        let handle = tokio::spawn(async move { tool.run(args, ctx).await });
        match handle.await {
            Ok(result) => result,
            Err(join_error) if join_error.is_panic() => {
                tracing::error!(tool = %name, "tool handler panicked");
                Err(ToolError::Runtime(format!("tool '{}' panicked", name)))
            }
            Err(join_error) => Err(ToolError::Runtime(join_error.to_string())),
        }
    }
}

/// Validate an argument map against the schema subset.
///
/// Checks the `required` list, per-property `type`, and `enum` membership.
/// Properties outside the schema are passed through untouched.
fn validate_arguments(args: &Map<String, Value>, schema: &Value) -> Result<(), String> {
    if schema.is_null() {
        return Ok(());
    }
    let schema_obj = schema.as_object().ok_or("input_schema must be an object")?;

    if let Some(required) = schema_obj.get("required").and_then(|v| v.as_array()) {
        for key in required.iter().filter_map(|v| v.as_str()) {
            if !args.contains_key(key) {
                return Err(format!("missing required argument '{}'", key));
            }
        }
    }

    let Some(properties) = schema_obj.get("properties").and_then(|v| v.as_object()) else {
        return Ok(());
    };

    for (key, property) in properties {
        let Some(value) = args.get(key) else {
            continue;
        };
        if let Some(type_name) = property.get("type").and_then(|v| v.as_str()) {
            if !json_type_matches(type_name, value) {
                return Err(format!(
                    "argument '{}' expected type '{}', got {}",
                    key,
                    type_name,
                    json_type_name(value)
                ));
            }
        }
        if let Some(variants) = property.get("enum").and_then(|v| v.as_array()) {
            if !variants.iter().any(|candidate| candidate == value) {
                return Err(format!(
                    "argument '{}' is not one of the allowed enum values",
                    key
                ));
            }
        }
    }

    Ok(())
}

fn json_type_matches(type_name: &str, value: &Value) -> bool {
    match type_name {
        "string" => value.is_string(),
        "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => false,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "echoes the message argument"
        }

        fn input_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "message": {"type": "string"},
                    "repeat": {"type": "integer"},
                    "mode": {"type": "string", "enum": ["plain", "loud"]}
                },
                "required": ["message"]
            })
        }

        async fn run(
            &self,
            args: Map<String, Value>,
            _ctx: ToolContext,
        ) -> Result<String, ToolError> {
            let message = args
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            Ok(message.to_string())
        }
    }

    struct PanickyTool;

    #[async_trait]
    impl Tool for PanickyTool {
        fn name(&self) -> &str {
            "panicky"
        }

        fn description(&self) -> &str {
            "always panics"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object", "properties": {}, "required": []})
        }

        async fn run(
            &self,
            _args: Map<String, Value>,
            _ctx: ToolContext,
        ) -> Result<String, ToolError> {
            panic!("division by zero")
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(PanickyTool));
        registry
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn test_dispatch_success() {
        tokio_test::block_on(async {
            let result = registry()
                .dispatch("echo", args(json!({"message": "hi"})), ToolContext::default())
                .await
                .expect("dispatch");
            assert_eq!(result, "hi");
        });
    }

    #[test]
    fn test_unknown_tool() {
        tokio_test::block_on(async {
            let err = registry()
                .dispatch("nope", Map::new(), ToolContext::default())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), "unknown_tool");
        });
    }

    #[test]
    fn test_missing_required_argument() {
        tokio_test::block_on(async {
            let err = registry()
                .dispatch("echo", Map::new(), ToolContext::default())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), "invalid_arguments");
            assert!(err.to_string().contains("message"));
        });
    }

    #[test]
    fn test_wrong_argument_type() {
        tokio_test::block_on(async {
            let err = registry()
                .dispatch(
                    "echo",
                    args(json!({"message": "hi", "repeat": "three"})),
                    ToolContext::default(),
                )
                .await
                .unwrap_err();
            assert_eq!(err.kind(), "invalid_arguments");
        });
    }

    #[test]
    fn test_enum_membership() {
        tokio_test::block_on(async {
            let err = registry()
                .dispatch(
                    "echo",
                    args(json!({"message": "hi", "mode": "whisper"})),
                    ToolContext::default(),
                )
                .await
                .unwrap_err();
            assert_eq!(err.kind(), "invalid_arguments");
        });
    }

    #[test]
    fn test_panicking_handler_is_contained() {
        tokio_test::block_on(async {
            let registry = registry();
            let err = registry
                .dispatch("panicky", Map::new(), ToolContext::default())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), "tool_runtime_error");

            // The registry stays usable after a handler panic.
            let result = registry
                .dispatch(
                    "echo",
                    args(json!({"message": "still alive"})),
                    ToolContext::default(),
                )
                .await
                .expect("dispatch");
            assert_eq!(result, "still alive");
        });
    }

    #[test]
    fn test_catalog_preserves_registration_order() {
        let registry = registry();
        let names: Vec<String> = registry.catalog().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["echo".to_string(), "panicky".to_string()]);
    }
}
