//! Step type definitions
//!
//! A Step is one instruction of a plan: an LLM call, a tool invocation,
//! a conditional jump, an unconditional jump, or the end marker.

use serde::Serialize;
use serde_json::{Map, Value};

/// Type-specific payload of a step.
///
/// The `type` tag matches the wire format produced by the planner.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// Send a rendered prompt to the language model and bind the completion.
    Llm {
        /// Prompt template; `{name}` placeholders resolve against the environment.
        prompt: String,
        /// Variable names the template reads.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        input_refs: Vec<String>,
        /// Environment name the completion text is bound to.
        output_name: String,
    },
    /// Dispatch a registered tool and bind its string result.
    Tool {
        tool_name: String,
        /// Parameter name to literal JSON value or template string.
        #[serde(skip_serializing_if = "Map::is_empty")]
        arguments: Map<String, Value>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        input_refs: Vec<String>,
        output_name: String,
    },
    /// Jump to `goto_id` when the condition evaluates true, else fall through.
    If { condition: String, goto_id: String },
    /// Unconditional jump.
    Goto { goto_id: String },
    /// Terminate the plan.
    End,
}

impl StepKind {
    /// Wire name of the step type.
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Llm { .. } => "llm",
            StepKind::Tool { .. } => "tool",
            StepKind::If { .. } => "if",
            StepKind::Goto { .. } => "goto",
            StepKind::End => "end",
        }
    }
}

/// A single labelled instruction in a plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    /// Unique identifier within the plan.
    pub id: String,
    /// Free-text description, observational only.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(flatten)]
    pub kind: StepKind,
}

impl Step {
    /// Create an LLM step.
    pub fn llm(
        id: impl Into<String>,
        prompt: impl Into<String>,
        output_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            kind: StepKind::Llm {
                prompt: prompt.into(),
                input_refs: Vec::new(),
                output_name: output_name.into(),
            },
        }
    }

    /// Create a tool step.
    pub fn tool(
        id: impl Into<String>,
        tool_name: impl Into<String>,
        output_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            kind: StepKind::Tool {
                tool_name: tool_name.into(),
                arguments: Map::new(),
                input_refs: Vec::new(),
                output_name: output_name.into(),
            },
        }
    }

    /// Create a conditional jump step.
    pub fn branch(
        id: impl Into<String>,
        condition: impl Into<String>,
        goto_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            kind: StepKind::If {
                condition: condition.into(),
                goto_id: goto_id.into(),
            },
        }
    }

    /// Create an unconditional jump step.
    pub fn goto(id: impl Into<String>, goto_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            kind: StepKind::Goto {
                goto_id: goto_id.into(),
            },
        }
    }

    /// Create an end step.
    pub fn end(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            kind: StepKind::End,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the declared input references (llm and tool steps).
    pub fn with_input_refs(mut self, refs: Vec<String>) -> Self {
        match &mut self.kind {
            StepKind::Llm { input_refs, .. } | StepKind::Tool { input_refs, .. } => {
                *input_refs = refs;
            }
            _ => {}
        }
        self
    }

    /// Set tool arguments (tool steps).
    pub fn with_arguments(mut self, args: Map<String, Value>) -> Self {
        if let StepKind::Tool { arguments, .. } = &mut self.kind {
            *arguments = args;
        }
        self
    }

    /// Environment name this step binds, if any.
    pub fn output_name(&self) -> Option<&str> {
        match &self.kind {
            StepKind::Llm { output_name, .. } | StepKind::Tool { output_name, .. } => {
                Some(output_name.as_str())
            }
            _ => None,
        }
    }

    /// Jump target of this step, if any.
    pub fn goto_target(&self) -> Option<&str> {
        match &self.kind {
            StepKind::If { goto_id, .. } | StepKind::Goto { goto_id } => Some(goto_id.as_str()),
            _ => None,
        }
    }

    /// Declared input references, empty for control-flow steps.
    pub fn input_refs(&self) -> &[String] {
        match &self.kind {
            StepKind::Llm { input_refs, .. } | StepKind::Tool { input_refs, .. } => input_refs,
            _ => &[],
        }
    }
}
