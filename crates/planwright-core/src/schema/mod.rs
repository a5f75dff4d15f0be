//! Plan schema and validator
//!
//! Walks a raw JSON object produced by the planner into a typed [`Plan`]
//! and checks the structural invariants. Validation does not short-circuit:
//! every defect is collected so a single repair prompt can address all of
//! them at once.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::{Plan, Step, StepKind, ITERATION_HARD_CAP};

/// A single structural defect found while parsing or validating a plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanDefect {
    #[error("duplicate step id '{0}'")]
    DuplicateId(String),

    #[error("step '{0}' jumps to unknown step id '{1}'")]
    DanglingGoto(String, String),

    #[error("step '{0}' has unknown step type '{1}'")]
    UnknownStepType(String, String),

    #[error("output name '{0}' is bound by more than one step")]
    DuplicateOutputName(String),

    #[error("step '{0}' is missing required field '{1}'")]
    MissingRequiredField(String, String),

    #[error("max_iterations must be an integer in 1..={max}, got {got}")]
    InvalidIterationCap { got: String, max: u32 },

    #[error("step '{0}' names tool '{1}' which is not in the catalog")]
    UnknownTool(String, String),

    #[error("step '{0}' uses invalid identifier '{1}'")]
    InvalidIdentifier(String, String),
}

impl PlanDefect {
    /// Stable machine-readable code for this defect.
    pub fn code(&self) -> &'static str {
        match self {
            PlanDefect::DuplicateId(_) => "duplicate_id",
            PlanDefect::DanglingGoto(_, _) => "dangling_goto",
            PlanDefect::UnknownStepType(_, _) => "unknown_step_type",
            PlanDefect::DuplicateOutputName(_) => "duplicate_output_name",
            PlanDefect::MissingRequiredField(_, _) => "missing_required_field",
            PlanDefect::InvalidIterationCap { .. } => "invalid_iteration_cap",
            PlanDefect::UnknownTool(_, _) => "unknown_tool",
            PlanDefect::InvalidIdentifier(_, _) => "invalid_identifier",
        }
    }
}

/// Options controlling plan parsing and validation.
#[derive(Debug, Clone)]
pub struct SchemaOptions {
    /// Upper bound accepted for `max_iterations`.
    pub hard_cap: u32,
    /// Value used when the plan omits `max_iterations`.
    pub default_iterations: u32,
    /// Tool names allowed in `tool` steps; `None` skips the catalog check.
    pub known_tools: Option<HashSet<String>>,
    /// Variable names seeded by the execution starter, e.g. `user_query`.
    pub system_variables: HashSet<String>,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            hard_cap: ITERATION_HARD_CAP,
            default_iterations: 10,
            known_tools: None,
            system_variables: HashSet::from(["user_query".to_string()]),
        }
    }
}

impl SchemaOptions {
    /// Restrict `tool` steps to the given catalog names.
    pub fn with_known_tools(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.known_tools = Some(names.into_iter().collect());
        self
    }

    /// Set the default used when `max_iterations` is absent.
    pub fn with_default_iterations(mut self, default_iterations: u32) -> Self {
        self.default_iterations = default_iterations;
        self
    }
}

/// True when `name` matches the identifier grammar `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse and validate a raw plan object into a typed [`Plan`].
///
/// Returns the complete defect list on failure so the planner can build one
/// repair prompt covering everything.
pub fn parse_plan(value: &Value, options: &SchemaOptions) -> Result<Plan, Vec<PlanDefect>> {
    let mut defects = Vec::new();

    let Some(root) = value.as_object() else {
        return Err(vec![PlanDefect::MissingRequiredField(
            "<plan>".to_string(),
            "plan".to_string(),
        )]);
    };

    let raw_steps = match root.get("plan").and_then(|v| v.as_array()) {
        Some(steps) if !steps.is_empty() => steps.as_slice(),
        _ => {
            return Err(vec![PlanDefect::MissingRequiredField(
                "<plan>".to_string(),
                "plan".to_string(),
            )]);
        }
    };

    let mut steps = Vec::with_capacity(raw_steps.len());
    for (position, raw) in raw_steps.iter().enumerate() {
        if let Some(step) = parse_step(raw, position, &mut defects) {
            steps.push(step);
        }
    }

    let max_iterations = parse_iteration_cap(root, options, &mut defects);
    let reasoning = root
        .get("reasoning")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    validate_invariants(&steps, raw_steps, options, &mut defects);

    if defects.is_empty() {
        Ok(Plan {
            steps,
            max_iterations,
            reasoning,
        })
    } else {
        Err(defects)
    }
}

fn parse_step(raw: &Value, position: usize, defects: &mut Vec<PlanDefect>) -> Option<Step> {
    let label = |obj: &Map<String, Value>| {
        obj.get("id")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("<step {}>", position))
    };

    let Some(obj) = raw.as_object() else {
        defects.push(PlanDefect::MissingRequiredField(
            format!("<step {}>", position),
            "id".to_string(),
        ));
        return None;
    };
    let id = label(obj);

    if obj.get("id").and_then(|v| v.as_str()).unwrap_or("").is_empty() {
        defects.push(PlanDefect::MissingRequiredField(id.clone(), "id".to_string()));
        return None;
    }

    let Some(step_type) = obj.get("type").and_then(|v| v.as_str()) else {
        defects.push(PlanDefect::MissingRequiredField(id, "type".to_string()));
        return None;
    };

    let description = obj
        .get("description")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let before = defects.len();
    let kind = match step_type {
        "llm" => {
            let prompt = require_string(obj, &id, "prompt", defects);
            let output_name = require_identifier(obj, &id, "output_name", defects);
            StepKind::Llm {
                prompt: prompt.unwrap_or_default(),
                input_refs: parse_input_refs(obj, &id, defects),
                output_name: output_name.unwrap_or_default(),
            }
        }
        "tool" => {
            let tool_name = require_string(obj, &id, "tool_name", defects);
            let output_name = require_identifier(obj, &id, "output_name", defects);
            let arguments = obj
                .get("arguments")
                .and_then(|v| v.as_object())
                .cloned()
                .unwrap_or_default();
            StepKind::Tool {
                tool_name: tool_name.unwrap_or_default(),
                arguments,
                input_refs: parse_input_refs(obj, &id, defects),
                output_name: output_name.unwrap_or_default(),
            }
        }
        "if" => StepKind::If {
            condition: require_string(obj, &id, "condition", defects).unwrap_or_default(),
            goto_id: require_string(obj, &id, "goto_id", defects).unwrap_or_default(),
        },
        "goto" => StepKind::Goto {
            goto_id: require_string(obj, &id, "goto_id", defects).unwrap_or_default(),
        },
        "end" => StepKind::End,
        other => {
            defects.push(PlanDefect::UnknownStepType(id, other.to_string()));
            return None;
        }
    };

    if defects.len() > before {
        return None;
    }

    Some(Step {
        id,
        description,
        kind,
    })
}

fn require_string(
    obj: &Map<String, Value>,
    step_id: &str,
    field: &str,
    defects: &mut Vec<PlanDefect>,
) -> Option<String> {
    match obj.get(field).and_then(|v| v.as_str()) {
        Some(s) if !s.is_empty() => Some(s.to_string()),
        _ => {
            defects.push(PlanDefect::MissingRequiredField(
                step_id.to_string(),
                field.to_string(),
            ));
            None
        }
    }
}

fn require_identifier(
    obj: &Map<String, Value>,
    step_id: &str,
    field: &str,
    defects: &mut Vec<PlanDefect>,
) -> Option<String> {
    let value = require_string(obj, step_id, field, defects)?;
    if is_identifier(&value) {
        Some(value)
    } else {
        defects.push(PlanDefect::InvalidIdentifier(step_id.to_string(), value));
        None
    }
}

fn parse_input_refs(
    obj: &Map<String, Value>,
    step_id: &str,
    defects: &mut Vec<PlanDefect>,
) -> Vec<String> {
    let Some(raw) = obj.get("input_refs") else {
        return Vec::new();
    };
    let Some(entries) = raw.as_array() else {
        defects.push(PlanDefect::MissingRequiredField(
            step_id.to_string(),
            "input_refs".to_string(),
        ));
        return Vec::new();
    };

    let mut refs = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry.as_str() {
            Some(name) if is_identifier(name) => refs.push(name.to_string()),
            Some(name) => {
                defects.push(PlanDefect::InvalidIdentifier(
                    step_id.to_string(),
                    name.to_string(),
                ));
            }
            None => {
                defects.push(PlanDefect::InvalidIdentifier(
                    step_id.to_string(),
                    entry.to_string(),
                ));
            }
        }
    }
    refs
}

fn parse_iteration_cap(
    root: &Map<String, Value>,
    options: &SchemaOptions,
    defects: &mut Vec<PlanDefect>,
) -> u32 {
    let Some(raw) = root.get("max_iterations") else {
        return options.default_iterations.min(options.hard_cap).max(1);
    };

    match raw.as_u64() {
        Some(n) if n >= 1 && n <= u64::from(options.hard_cap) => n as u32,
        _ => {
            defects.push(PlanDefect::InvalidIterationCap {
                got: raw.to_string(),
                max: options.hard_cap,
            });
            options.default_iterations
        }
    }
}

fn validate_invariants(
    steps: &[Step],
    raw_steps: &[Value],
    options: &SchemaOptions,
    defects: &mut Vec<PlanDefect>,
) {
    // Ids are collected from the raw array so a goto aimed at a step that
    // failed to parse is not reported as dangling on top of that failure.
    let mut all_ids: HashSet<&str> = HashSet::new();
    for raw in raw_steps {
        if let Some(id) = raw.get("id").and_then(|v| v.as_str()) {
            all_ids.insert(id);
        }
    }

    let mut seen_ids: HashSet<&str> = HashSet::new();
    for step in steps {
        if !seen_ids.insert(step.id.as_str()) {
            defects.push(PlanDefect::DuplicateId(step.id.clone()));
        }
    }

    for step in steps {
        if let Some(target) = step.goto_target() {
            if !all_ids.contains(target) {
                defects.push(PlanDefect::DanglingGoto(
                    step.id.clone(),
                    target.to_string(),
                ));
            }
        }
    }

    let mut outputs: HashMap<&str, &str> = HashMap::new();
    for step in steps {
        if let Some(name) = step.output_name() {
            if outputs.insert(name, step.id.as_str()).is_some() {
                defects.push(PlanDefect::DuplicateOutputName(name.to_string()));
            }
        }
    }

    if let Some(known_tools) = &options.known_tools {
        for step in steps {
            if let StepKind::Tool { tool_name, .. } = &step.kind {
                if !known_tools.contains(tool_name) {
                    defects.push(PlanDefect::UnknownTool(
                        step.id.clone(),
                        tool_name.clone(),
                    ));
                }
            }
        }
    }

    // Best-effort forward-reference check over the written sequence. Runtime
    // tolerates a missed reference (empty substitution + warning), so this
    // only logs.
    let mut bound: HashSet<&str> = options
        .system_variables
        .iter()
        .map(String::as_str)
        .collect();
    for step in steps {
        for reference in step.input_refs() {
            if !bound.contains(reference.as_str()) {
                tracing::warn!(
                    step_id = %step.id,
                    reference = %reference,
                    "input_refs entry is not bound by any earlier step"
                );
            }
        }
        if let Some(name) = step.output_name() {
            bound.insert(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Result<Plan, Vec<PlanDefect>> {
        parse_plan(&value, &SchemaOptions::default())
    }

    #[test]
    fn test_parse_minimal_plan() {
        let plan = parse(json!({
            "plan": [
                {"id": "T1", "type": "tool", "tool_name": "get_current_time",
                 "arguments": {}, "output_name": "now"},
                {"id": "END", "type": "end"}
            ],
            "max_iterations": 3,
            "reasoning": "time lookup"
        }))
        .expect("plan");

        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.max_iterations, 3);
        assert_eq!(plan.reasoning, "time lookup");
        assert_eq!(plan.steps[0].output_name(), Some("now"));
    }

    #[test]
    fn test_missing_max_iterations_uses_default() {
        let plan = parse(json!({
            "plan": [{"id": "END", "type": "end"}]
        }))
        .expect("plan");
        assert_eq!(plan.max_iterations, 10);
    }

    #[test]
    fn test_defects_are_collected_not_short_circuited() {
        let err = parse(json!({
            "plan": [
                {"id": "A", "type": "llm", "prompt": "p", "output_name": "x"},
                {"id": "A", "type": "llm", "prompt": "p", "output_name": "x"},
                {"id": "B", "type": "goto", "goto_id": "NOPE"},
                {"id": "C", "type": "warp"}
            ],
            "max_iterations": 9000
        }))
        .unwrap_err();

        let codes: Vec<&str> = err.iter().map(|d| d.code()).collect();
        assert!(codes.contains(&"duplicate_id"));
        assert!(codes.contains(&"duplicate_output_name"));
        assert!(codes.contains(&"dangling_goto"));
        assert!(codes.contains(&"unknown_step_type"));
        assert!(codes.contains(&"invalid_iteration_cap"));
    }

    #[test]
    fn test_missing_required_fields_reported_per_step() {
        let err = parse(json!({
            "plan": [
                {"id": "L1", "type": "llm", "output_name": "x"},
                {"id": "T1", "type": "tool", "output_name": "y"},
                {"id": "END", "type": "end"}
            ]
        }))
        .unwrap_err();

        assert!(err.contains(&PlanDefect::MissingRequiredField(
            "L1".to_string(),
            "prompt".to_string()
        )));
        assert!(err.contains(&PlanDefect::MissingRequiredField(
            "T1".to_string(),
            "tool_name".to_string()
        )));
    }

    #[test]
    fn test_empty_plan_is_a_defect() {
        let err = parse(json!({"plan": [], "max_iterations": 1})).unwrap_err();
        assert_eq!(err[0].code(), "missing_required_field");
    }

    #[test]
    fn test_tool_outside_catalog_rejected() {
        let options = SchemaOptions::default()
            .with_known_tools(["get_current_time".to_string()]);
        let err = parse_plan(
            &json!({
                "plan": [
                    {"id": "T1", "type": "tool", "tool_name": "rm_rf",
                     "output_name": "gone"},
                    {"id": "END", "type": "end"}
                ],
                "max_iterations": 2
            }),
            &options,
        )
        .unwrap_err();
        assert_eq!(err[0].code(), "unknown_tool");
    }

    #[test]
    fn test_invalid_output_identifier_rejected() {
        let err = parse(json!({
            "plan": [
                {"id": "L1", "type": "llm", "prompt": "p", "output_name": "9lives"},
                {"id": "END", "type": "end"}
            ]
        }))
        .unwrap_err();
        assert_eq!(err[0].code(), "invalid_identifier");
    }

    #[test]
    fn test_plan_round_trips_through_json() {
        let value = json!({
            "plan": [
                {"id": "L1", "type": "llm", "description": "write",
                 "prompt": "Write about {user_query}",
                 "input_refs": ["user_query"], "output_name": "essay"},
                {"id": "C1", "type": "if", "condition": "essay == 'ok'",
                 "goto_id": "END"},
                {"id": "G1", "type": "goto", "goto_id": "L1"},
                {"id": "END", "type": "end"}
            ],
            "max_iterations": 8,
            "reasoning": "loop until good"
        });
        let plan = parse(value).expect("plan");
        let reparsed = parse(serde_json::to_value(&plan).expect("serialize")).expect("reparse");
        assert_eq!(plan, reparsed);
    }

    #[test]
    fn test_identifier_grammar() {
        assert!(is_identifier("user_query"));
        assert!(is_identifier("_x9"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("9x"));
        assert!(!is_identifier("a-b"));
    }
}
