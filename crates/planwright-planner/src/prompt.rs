//! Planning and execution prompts
//!
//! The planning system prompt teaches the model the plan grammar, the
//! planning rules, and the registered tool catalog. Prompt composition is
//! bounded by an approximate token budget so an oversized catalog cannot
//! blow past the model's context window.

use std::fmt::Write;

use planwright_core::ToolInfo;

/// System prompt sent with every `llm` step execution.
///
/// The model executes exactly one step of a pre-planned task; planning and
/// coordination happen elsewhere.
pub const EXECUTION_SYSTEM_PROMPT: &str = "\
You are an AI assistant executing a single step of a pre-planned task.

- Complete the specific task in the user prompt, directly and completely.
- Do not plan, coordinate, or reference other steps.
- Do not produce JSON or structured formats unless the prompt asks for them.
- Respond naturally; your answer is consumed by a larger system.";

/// Roughly four characters per token, the usual English approximation.
const CHARS_PER_TOKEN: usize = 4;

/// Approximate token count of a text.
pub fn approx_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Character allowance for a token budget.
fn char_allowance(tokens: usize) -> usize {
    tokens.saturating_mul(CHARS_PER_TOKEN)
}

/// Build the planning system prompt.
///
/// States the plan grammar with worked examples, the planning rules
/// (including the `max_iterations` hard cap and the ban on tools outside
/// the catalog), and the serialized tool catalog. When the catalog would
/// overflow `budget_tokens`, trailing entries are dropped and a warning
/// logged.
pub fn build_planning_prompt(catalog: &[ToolInfo], hard_cap: u32, budget_tokens: usize) -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "You are an AI planning assistant. Analyze the user's request and \
produce a structured execution plan.\n\n\
=== PLAN FORMAT ===\n\n\
Respond with ONE JSON object:\n\n\
{\n\
  \"plan\": [\n\
    {\n\
      \"id\": \"step_identifier\",\n\
      \"type\": \"llm\" | \"tool\" | \"if\" | \"goto\" | \"end\",\n\
      \"description\": \"human readable description\",\n\n\
      // llm steps\n\
      \"prompt\": \"the exact prompt to send\",\n\
      \"output_name\": \"variable_name_for_result\",\n\n\
      // tool steps\n\
      \"tool_name\": \"exact_tool_name\",\n\
      \"arguments\": {\"param\": \"value\"},\n\
      \"output_name\": \"variable_name_for_result\",\n\n\
      // if steps\n\
      \"condition\": \"variable_name >= 8\",\n\
      \"goto_id\": \"step_to_jump_to_if_true\",\n\n\
      // goto steps\n\
      \"goto_id\": \"step_to_jump_to\",\n\n\
      // referencing previous outputs\n\
      \"input_refs\": [\"output_name1\", \"output_name2\"]\n\
    }\n\
  ],\n\
  \"max_iterations\": estimated_number,\n\
  \"reasoning\": \"explanation of your planning approach\"\n\
}\n\n",
    );

    prompt.push_str(
        "=== STEP TYPES ===\n\n\
1. llm: direct query to the language model. Use for answering, generating, analyzing.\n\
2. tool: execute an available tool. Use for file operations, system queries, APIs.\n\
3. if: jump to goto_id when the condition is true, else continue. \
Conditions compare variables with ==, !=, <, <=, >, >= and combine with &&, ||, !.\n\
4. goto: unconditional jump. Outputs bind once, so never jump back to a step \
that binds an output_name that already exists.\n\
5. end: mark completion. Always include as the final step.\n\n",
    );

    prompt.push_str(
        "=== EXAMPLES ===\n\n\
Simple query:\n\
{\"plan\": [\
{\"id\": \"L1\", \"type\": \"llm\", \"description\": \"Answer directly\", \
\"prompt\": \"Why is the sky blue? Explain in detail.\", \"output_name\": \"answer\"}, \
{\"id\": \"END\", \"type\": \"end\"}], \
\"max_iterations\": 2, \"reasoning\": \"One LLM response suffices\"}\n\n\
Tool task:\n\
{\"plan\": [\
{\"id\": \"T1\", \"type\": \"tool\", \"description\": \"List the directory\", \
\"tool_name\": \"list_files\", \"arguments\": {\"path\": \".\"}, \"output_name\": \"files\"}, \
{\"id\": \"L1\", \"type\": \"llm\", \"description\": \"Summarize the listing\", \
\"prompt\": \"Summarize these files: {files}\", \"input_refs\": [\"files\"], \
\"output_name\": \"summary\"}, \
{\"id\": \"END\", \"type\": \"end\"}], \
\"max_iterations\": 3, \"reasoning\": \"Tool first, then analysis\"}\n\n\
Conditional improvement:\n\
{\"plan\": [\
{\"id\": \"L1\", \"type\": \"llm\", \"prompt\": \"Write a short story.\", \"output_name\": \"story\"}, \
{\"id\": \"L2\", \"type\": \"llm\", \"prompt\": \"Rate this story 1-10, reply with a number only: {story}\", \
\"input_refs\": [\"story\"], \"output_name\": \"rating\"}, \
{\"id\": \"C1\", \"type\": \"if\", \"condition\": \"rating >= 7\", \"goto_id\": \"END\"}, \
{\"id\": \"L3\", \"type\": \"llm\", \"prompt\": \"Improve this story: {story}\", \
\"input_refs\": [\"story\"], \"output_name\": \"improved\"}, \
{\"id\": \"END\", \"type\": \"end\"}], \
\"max_iterations\": 6, \"reasoning\": \"Improve once, only when the rating is low\"}\n\n",
    );

    let _ = write!(
        prompt,
        "=== RULES ===\n\n\
1. Break the request into logical, sequential steps.\n\
2. Use descriptive ids: L1, L2 for llm steps; T1, T2 for tools; C1 for conditions.\n\
3. Declare input_refs whenever a step reads an earlier output.\n\
4. Reference variables in prompts and arguments with {{variable_name}} syntax.\n\
5. Every output_name must be a new variable; never rebind an existing one.\n\
6. Always end with an end step.\n\
7. max_iterations must be a realistic estimate and never exceed {hard_cap}.\n\
8. Only use tools listed in the catalog below; never invent tool names.\n\
9. Check each tool's input schema before writing its arguments.\n\n\
=== AVAILABLE TOOLS ===\n\n"
    );

    let catalog_budget = char_allowance(budget_tokens).saturating_sub(prompt.len() + 128);
    prompt.push_str(&serialize_catalog(catalog, catalog_budget));

    prompt.push_str(
        "\n=== OUTPUT ===\n\n\
Respond with ONLY the JSON plan object. No text outside the JSON.",
    );

    prompt
}

/// Build the single repair prompt from the previous output and the
/// collected diagnostics.
pub fn build_repair_prompt(previous_output: &str, diagnostics: &[String]) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "Your previous plan was rejected. Fix every problem listed below and \
respond with the corrected JSON plan object only.\n\n=== PREVIOUS OUTPUT ===\n",
    );
    prompt.push_str(previous_output);
    prompt.push_str("\n\n=== PROBLEMS ===\n");
    for diagnostic in diagnostics {
        let _ = writeln!(prompt, "- {}", diagnostic);
    }
    prompt
}

fn serialize_catalog(catalog: &[ToolInfo], budget_chars: usize) -> String {
    let mut out = String::new();
    for (position, tool) in catalog.iter().enumerate() {
        let entry = serde_json::to_string_pretty(tool).unwrap_or_else(|_| tool.name.clone());
        if !out.is_empty() && out.len() + entry.len() > budget_chars {
            tracing::warn!(
                dropped = catalog.len() - position,
                budget_chars,
                "tool catalog truncated to fit the planning prompt budget"
            );
            break;
        }
        out.push_str(&entry);
        out.push('\n');
    }
    if out.is_empty() {
        out.push_str("(no tools registered)\n");
    }
    out
}
