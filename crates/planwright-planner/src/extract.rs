//! JSON extraction from model output
//!
//! Model output may wrap the plan object in code fences or prose. The
//! extractor strips fence markers, locates the first balanced `{...}` span,
//! and parses it.

use serde_json::Value;
use thiserror::Error;

/// Extraction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("model output did not contain a JSON object")]
    NoJson,

    #[error("malformed JSON at byte {position}: {message}")]
    MalformedJson { position: usize, message: String },
}

impl ExtractError {
    /// Stable machine-readable code.
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractError::NoJson => "malformed_json",
            ExtractError::MalformedJson { .. } => "malformed_json",
        }
    }
}

/// Extract the first JSON object from `text`.
pub fn extract_object(text: &str) -> Result<Value, ExtractError> {
    let stripped = strip_code_fences(text);
    let mut first_failure: Option<ExtractError> = None;

    for (start, ch) in stripped.char_indices() {
        if ch != '{' {
            continue;
        }
        let Some(end) = find_object_end(&stripped, start) else {
            continue;
        };
        let candidate = &stripped[start..=end];
        match serde_json::from_str::<Value>(candidate) {
            Ok(value) if value.is_object() => return Ok(value),
            Ok(_) => {}
            Err(error) => {
                if first_failure.is_none() {
                    first_failure = Some(ExtractError::MalformedJson {
                        position: start,
                        message: error.to_string(),
                    });
                }
            }
        }
    }

    Err(first_failure.unwrap_or(ExtractError::NoJson))
}

/// Drop Markdown fence marker lines, keeping their content.
fn strip_code_fences(text: &str) -> String {
    if !text.contains("```") {
        return text.to_string();
    }
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Find the closing brace of the object starting at `start`, honouring
/// string literals and escapes.
fn find_object_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text[start..].char_indices() {
        let abs = start + idx;
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(abs);
                }
            }
            _ => {}
        }
    }
    None
}
