//! Variable environment
//!
//! Per-execution name -> string store with write-once bindings and
//! `{name}` template interpolation. The environment is owned by the
//! interpreter task; other tasks observe values only through events.

use std::collections::HashMap;

use thiserror::Error;

use crate::schema::is_identifier;

/// Environment errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    #[error("variable '{0}' is already bound")]
    DuplicateBinding(String),

    #[error("'{0}' is not a valid variable name")]
    InvalidName(String),
}

impl EnvError {
    /// Stable machine-readable code.
    pub fn kind(&self) -> &'static str {
        match self {
            EnvError::DuplicateBinding(_) => "duplicate_binding",
            EnvError::InvalidName(_) => "invalid_name",
        }
    }
}

/// Result of rendering a template against the environment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Rendering {
    pub text: String,
    /// References that resolved to a bound value, in order of occurrence.
    pub refs_used: Vec<String>,
    /// References that were not bound and rendered as the empty string.
    pub refs_missing: Vec<String>,
}

/// Ordered write-once mapping from variable name to string value.
#[derive(Debug, Default)]
pub struct Environment {
    values: HashMap<String, String>,
    order: Vec<String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a system-provided variable, overwriting any previous value.
    ///
    /// Used by the execution starter for `user_query` and similar seeds;
    /// plan steps must go through [`Environment::bind`].
    pub fn seed(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if !self.values.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.values.insert(name, value.into());
    }

    /// Bind a variable, enforcing write-once semantics.
    pub fn bind(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), EnvError> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(EnvError::InvalidName(name));
        }
        if self.values.contains_key(&name) {
            return Err(EnvError::DuplicateBinding(name));
        }
        self.order.push(name.clone());
        self.values.insert(name, value.into());
        Ok(())
    }

    /// Look up a variable.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Bound variables in insertion order.
    pub fn snapshot(&self) -> Vec<(String, String)> {
        self.order
            .iter()
            .filter_map(|name| {
                self.values
                    .get(name)
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect()
    }

    /// Resolve `{name}` placeholders in `template`.
    ///
    /// `{{` and `}}` are literal braces. An unbound `{name}` renders as the
    /// empty string and is recorded in `refs_missing`. Substituted values
    /// are inserted verbatim; there is no recursive expansion.
    pub fn render(&self, template: &str) -> Rendering {
        let mut out = Rendering::default();
        let bytes = template.as_bytes();
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                b'{' if bytes.get(i + 1) == Some(&b'{') => {
                    out.text.push('{');
                    i += 2;
                }
                b'}' if bytes.get(i + 1) == Some(&b'}') => {
                    out.text.push('}');
                    i += 2;
                }
                b'{' => {
                    if let Some((name, end)) = scan_reference(template, i) {
                        match self.values.get(name) {
                            Some(value) => {
                                out.text.push_str(value);
                                out.refs_used.push(name.to_string());
                            }
                            None => out.refs_missing.push(name.to_string()),
                        }
                        i = end;
                    } else {
                        // Not a reference, e.g. "{ " or "{9x}": keep literal.
                        out.text.push('{');
                        i += 1;
                    }
                }
                _ => {
                    // Advance over one full UTF-8 scalar.
                    let ch = template[i..].chars().next().unwrap_or('\u{fffd}');
                    out.text.push(ch);
                    i += ch.len_utf8();
                }
            }
        }

        out
    }
}

/// Scan an identifier reference `{name}` starting at the `{` byte offset.
/// Returns the name and the offset one past the closing brace.
fn scan_reference(template: &str, start: usize) -> Option<(&str, usize)> {
    let rest = &template[start + 1..];
    let close = rest.find('}')?;
    let name = &rest[..close];
    if is_identifier(name) {
        Some((name, start + 1 + close + 1))
    } else {
        None
    }
}
