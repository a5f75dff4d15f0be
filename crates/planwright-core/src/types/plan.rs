//! Plan type definitions
//!
//! A Plan is an ordered sequence of labelled steps plus an iteration cap.
//! Ordering is significant: execution falls through to the next step unless
//! a jump redirects it.

use serde::Serialize;

use super::Step;

/// Hard ceiling on `max_iterations` accepted by the validator.
pub const ITERATION_HARD_CAP: u32 = 50;

/// An executable plan produced by the planner.
///
/// Plans serialize back to the planner wire shape (`plan` array,
/// `max_iterations`, `reasoning`); parsing goes through
/// [`crate::schema::parse_plan`] so structural defects are collected rather
/// than failing on the first field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    #[serde(rename = "plan")]
    pub steps: Vec<Step>,
    pub max_iterations: u32,
    /// Planner's explanation of its approach, observational only.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub reasoning: String,
}

impl Plan {
    /// Create a plan from steps and an iteration cap.
    pub fn new(steps: Vec<Step>, max_iterations: u32) -> Self {
        Self {
            steps,
            max_iterations,
            reasoning: String::new(),
        }
    }

    /// Set the reasoning text.
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    /// Look up a step by id.
    pub fn get_step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Position of a step id in the written sequence.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }
}
