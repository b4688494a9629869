//! Evaluation result with diagnostics.

use serde::{Deserialize, Serialize};

/// Outcome of evaluating one policy, with the text forms used for debugging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the policy grants access.
    pub allowed: bool,

    /// Canonical text of the expression, e.g. `((host.id eq 1) OR (...))`.
    pub expression: String,

    /// The expression with each field replaced by its resolved value.
    pub rendered: String,

    /// Time taken to parse and evaluate (in microseconds).
    pub evaluation_time_us: Option<u64>,
}

impl Decision {
    pub fn new(allowed: bool, expression: impl Into<String>, rendered: impl Into<String>) -> Self {
        Self {
            allowed,
            expression: expression.into(),
            rendered: rendered.into(),
            evaluation_time_us: None,
        }
    }

    /// Sets the evaluation time.
    pub fn with_evaluation_time(mut self, time_us: u64) -> Self {
        self.evaluation_time_us = Some(time_us);
        self
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    pub fn is_denied(&self) -> bool {
        !self.allowed
    }
}
