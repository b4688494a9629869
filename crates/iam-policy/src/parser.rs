//! Policy payload parsing.

use crate::error::{PolicyError, Result};
use crate::expression::Expression;
use crate::request::Action;
use serde::{Deserialize, Serialize};

/// Supported policy payload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyFormat {
    Yaml,
    Json,
}

impl PolicyFormat {
    /// Detects format from content.
    pub fn detect(content: &str) -> Self {
        let trimmed = content.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            PolicyFormat::Json
        } else {
            PolicyFormat::Yaml
        }
    }

    /// Reads text in this format into a JSON value.
    pub fn read_value(&self, content: &str) -> Result<serde_json::Value> {
        match self {
            PolicyFormat::Json => Ok(serde_json::from_str(content)?),
            PolicyFormat::Yaml => Ok(serde_yaml::from_str(content)?),
        }
    }
}

/// Parses a policy expression from a string, auto-detecting format.
pub fn parse_expression(content: &str) -> Result<Expression> {
    parse_expression_with_format(content, PolicyFormat::detect(content))
}

/// Parses a policy expression from a string with specified format.
pub fn parse_expression_with_format(content: &str, format: PolicyFormat) -> Result<Expression> {
    Expression::parse(&format.read_value(content)?)
}

/// The policy of one action, as returned by a multi-action query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPolicy {
    pub action: Action,
    pub condition: serde_json::Value,
}

impl ActionPolicy {
    pub fn new(action_id: impl Into<String>, condition: serde_json::Value) -> Self {
        Self {
            action: Action::new(action_id),
            condition,
        }
    }

    pub fn action_id(&self) -> &str {
        &self.action.id
    }
}

/// Parses a multi-action query response: `[{"action": {"id": ..}, "condition": {..}}, ..]`.
pub fn parse_action_policies(value: &serde_json::Value) -> Result<Vec<ActionPolicy>> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    let policies: Vec<ActionPolicy> = serde_json::from_value(value.clone())
        .map_err(|e| PolicyError::ParseError(format!("invalid action policy list: {}", e)))?;

    for policy in &policies {
        if policy.action.id.is_empty() {
            return Err(PolicyError::ParseError(
                "action policy has an empty action id".to_string(),
            ));
        }
    }
    Ok(policies)
}

/// Parses a multi-action query response from text, auto-detecting format.
pub fn parse_action_policies_str(content: &str) -> Result<Vec<ActionPolicy>> {
    let value = PolicyFormat::detect(content).read_value(content)?;
    parse_action_policies(&value)
}
