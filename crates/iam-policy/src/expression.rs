//! Policy expression tree.
//!
//! The authorization service answers a query with a condition tree such as
//!
//! ```json
//! {"op": "OR", "content": [
//!     {"op": "eq", "field": "host.id", "value": "1"},
//!     {"op": "starts_with", "field": "host._bk_iam_path_", "value": "/biz,1/set,*/"}
//! ]}
//! ```
//!
//! [`Expression::parse`] turns that payload into an immutable tree, checking
//! its shape node by node. The tree is then evaluated against an
//! [`AttributeStore`] and can be rendered back to text for diagnostics.

use crate::context::AttributeStore;
use crate::error::{PolicyError, Result};
use crate::evaluator::{eval_binary_operator, validate_policy_value};
use crate::types::{AttributeValue, LogicalOp, OperatorKind};
use serde_json::{json, Value};
use std::fmt;
use tracing::warn;

/// A node of a policy condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// `AND` / `OR` over child expressions.
    Logical {
        op: LogicalOp,
        children: Vec<Expression>,
    },

    /// `field op value`, where `field` is a `"type.attribute"` key.
    Comparison {
        op: OperatorKind,
        field: String,
        value: AttributeValue,
    },

    /// A node whose `op` is not a known operator. Always evaluates to false.
    Unrecognized {
        op: String,
        field: String,
        value: Option<AttributeValue>,
    },
}

impl Expression {
    /// `AND` over `children`.
    pub fn and(children: Vec<Expression>) -> Self {
        Expression::Logical {
            op: LogicalOp::And,
            children,
        }
    }

    /// `OR` over `children`.
    pub fn or(children: Vec<Expression>) -> Self {
        Expression::Logical {
            op: LogicalOp::Or,
            children,
        }
    }

    /// A leaf comparison.
    pub fn comparison(
        op: OperatorKind,
        field: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        Expression::Comparison {
            op,
            field: field.into(),
            value: value.into(),
        }
    }

    /// Unconditional grant on `field`.
    pub fn any(field: impl Into<String>) -> Self {
        Expression::Comparison {
            op: OperatorKind::Any,
            field: field.into(),
            value: AttributeValue::List(Vec::new()),
        }
    }

    /// Parses a policy payload. Unknown operators become [`Expression::Unrecognized`].
    pub fn parse(payload: &Value) -> Result<Self> {
        parse_node(payload, false)
    }

    /// Parses a policy payload, rejecting unknown operators.
    pub fn parse_strict(payload: &Value) -> Result<Self> {
        parse_node(payload, true)
    }

    /// Parses a policy from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let payload: Value = serde_json::from_str(json)?;
        Self::parse(&payload)
    }

    /// Parses a policy from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let payload: Value = serde_yaml::from_str(yaml)?;
        Self::parse(&payload)
    }

    /// Converts the tree back into its payload form.
    pub fn to_value(&self) -> Value {
        match self {
            Expression::Logical { op, children } => json!({
                "op": op.as_str(),
                "content": children.iter().map(Expression::to_value).collect::<Vec<_>>(),
            }),
            Expression::Comparison { op, field, value } => json!({
                "op": op.as_str(),
                "field": field,
                "value": value,
            }),
            Expression::Unrecognized { op, field, value } => json!({
                "op": op,
                "field": field,
                "value": value,
            }),
        }
    }

    /// Serializes the tree to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.to_value())
            .map_err(|e| PolicyError::SerializationError(e.to_string()))
    }

    /// Serializes the tree to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.to_value())
            .map_err(|e| PolicyError::SerializationError(e.to_string()))
    }

    /// Evaluates the tree against `store`.
    ///
    /// `AND` stops at the first false child and is true when empty; `OR`
    /// stops at the first true child and is false when empty. A shape error
    /// in any evaluated leaf aborts the whole evaluation.
    pub fn eval(&self, store: &AttributeStore) -> Result<bool> {
        match self {
            Expression::Logical {
                op: LogicalOp::And,
                children,
            } => {
                for child in children {
                    if !child.eval(store)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Expression::Logical {
                op: LogicalOp::Or,
                children,
            } => {
                for child in children {
                    if child.eval(store)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Expression::Comparison { op, field, value } => {
                eval_binary_operator(*op, field, value, store)
            }
            Expression::Unrecognized { .. } => Ok(false),
        }
    }

    /// Renders the tree with each field replaced by its resolved value.
    pub fn render(&self, store: &AttributeStore) -> String {
        self.rendered(store).to_string()
    }

    /// Lazily rendered form of [`Expression::render`], for log fields.
    pub fn rendered<'a>(&'a self, store: &'a AttributeStore) -> Rendered<'a> {
        Rendered { expr: self, store }
    }

    /// Number of leaves in the tree.
    pub fn leaf_count(&self) -> usize {
        match self {
            Expression::Logical { children, .. } => children.iter().map(Expression::leaf_count).sum(),
            _ => 1,
        }
    }
}

/// Canonical text form: `((obj.id eq 1) AND (obj.name in [a, b]))`.
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_expression(f, self, &mut |f, field| f.write_str(field))
    }
}

/// See [`Expression::rendered`].
pub struct Rendered<'a> {
    expr: &'a Expression,
    store: &'a AttributeStore,
}

impl fmt::Display for Rendered<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.store;
        write_expression(f, self.expr, &mut |f, field| match store.resolve(field) {
            Some(value) => write!(f, "{}", value),
            None => Ok(()),
        })
    }
}

fn write_expression(
    f: &mut fmt::Formatter<'_>,
    expr: &Expression,
    write_field: &mut dyn FnMut(&mut fmt::Formatter<'_>, &str) -> fmt::Result,
) -> fmt::Result {
    match expr {
        Expression::Logical { op, children } => {
            f.write_str("(")?;
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    write!(f, " {} ", op.as_str())?;
                }
                write_expression(f, child, write_field)?;
            }
            f.write_str(")")
        }
        Expression::Comparison { op, field, value } => {
            f.write_str("(")?;
            write_field(f, field)?;
            write!(f, " {} {})", op, value)
        }
        Expression::Unrecognized { op, field, value } => {
            f.write_str("(")?;
            write_field(f, field)?;
            write!(f, " {} ", op)?;
            if let Some(value) = value {
                write!(f, "{}", value)?;
            }
            f.write_str(")")
        }
    }
}

fn parse_node(payload: &Value, strict: bool) -> Result<Expression> {
    let node = payload
        .as_object()
        .ok_or_else(|| PolicyError::ParseError(format!("policy node must be an object, got {}", payload)))?;

    let op_name = node
        .get("op")
        .and_then(Value::as_str)
        .ok_or_else(|| PolicyError::ParseError("policy node is missing `op`".to_string()))?;

    let op = match op_name.parse::<OperatorKind>() {
        Ok(op) => op,
        Err(err) if strict => return Err(err),
        Err(_) => {
            let field = node.get("field").and_then(Value::as_str).unwrap_or_default();
            warn!(op = op_name, field, "Unrecognized policy operator; node evaluates to false");
            return Ok(Expression::Unrecognized {
                op: op_name.to_string(),
                field: field.to_string(),
                value: node
                    .get("value")
                    .and_then(|v| AttributeValue::from_json(field, v).ok()),
            });
        }
    };

    if op.is_logical() {
        let content = node.get("content").and_then(Value::as_array).ok_or_else(|| {
            PolicyError::ParseError(format!("`{}` node requires a `content` array", op))
        })?;
        let children = content
            .iter()
            .map(|child| parse_node(child, strict))
            .collect::<Result<Vec<_>>>()?;
        let op = if op == OperatorKind::And {
            LogicalOp::And
        } else {
            LogicalOp::Or
        };
        return Ok(Expression::Logical { op, children });
    }

    match op {
        OperatorKind::Any => {
            let field = node.get("field").and_then(Value::as_str).unwrap_or_default();
            let value = match node.get("value") {
                Some(v) if !v.is_null() => AttributeValue::from_json(field, v)?,
                _ => AttributeValue::List(Vec::new()),
            };
            Ok(Expression::Comparison {
                op,
                field: field.to_string(),
                value,
            })
        }
        _ => {
            let field = node.get("field").and_then(Value::as_str).ok_or_else(|| {
                PolicyError::ParseError(format!("`{}` node requires a string `field`", op))
            })?;
            let value = node.get("value").ok_or_else(|| {
                PolicyError::ParseError(format!("`{}` node on '{}' requires a `value`", op, field))
            })?;
            let value = AttributeValue::from_json(field, value)?;
            validate_policy_value(op, field, &value)?;

            Ok(Expression::Comparison {
                op,
                field: field.to_string(),
                value,
            })
        }
    }
}
