//! Core types for policy evaluation.

use crate::error::{PolicyError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Field suffix that triggers the path wildcard rewrite for `starts_with`.
pub const KEYWORD_BK_IAM_PATH_FIELD_SUFFIX: &str = "._bk_iam_path_";

/// A single attribute or policy value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(serde_json::Number),
    Str(String),
}

impl Scalar {
    /// Returns the string slice if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the numeric value if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    fn from_json(field: &str, value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::String(s) => Ok(Scalar::Str(s.clone())),
            serde_json::Value::Number(n) => Ok(Scalar::Number(n.clone())),
            serde_json::Value::Bool(b) => Ok(Scalar::Bool(*b)),
            other => Err(PolicyError::invalid_field(
                field,
                format!("expected a string, number or bool, got {}", other),
            )),
        }
    }
}

/// Booleans render as `true` / `false` rather than `1` / an empty string.
impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Number(n) => write!(f, "{}", n),
            Scalar::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Str(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Str(s)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Number(n.into())
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

/// Value of an attribute, or of a policy comparison: one scalar or a list of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Scalar(Scalar),
    List(Vec<Scalar>),
}

impl AttributeValue {
    /// Converts a JSON value, rejecting `null`, objects and nested arrays.
    ///
    /// `field` is only used to label the error.
    pub fn from_json(field: &str, value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| Scalar::from_json(field, item))
                .collect::<Result<Vec<_>>>()
                .map(AttributeValue::List),
            other => Scalar::from_json(field, other).map(AttributeValue::Scalar),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, AttributeValue::List(_))
    }

    pub fn as_list(&self) -> Option<&[Scalar]> {
        match self {
            AttributeValue::List(items) => Some(items),
            AttributeValue::Scalar(_) => None,
        }
    }

    /// Applies `f` to the scalar, or to every element of the list.
    pub fn map_scalars(self, mut f: impl FnMut(Scalar) -> Scalar) -> Self {
        match self {
            AttributeValue::Scalar(s) => AttributeValue::Scalar(f(s)),
            AttributeValue::List(items) => AttributeValue::List(items.into_iter().map(f).collect()),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Scalar(s) => write!(f, "{}", s),
            AttributeValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl TryFrom<&serde_json::Value> for AttributeValue {
    type Error = PolicyError;

    fn try_from(value: &serde_json::Value) -> Result<Self> {
        AttributeValue::from_json("value", value)
    }
}

impl From<Scalar> for AttributeValue {
    fn from(value: Scalar) -> Self {
        AttributeValue::Scalar(value)
    }
}

macro_rules! attribute_value_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for AttributeValue {
                fn from(value: $ty) -> Self {
                    AttributeValue::Scalar(value.into())
                }
            }

            impl From<Vec<$ty>> for AttributeValue {
                fn from(items: Vec<$ty>) -> Self {
                    AttributeValue::List(items.into_iter().map(Into::into).collect())
                }
            }
        )*
    };
}

attribute_value_from!(&str, String, i64, bool);

impl From<Vec<Scalar>> for AttributeValue {
    fn from(items: Vec<Scalar>) -> Self {
        AttributeValue::List(items)
    }
}

/// Logical combinator of an expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

impl LogicalOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOp::And => "AND",
            LogicalOp::Or => "OR",
        }
    }
}

impl From<LogicalOp> for OperatorKind {
    fn from(op: LogicalOp) -> Self {
        match op {
            LogicalOp::And => OperatorKind::And,
            LogicalOp::Or => OperatorKind::Or,
        }
    }
}

/// Every operator a policy condition may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    StartsWith,
    NotStartsWith,
    EndsWith,
    NotEndsWith,
    In,
    NotIn,
    Contains,
    NotContains,
    StringContains,
    Any,
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

impl OperatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatorKind::Eq => "eq",
            OperatorKind::NotEq => "not_eq",
            OperatorKind::Lt => "lt",
            OperatorKind::Lte => "lte",
            OperatorKind::Gt => "gt",
            OperatorKind::Gte => "gte",
            OperatorKind::StartsWith => "starts_with",
            OperatorKind::NotStartsWith => "not_starts_with",
            OperatorKind::EndsWith => "ends_with",
            OperatorKind::NotEndsWith => "not_ends_with",
            OperatorKind::In => "in",
            OperatorKind::NotIn => "not_in",
            OperatorKind::Contains => "contains",
            OperatorKind::NotContains => "not_contains",
            OperatorKind::StringContains => "string_contains",
            OperatorKind::Any => "any",
            OperatorKind::And => "AND",
            OperatorKind::Or => "OR",
        }
    }

    /// Returns true for the `not_*` operators.
    pub fn is_negative(&self) -> bool {
        matches!(
            self,
            OperatorKind::NotEq
                | OperatorKind::NotStartsWith
                | OperatorKind::NotEndsWith
                | OperatorKind::NotIn
                | OperatorKind::NotContains
        )
    }

    /// Returns the positive operator a `not_*` operator negates; others map to themselves.
    pub fn base(&self) -> OperatorKind {
        match self {
            OperatorKind::NotEq => OperatorKind::Eq,
            OperatorKind::NotStartsWith => OperatorKind::StartsWith,
            OperatorKind::NotEndsWith => OperatorKind::EndsWith,
            OperatorKind::NotIn => OperatorKind::In,
            OperatorKind::NotContains => OperatorKind::Contains,
            other => *other,
        }
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, OperatorKind::And | OperatorKind::Or)
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatorKind {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self> {
        let op = match s {
            "eq" => OperatorKind::Eq,
            "not_eq" => OperatorKind::NotEq,
            "lt" => OperatorKind::Lt,
            "lte" => OperatorKind::Lte,
            "gt" => OperatorKind::Gt,
            "gte" => OperatorKind::Gte,
            "starts_with" => OperatorKind::StartsWith,
            "not_starts_with" => OperatorKind::NotStartsWith,
            "ends_with" => OperatorKind::EndsWith,
            "not_ends_with" => OperatorKind::NotEndsWith,
            "in" => OperatorKind::In,
            "not_in" => OperatorKind::NotIn,
            "contains" => OperatorKind::Contains,
            "not_contains" => OperatorKind::NotContains,
            "string_contains" => OperatorKind::StringContains,
            "any" => OperatorKind::Any,
            "AND" => OperatorKind::And,
            "OR" => OperatorKind::Or,
            other => return Err(PolicyError::UnsupportedOperator(other.to_string())),
        };
        Ok(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operator_round_trip_names() {
        for name in ["eq", "not_in", "string_contains", "any", "AND", "OR"] {
            let op: OperatorKind = name.parse().unwrap();
            assert_eq!(op.as_str(), name);
        }
        assert!(matches!(
            "regex".parse::<OperatorKind>(),
            Err(PolicyError::UnsupportedOperator(_))
        ));
    }

    #[test]
    fn test_negative_group() {
        assert!(OperatorKind::NotContains.is_negative());
        assert_eq!(OperatorKind::NotContains.base(), OperatorKind::Contains);
        assert!(!OperatorKind::StringContains.is_negative());
        assert_eq!(OperatorKind::Gte.base(), OperatorKind::Gte);
        assert!(OperatorKind::Or.is_logical());
        assert!(!OperatorKind::Any.is_logical());
    }

    #[test]
    fn test_attribute_value_from_json() {
        assert_eq!(
            AttributeValue::from_json("obj.id", &json!(["1", 2])).unwrap(),
            AttributeValue::List(vec![Scalar::from("1"), Scalar::from(2i64)])
        );
        assert!(AttributeValue::from_json("obj.id", &json!(null)).is_err());
        assert!(AttributeValue::from_json("obj.id", &json!([["nested"]])).is_err());
        assert!(AttributeValue::from_json("obj.id", &json!({"a": 1})).is_err());

        let value = AttributeValue::try_from(&json!(1.5)).unwrap();
        assert!(!value.is_list());
        assert_eq!(value.as_list(), None);
        let list = AttributeValue::from(vec!["a"]);
        assert_eq!(list.as_list(), Some(&[Scalar::from("a")][..]));
        assert!(matches!(
            AttributeValue::try_from(&json!(null)),
            Err(PolicyError::InvalidFieldValue { .. })
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(AttributeValue::from(vec!["a", "b"]).to_string(), "[a, b]");
        assert_eq!(AttributeValue::from(12i64).to_string(), "12");
        assert_eq!(AttributeValue::from(true).to_string(), "true");
    }
}
