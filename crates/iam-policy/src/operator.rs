//! Operator registry.
//!
//! Every comparison operator maps to a pure comparator over two operands.
//! Comparators never fail: an operand of the wrong kind simply does not
//! satisfy the positive predicate. Shape errors are raised one level up, in
//! the evaluator, before a comparator is ever called.

use crate::error::{PolicyError, Result};
use crate::types::{AttributeValue, OperatorKind, Scalar};
use std::cmp::Ordering;

/// One side of a comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand<'a> {
    /// The attribute could not be resolved.
    Absent,
    Scalar(&'a Scalar),
    List(&'a [Scalar]),
}

impl<'a> Operand<'a> {
    pub fn from_value(value: Option<&'a AttributeValue>) -> Self {
        match value {
            None => Operand::Absent,
            Some(AttributeValue::Scalar(s)) => Operand::Scalar(s),
            Some(AttributeValue::List(items)) => Operand::List(items),
        }
    }

    fn as_str(&self) -> Option<&'a str> {
        match *self {
            Operand::Scalar(s) => s.as_str(),
            _ => None,
        }
    }

    fn contains(&self, needle: Operand<'_>) -> bool {
        match (self, needle) {
            (Operand::List(items), Operand::Scalar(s)) => items.contains(s),
            _ => false,
        }
    }
}

/// A comparator: `(object operand, policy operand) -> bool`.
pub type Comparator = fn(Operand<'_>, Operand<'_>) -> bool;

/// Looks up the comparator for an operator.
///
/// Logical operators have no comparator.
pub fn comparator(op: OperatorKind) -> Result<Comparator> {
    let f: Comparator = match op {
        OperatorKind::Eq => cmp_equal,
        OperatorKind::NotEq => cmp_not_equal,
        OperatorKind::Lt => cmp_lt,
        OperatorKind::Lte => cmp_lte,
        OperatorKind::Gt => cmp_gt,
        OperatorKind::Gte => cmp_gte,
        OperatorKind::StartsWith => cmp_starts_with,
        OperatorKind::NotStartsWith => cmp_not_starts_with,
        OperatorKind::EndsWith => cmp_ends_with,
        OperatorKind::NotEndsWith => cmp_not_ends_with,
        OperatorKind::In => cmp_in,
        OperatorKind::NotIn => cmp_not_in,
        OperatorKind::Contains => cmp_contains,
        OperatorKind::NotContains => cmp_not_contains,
        OperatorKind::StringContains => cmp_string_contains,
        OperatorKind::Any => cmp_any,
        OperatorKind::And | OperatorKind::Or => {
            return Err(PolicyError::UnsupportedOperator(format!(
                "'{}' is not a comparison operator",
                op
            )))
        }
    };
    Ok(f)
}

/// Orders two like-typed scalars. Mixed types have no order.
fn scalar_order(a: Operand<'_>, b: Operand<'_>) -> Option<Ordering> {
    match (a, b) {
        (Operand::Scalar(Scalar::Number(x)), Operand::Scalar(Scalar::Number(y))) => {
            number_order(x, y)
        }
        (Operand::Scalar(Scalar::Str(x)), Operand::Scalar(Scalar::Str(y))) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Integers compare exactly; `f64` is used only when either side is a float.
fn number_order(x: &serde_json::Number, y: &serde_json::Number) -> Option<Ordering> {
    if x.is_f64() || y.is_f64() {
        return x.as_f64()?.partial_cmp(&y.as_f64()?);
    }
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return Some(a.cmp(&b));
    }
    // at least one side is above i64::MAX
    match (x.as_u64(), y.as_u64()) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        (Some(_), None) => Some(Ordering::Greater),
        (None, Some(_)) => Some(Ordering::Less),
        (None, None) => None,
    }
}

pub fn cmp_equal(a: Operand<'_>, b: Operand<'_>) -> bool {
    a == b
}

pub fn cmp_not_equal(a: Operand<'_>, b: Operand<'_>) -> bool {
    !cmp_equal(a, b)
}

pub fn cmp_lt(a: Operand<'_>, b: Operand<'_>) -> bool {
    scalar_order(a, b) == Some(Ordering::Less)
}

pub fn cmp_lte(a: Operand<'_>, b: Operand<'_>) -> bool {
    matches!(scalar_order(a, b), Some(Ordering::Less | Ordering::Equal))
}

pub fn cmp_gt(a: Operand<'_>, b: Operand<'_>) -> bool {
    scalar_order(a, b) == Some(Ordering::Greater)
}

pub fn cmp_gte(a: Operand<'_>, b: Operand<'_>) -> bool {
    matches!(scalar_order(a, b), Some(Ordering::Greater | Ordering::Equal))
}

pub fn cmp_starts_with(a: Operand<'_>, b: Operand<'_>) -> bool {
    match (a.as_str(), b.as_str()) {
        (Some(a), Some(b)) => a.starts_with(b),
        _ => false,
    }
}

pub fn cmp_not_starts_with(a: Operand<'_>, b: Operand<'_>) -> bool {
    !cmp_starts_with(a, b)
}

pub fn cmp_ends_with(a: Operand<'_>, b: Operand<'_>) -> bool {
    match (a.as_str(), b.as_str()) {
        (Some(a), Some(b)) => a.ends_with(b),
        _ => false,
    }
}

pub fn cmp_not_ends_with(a: Operand<'_>, b: Operand<'_>) -> bool {
    !cmp_ends_with(a, b)
}

pub fn cmp_string_contains(a: Operand<'_>, b: Operand<'_>) -> bool {
    match (a.as_str(), b.as_str()) {
        (Some(a), Some(b)) => a.contains(b),
        _ => false,
    }
}

/// `a` is a member of the list `b`.
pub fn cmp_in(a: Operand<'_>, b: Operand<'_>) -> bool {
    b.contains(a)
}

/// `a` is not a member of the list `b`. False when `b` is not a list.
pub fn cmp_not_in(a: Operand<'_>, b: Operand<'_>) -> bool {
    matches!(b, Operand::List(_)) && !b.contains(a)
}

/// `b` is a member of the list `a`.
pub fn cmp_contains(a: Operand<'_>, b: Operand<'_>) -> bool {
    a.contains(b)
}

/// `b` is not a member of the list `a`. False when `a` is not a list.
pub fn cmp_not_contains(a: Operand<'_>, b: Operand<'_>) -> bool {
    matches!(a, Operand::List(_)) && !a.contains(b)
}

pub fn cmp_any(_: Operand<'_>, _: Operand<'_>) -> bool {
    true
}
