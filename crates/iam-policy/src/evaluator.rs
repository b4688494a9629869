//! Policy evaluation engine.

use crate::config::IamConfig;
use crate::context::AttributeStore;
use crate::decision::Decision;
use crate::error::{PolicyError, Result};
use crate::expression::Expression;
use crate::operator::{comparator, Operand};
use crate::request::Resource;
use crate::types::{AttributeValue, OperatorKind, Scalar, KEYWORD_BK_IAM_PATH_FIELD_SUFFIX};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Instant;
use tracing::debug;

/// Trailing `,*/` of a path matcher such as `/biz,1/set,*/`.
static PATH_WILDCARD: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r",\*/$"));

/// The policy evaluator.
#[derive(Debug, Clone, Default)]
pub struct PolicyEvaluator {
    strict_operators: bool,
}

impl PolicyEvaluator {
    /// Creates an evaluator that treats unknown operators as false.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an evaluator that rejects unknown operators at parse time.
    pub fn strict() -> Self {
        Self {
            strict_operators: true,
        }
    }

    pub fn from_config(config: &IamConfig) -> Self {
        Self {
            strict_operators: config.strict_operators,
        }
    }

    /// Parses a policy payload into an expression tree.
    pub fn parse(&self, policy: &serde_json::Value) -> Result<Expression> {
        if self.strict_operators {
            Expression::parse_strict(policy)
        } else {
            Expression::parse(policy)
        }
    }

    /// Evaluates a policy payload against an attribute store.
    pub fn evaluate(&self, policy: &serde_json::Value, store: &AttributeStore) -> Result<bool> {
        let expr = self.parse(policy)?;
        self.evaluate_expression(&expr, store)
    }

    /// Evaluates a policy payload against every node of a resource chain.
    pub fn evaluate_resource(
        &self,
        policy: &serde_json::Value,
        system: &str,
        resource: &Resource,
    ) -> Result<bool> {
        let store = AttributeStore::from_resource(system, resource, false)?;
        self.evaluate(policy, &store)
    }

    /// Evaluates an already parsed expression.
    pub fn evaluate_expression(&self, expr: &Expression, store: &AttributeStore) -> Result<bool> {
        let allowed = expr.eval(store)?;
        debug!(
            expression = %expr,
            rendered = %expr.rendered(store),
            allowed,
            "Evaluated policy expression"
        );
        Ok(allowed)
    }

    /// Evaluates a policy and keeps the diagnostic renderings.
    pub fn explain(&self, policy: &serde_json::Value, store: &AttributeStore) -> Result<Decision> {
        let start = Instant::now();
        let expr = self.parse(policy)?;
        let allowed = expr.eval(store)?;

        Ok(Decision::new(allowed, expr.to_string(), expr.render(store))
            .with_evaluation_time(start.elapsed().as_micros() as u64))
    }
}

/// Evaluates one `field op value` comparison.
///
/// 1. `any` is true without looking at the store.
/// 2. `starts_with` on a `._bk_iam_path_` field turns `/a,1/b,*/` into the
///    prefix `/a,1/b,`.
/// 3. Operand shapes are checked; a mismatch is a [`PolicyError::ValidationError`].
/// 4. The comparator is broadcast over a list-valued attribute: positive
///    operators need one matching element, negative operators need all.
pub fn eval_binary_operator(
    op: OperatorKind,
    field: &str,
    policy_value: &AttributeValue,
    store: &AttributeStore,
) -> Result<bool> {
    if op == OperatorKind::Any {
        return Ok(true);
    }

    let object_value = store.resolve(field);

    let rewritten;
    let policy_value = if op == OperatorKind::StartsWith
        && field.ends_with(KEYWORD_BK_IAM_PATH_FIELD_SUFFIX)
    {
        rewritten = strip_path_wildcard(policy_value.clone())?;
        &rewritten
    } else {
        policy_value
    };

    validate_policy_value(op, field, policy_value)?;
    validate_object_value(op, field, object_value)?;

    if op.is_negative() {
        eval_negative(op, object_value, policy_value)
    } else {
        eval_positive(op, object_value, policy_value)
    }
}

/// Checks the shape of the policy side of a comparison.
///
/// Single-value operators reject lists; `in` and `not_in` require one.
pub fn validate_policy_value(op: OperatorKind, field: &str, value: &AttributeValue) -> Result<()> {
    match op {
        OperatorKind::Eq
        | OperatorKind::NotEq
        | OperatorKind::Lt
        | OperatorKind::Lte
        | OperatorKind::Gt
        | OperatorKind::Gte
        | OperatorKind::StartsWith
        | OperatorKind::NotStartsWith
        | OperatorKind::EndsWith
        | OperatorKind::NotEndsWith
        | OperatorKind::StringContains => {
            if value.is_list() {
                return Err(PolicyError::ValidationError(format!(
                    "the policy value of operator `{}` on '{}' should not be an array",
                    op, field
                )));
            }
        }
        OperatorKind::In | OperatorKind::NotIn => {
            if !value.is_list() {
                return Err(PolicyError::ValidationError(format!(
                    "the policy value of operator `{}` on '{}' should be an array",
                    op, field
                )));
            }
        }
        OperatorKind::Contains
        | OperatorKind::NotContains
        | OperatorKind::Any
        | OperatorKind::And
        | OperatorKind::Or => {}
    }
    Ok(())
}

/// `contains` and `not_contains` need a list-valued attribute; absent counts as not a list.
fn validate_object_value(
    op: OperatorKind,
    field: &str,
    value: Option<&AttributeValue>,
) -> Result<()> {
    if matches!(op, OperatorKind::Contains | OperatorKind::NotContains)
        && !value.is_some_and(AttributeValue::is_list)
    {
        return Err(PolicyError::ValidationError(format!(
            "the object attribute '{}' should be an array for operator `{}`",
            field, op
        )));
    }
    Ok(())
}

fn eval_positive(
    op: OperatorKind,
    object_value: Option<&AttributeValue>,
    policy_value: &AttributeValue,
) -> Result<bool> {
    let cmp = comparator(op)?;
    let policy = Operand::from_value(Some(policy_value));

    let Some(items) = object_value.and_then(AttributeValue::as_list) else {
        return Ok(cmp(Operand::from_value(object_value), policy));
    };

    if op == OperatorKind::Contains {
        if let Some(wanted) = policy_value.as_list() {
            return Ok(wanted
                .iter()
                .any(|pv| cmp(Operand::List(items), Operand::Scalar(pv))));
        }
        return Ok(cmp(Operand::List(items), policy));
    }

    Ok(items.iter().any(|ov| cmp(Operand::Scalar(ov), policy)))
}

fn eval_negative(
    op: OperatorKind,
    object_value: Option<&AttributeValue>,
    policy_value: &AttributeValue,
) -> Result<bool> {
    let cmp = comparator(op)?;
    let policy = Operand::from_value(Some(policy_value));

    let Some(items) = object_value.and_then(AttributeValue::as_list) else {
        return Ok(cmp(Operand::from_value(object_value), policy));
    };

    if op == OperatorKind::NotContains {
        if let Some(excluded) = policy_value.as_list() {
            return Ok(excluded
                .iter()
                .all(|pv| cmp(Operand::List(items), Operand::Scalar(pv))));
        }
        return Ok(cmp(Operand::List(items), policy));
    }

    Ok(items.iter().all(|ov| cmp(Operand::Scalar(ov), policy)))
}

/// Rewrites `/a,1/b,*/` to `/a,1/b,` in a scalar or in every list element.
fn strip_path_wildcard(value: AttributeValue) -> Result<AttributeValue> {
    let pattern = PATH_WILDCARD.as_ref().map_err(|e| PolicyError::from(e.clone()))?;

    Ok(value.map_scalars(|scalar| match scalar {
        Scalar::Str(path) => Scalar::Str(pattern.replace(&path, "").into_owned()),
        other => other,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Attributes;
    use crate::request::ResourceNode;
    use proptest::prelude::*;
    use serde_json::json;

    const PATH_FIELD: &str = "obj._bk_iam_path_";

    fn object_with(name: &str, value: Option<AttributeValue>) -> AttributeStore {
        let mut attrs = Attributes::new();
        attrs.insert("id".to_string(), AttributeValue::from("1"));
        if let Some(value) = value {
            attrs.insert(name.to_string(), value);
        }
        AttributeStore::new().with_object("obj", attrs)
    }

    fn ids(value: AttributeValue) -> AttributeStore {
        let mut attrs = Attributes::new();
        attrs.insert("id".to_string(), value);
        AttributeStore::new().with_object("obj", attrs)
    }

    fn path(value: Option<AttributeValue>) -> AttributeStore {
        object_with("_bk_iam_path_", value)
    }

    fn empty_list() -> AttributeValue {
        AttributeValue::List(Vec::new())
    }

    fn eval(expr: &Expression, store: &AttributeStore) -> bool {
        expr.eval(store).unwrap()
    }

    #[test]
    fn test_equal() {
        let expr = Expression::comparison(OperatorKind::Eq, "obj.id", "100");

        assert!(eval(&expr, &ids("100".into())));
        assert!(!eval(&expr, &ids("200".into())));
        assert!(eval(&expr, &ids(vec!["100", "200"].into())));
        assert!(!eval(&expr, &ids(vec!["200", "300"].into())));
    }

    #[test]
    fn test_not_equal_needs_every_element() {
        let expr = Expression::comparison(OperatorKind::NotEq, "obj.id", "100");

        assert!(eval(&expr, &ids("200".into())));
        assert!(eval(&expr, &ids(vec!["200", "300"].into())));
        assert!(!eval(&expr, &ids(vec!["100", "300"].into())));
        assert!(eval(&expr, &ids(empty_list())));
    }

    #[test]
    fn test_in() {
        let expr = Expression::comparison(OperatorKind::In, "obj.id", vec!["100", "200"]);

        assert!(eval(&expr, &ids("100".into())));
        assert!(eval(&expr, &ids("200".into())));
        assert!(!eval(&expr, &ids("300".into())));
        assert!(eval(&expr, &ids(vec!["200", "300"].into())));
        assert!(!eval(&expr, &ids(vec!["300", "400"].into())));
    }

    #[test]
    fn test_not_in() {
        let expr = Expression::comparison(OperatorKind::NotIn, "obj.id", vec!["100", "200"]);

        assert!(eval(&expr, &ids("300".into())));
        assert!(!eval(&expr, &ids("100".into())));
        assert!(eval(&expr, &ids(vec!["300", "400"].into())));
        assert!(!eval(&expr, &ids(vec!["300", "100"].into())));

        let absent = Expression::comparison(OperatorKind::NotIn, "obj.missing", vec!["100"]);
        assert!(eval(&absent, &ids("100".into())));
        let absent_in = Expression::comparison(OperatorKind::In, "obj.missing", vec!["100"]);
        assert!(!eval(&absent_in, &ids("100".into())));
    }

    #[test]
    fn test_contains() {
        let expr = Expression::comparison(OperatorKind::Contains, "obj.id", "100");

        assert!(eval(&expr, &ids(vec!["100", "200"].into())));
        assert!(!eval(&expr, &ids(vec!["200", "300"].into())));
    }

    #[test]
    fn test_contains_rejects_scalar_object() {
        let expr = Expression::comparison(OperatorKind::Contains, "obj.id", "100");
        assert!(matches!(
            expr.eval(&ids("100".into())),
            Err(PolicyError::ValidationError(_))
        ));

        let absent = Expression::comparison(OperatorKind::NotContains, "obj.tags", "100");
        assert!(matches!(
            absent.eval(&ids("100".into())),
            Err(PolicyError::ValidationError(_))
        ));
    }

    #[test]
    fn test_contains_with_list_policy_value() {
        let any_of = Expression::comparison(OperatorKind::Contains, "obj.id", vec!["300", "200"]);
        assert!(eval(&any_of, &ids(vec!["100", "200"].into())));
        assert!(!eval(&any_of, &ids(vec!["100", "400"].into())));

        let none_of =
            Expression::comparison(OperatorKind::NotContains, "obj.id", vec!["300", "400"]);
        assert!(eval(&none_of, &ids(vec!["100", "200"].into())));
        assert!(!eval(&none_of, &ids(vec!["100", "400"].into())));

        let single = Expression::comparison(OperatorKind::NotContains, "obj.id", "100");
        assert!(!eval(&single, &ids(vec!["100", "200"].into())));
        assert!(eval(&single, &ids(empty_list())));
    }

    #[test]
    fn test_starts_with_path_rewrite() {
        let expr = Expression::comparison(OperatorKind::StartsWith, PATH_FIELD, "/biz,1/set,2/host,*/");

        assert!(eval(&expr, &path(Some(vec!["/biz,1/set,2/host,3/"].into()))));
        assert!(eval(&expr, &path(Some("/biz,1/set,2/host,3/".into()))));
        assert!(eval(&expr, &path(Some(vec!["/biz,1/set,2/host,3/aaa,5/"].into()))));
        assert!(!eval(&expr, &path(Some(vec!["/biz,1/set,2/bbb,3/"].into()))));
        assert!(!eval(&expr, &path(Some(empty_list()))));
        assert!(!eval(&expr, &path(Some("".into()))));
        assert!(!eval(&expr, &path(None)));
    }

    #[test]
    fn test_path_rewrite_only_for_path_field() {
        let expr = Expression::comparison(OperatorKind::StartsWith, "obj.name", "/biz,1/host,*/");
        let store = object_with("name", Some("/biz,1/host,3/".into()));
        assert!(!eval(&expr, &store));

        let literal = object_with("name", Some("/biz,1/host,*/x".into()));
        assert!(eval(&expr, &literal));
    }

    #[test]
    fn test_strip_path_wildcard() {
        assert_eq!(
            strip_path_wildcard("/a,1/b,*/".into()).unwrap(),
            AttributeValue::from("/a,1/b,")
        );
        assert_eq!(
            strip_path_wildcard(vec!["/a,1/b,*/", "/a,1/b,2/"].into()).unwrap(),
            AttributeValue::from(vec!["/a,1/b,", "/a,1/b,2/"])
        );
        assert_eq!(
            strip_path_wildcard("/a,*/b,1/".into()).unwrap(),
            AttributeValue::from("/a,*/b,1/")
        );
    }

    #[test]
    fn test_string_contains() {
        let expr = Expression::comparison(OperatorKind::StringContains, PATH_FIELD, "/set,2/");

        assert!(eval(&expr, &path(Some(vec!["/biz,1/set,2/host,3/"].into()))));
        assert!(!eval(&expr, &path(Some(vec!["/biz,1/set,3/bbb,4/"].into()))));
        assert!(!eval(&expr, &path(Some(empty_list()))));
        assert!(!eval(&expr, &path(Some("".into()))));
        assert!(!eval(&expr, &path(None)));
    }

    #[test]
    fn test_ends_with() {
        let expr = Expression::comparison(OperatorKind::EndsWith, PATH_FIELD, "/set,2/");

        assert!(eval(&expr, &path(Some(vec!["/biz,1/set,2/"].into()))));
        assert!(!eval(&expr, &path(Some(vec!["/biz,1/set,3/"].into()))));
        assert!(!eval(&expr, &path(Some(empty_list()))));
        assert!(!eval(&expr, &path(Some("".into()))));
        assert!(!eval(&expr, &path(None)));
    }

    #[test]
    fn test_not_ends_with() {
        let expr = Expression::comparison(OperatorKind::NotEndsWith, PATH_FIELD, "/set,2/");

        assert!(eval(&expr, &path(Some(vec!["/biz,1/set,3/"].into()))));
        assert!(!eval(&expr, &path(Some(vec!["/biz,1/set,2/"].into()))));
        assert!(eval(&expr, &path(Some(empty_list()))));
        assert!(eval(&expr, &path(Some("".into()))));
        assert!(eval(&expr, &path(None)));
    }

    #[test]
    fn test_not_starts_with() {
        let expr = Expression::comparison(OperatorKind::NotStartsWith, PATH_FIELD, "/biz,1/");

        assert!(eval(&expr, &path(Some(vec!["/biz,2/set,1/"].into()))));
        assert!(!eval(&expr, &path(Some(vec!["/biz,2/", "/biz,1/set,1/"].into()))));
    }

    #[test]
    fn test_ordering_operators() {
        let gt = Expression::comparison(OperatorKind::Gt, "obj.size", 10i64);
        assert!(eval(&gt, &object_with("size", Some(11i64.into()))));
        assert!(!eval(&gt, &object_with("size", Some(10i64.into()))));
        assert!(eval(&gt, &object_with("size", Some(vec![1i64, 20].into()))));
        assert!(!eval(&gt, &object_with("size", Some("11".into()))));
        assert!(!eval(&gt, &object_with("size", None)));

        let lte = Expression::comparison(OperatorKind::Lte, "obj.name", "m");
        assert!(eval(&lte, &object_with("name", Some("apple".into()))));
        assert!(!eval(&lte, &object_with("name", Some("zoo".into()))));
    }

    #[test]
    fn test_any_ignores_store() {
        let expr = Expression::any("nothing.here");
        assert!(eval(&expr, &AttributeStore::new()));
    }

    #[test]
    fn test_wrong_shapes_fail_at_eval() {
        let eq_list = Expression::comparison(OperatorKind::Eq, "obj.id", vec!["1"]);
        assert!(matches!(
            eq_list.eval(&ids("1".into())),
            Err(PolicyError::ValidationError(_))
        ));

        let in_scalar = Expression::comparison(OperatorKind::In, "obj.id", "1");
        assert!(matches!(
            in_scalar.eval(&ids("1".into())),
            Err(PolicyError::ValidationError(_))
        ));
    }

    #[test]
    fn test_logical_operator_as_comparison() {
        let expr = Expression::comparison(OperatorKind::And, "obj.id", "1");
        assert!(matches!(
            expr.eval(&ids("1".into())),
            Err(PolicyError::UnsupportedOperator(_))
        ));
    }

    #[test]
    fn test_evaluator_entry_points() {
        let policy = json!({
            "op": "AND",
            "content": [
                {"op": "eq", "field": "host.id", "value": "1"},
                {"op": "starts_with", "field": "host._bk_iam_path_", "value": "/biz,1/set,*/"}
            ]
        });
        let resource = Resource::single(
            ResourceNode::new("bk_cmdb", "host", "1")
                .with_attribute("_bk_iam_path_", json!(["/biz,1/set,5/"])),
        );

        let evaluator = PolicyEvaluator::new();
        assert!(evaluator.evaluate_resource(&policy, "bk_cmdb", &resource).unwrap());

        let store = AttributeStore::from_resource("bk_cmdb", &resource, false).unwrap();
        let decision = evaluator.explain(&policy, &store).unwrap();
        assert!(decision.is_allowed());
        assert_eq!(
            decision.expression,
            "((host.id eq 1) AND (host._bk_iam_path_ starts_with /biz,1/set,*/))"
        );
        assert_eq!(
            decision.rendered,
            "((1 eq 1) AND ([/biz,1/set,5/] starts_with /biz,1/set,*/))"
        );
        assert!(decision.evaluation_time_us.is_some());
    }

    #[test]
    fn test_strict_evaluator_rejects_unknown_operator() {
        let policy = json!({"op": "regex", "field": "obj.id", "value": "1"});
        let store = ids("1".into());

        assert!(!PolicyEvaluator::new().evaluate(&policy, &store).unwrap());
        assert!(matches!(
            PolicyEvaluator::strict().evaluate(&policy, &store),
            Err(PolicyError::UnsupportedOperator(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_evaluation_is_deterministic(
            values in proptest::collection::vec("[a-c]{0,2}", 0..4),
            needle in "[a-c]{0,2}",
        ) {
            let store = ids(AttributeValue::from(values.clone()));
            let exprs = [
                Expression::comparison(OperatorKind::Eq, "obj.id", needle.clone()),
                Expression::comparison(OperatorKind::NotEq, "obj.id", needle.clone()),
                Expression::comparison(OperatorKind::Contains, "obj.id", needle.clone()),
                Expression::comparison(OperatorKind::NotIn, "obj.id", vec![needle.clone()]),
            ];
            for expr in &exprs {
                let first = expr.eval(&store).unwrap();
                prop_assert_eq!(first, expr.eval(&store).unwrap());
            }
        }

        #[test]
        fn prop_negative_is_complement_over_scalars(value in "[a-c]{0,3}", needle in "[a-c]{0,2}") {
            let store = ids(AttributeValue::from(value));
            for (pos, neg) in [
                (OperatorKind::Eq, OperatorKind::NotEq),
                (OperatorKind::StartsWith, OperatorKind::NotStartsWith),
                (OperatorKind::EndsWith, OperatorKind::NotEndsWith),
            ] {
                let p = Expression::comparison(pos, "obj.id", needle.clone()).eval(&store).unwrap();
                let n = Expression::comparison(neg, "obj.id", needle.clone()).eval(&store).unwrap();
                prop_assert_ne!(p, n);
            }
        }

        #[test]
        fn prop_rewritten_wildcard_matches_children(
            segments in proptest::collection::vec("[a-z]{1,4},[0-9]{1,2}", 1..4),
            child in "[0-9]{1,3}",
        ) {
            let parent: String = segments.iter().map(|s| format!("/{}", s)).collect();
            let matcher = format!("{}/host,*/", parent);
            let concrete = format!("{}/host,{}/", parent, child);

            let expr = Expression::comparison(OperatorKind::StartsWith, PATH_FIELD, matcher);
            prop_assert!(eval(&expr, &path(Some(concrete.into()))));
        }
    }
}
