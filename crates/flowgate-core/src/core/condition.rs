// flowgate-core/src/core/condition.rs
// ============================================================================
// Module: Flow Engine Condition Evaluator
// Description: Pure boolean evaluation of the decision/switch condition AST.
// Purpose: Provide a side-effect-free, prototype-pollution-safe expression
//          vocabulary for decision branches and switch cases.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! Conditions are a small discriminated union (`Leaf` / `Compound`) evaluated
//! against a runtime context built from a session's `collectedData`. Field
//! resolution walks a dotted path; `and`/`or` are explicit two-valued boolean
//! operators (no Kleene "unknown" state), and `__proto__` / `constructor` /
//! `prototype` path segments are rejected outright so a crafted capability
//! response can never reach into prototype-chain internals.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Condition AST
// ============================================================================

/// Comparison operator applied to a resolved context value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Alias of [`Operator::Ne`] accepted on the wire.
    #[serde(rename = "not_equals")]
    NotEquals,
    /// String/array containment.
    Contains,
    /// Scalar membership in `value[]`, or non-empty intersection for array fields.
    In,
    /// Negation of [`Operator::In`].
    NotIn,
    /// Numeric greater-than.
    Gt,
    /// Numeric greater-than-or-equal.
    Gte,
    /// Numeric less-than.
    Lt,
    /// Numeric less-than-or-equal.
    Lte,
}

impl Operator {
    /// Normalizes wire aliases (`not_equals` → `ne`) to a single canonical form.
    const fn canonical(self) -> Self {
        match self {
            Self::NotEquals => Self::Ne,
            other => other,
        }
    }

    /// Returns true for operators whose "missing field" outcome is `true`
    /// rather than `false` (negated-equality operators).
    const fn missing_is_true(self) -> bool {
        matches!(self.canonical(), Self::Ne | Self::NotIn)
    }
}

/// A single field/operator/value test.
///
/// When `field == "idp_claim"`, `claim_path` must be set and the path
/// actually resolved is `idp_claim.<claim_path>` rather than `field` itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leaf {
    /// Dotted path into the runtime context, or the literal `"idp_claim"`.
    pub field: String,
    /// Dotted path under `idp_claim.` to resolve; required when `field == "idp_claim"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_path: Option<String>,
    /// Comparison operator.
    pub operator: Operator,
    /// Expected value, compared against the resolved field.
    pub value: Value,
}

/// Field name that switches leaf resolution to the `claim_path` under `idp_claim.`.
const IDP_CLAIM_FIELD: &str = "idp_claim";

/// Boolean combinator over nested conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompoundType {
    /// All-true over the nested list; `true` only if every condition is true
    /// (an empty list is `false`, per spec).
    And,
    /// Any-true over the nested list (an empty list is `false`, per spec).
    Or,
}

/// A condition: either a leaf test or a boolean combination of conditions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    /// A single leaf comparison.
    Leaf(Leaf),
    /// A compound `and`/`or` combinator.
    Compound {
        /// Which combinator to apply.
        #[serde(rename = "type")]
        kind: CompoundType,
        /// Nested conditions, evaluated in order (order does not affect the
        /// boolean result but is preserved for deterministic short-circuiting).
        conditions: Vec<Condition>,
    },
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Path segments that must never be followed, to keep the resolver from
/// reaching into prototype-chain internals via a crafted capability response.
const FORBIDDEN_SEGMENTS: [&str; 3] = ["__proto__", "constructor", "prototype"];

/// Evaluates `condition` against `context`. Pure and side-effect-free.
#[must_use]
pub fn evaluate(condition: &Condition, context: &Value) -> bool {
    match condition {
        Condition::Leaf(leaf) => evaluate_leaf(leaf, context),
        Condition::Compound { kind, conditions } => match kind {
            CompoundType::And => !conditions.is_empty() && conditions.iter().all(|c| evaluate(c, context)),
            CompoundType::Or => conditions.iter().any(|c| evaluate(c, context)),
        },
    }
}

/// Evaluates a single leaf condition.
fn evaluate_leaf(leaf: &Leaf, context: &Value) -> bool {
    if leaf.field == IDP_CLAIM_FIELD {
        let claim_path = leaf.claim_path.as_deref().unwrap_or_default();
        let path = format!("{IDP_CLAIM_FIELD}.{claim_path}");
        return evaluate_path(&path, leaf.operator, &leaf.value, context);
    }
    evaluate_path(&leaf.field, leaf.operator, &leaf.value, context)
}

/// Resolves `path` against `context` and applies `operator`.
fn evaluate_path(path: &str, operator: Operator, expected: &Value, context: &Value) -> bool {
    match resolve_path(context, path) {
        Some(resolved) => evaluate_operator(operator, resolved, expected),
        None => operator.canonical().missing_is_true(),
    }
}

/// Dotted-path resolver rejecting prototype-pollution-prone segments.
///
/// Returns `None` ("missing") if any segment is rejected or any intermediate
/// step cannot be traversed (not an object, or key absent).
#[must_use]
pub fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        if segment.is_empty() || FORBIDDEN_SEGMENTS.contains(&segment) {
            return None;
        }
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Returns true if any segment of `path` is one of the rejected
/// prototype-pollution-prone segments. Used where "missing" and "statically
/// dangerous" must be told apart, unlike condition evaluation (§4.1), where
/// both outcomes collapse to "missing".
#[must_use]
pub fn path_has_forbidden_segment(path: &str) -> bool {
    path.split('.').any(|segment| FORBIDDEN_SEGMENTS.contains(&segment))
}

/// Applies a comparison operator to a resolved value and an expected value.
fn evaluate_operator(operator: Operator, resolved: &Value, expected: &Value) -> bool {
    match operator.canonical() {
        Operator::Eq => equals_with_array_membership(resolved, expected),
        Operator::Ne => !equals_with_array_membership(resolved, expected),
        Operator::Contains => contains(resolved, expected),
        Operator::In => in_set(resolved, expected),
        Operator::NotIn => !in_set(resolved, expected),
        Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
            compare_numeric(operator, resolved, expected)
        }
        Operator::NotEquals => unreachable!("canonical() normalizes NotEquals to Ne"),
    }
}

/// `eq`: direct equality, or scalar membership when `resolved` is an array.
fn equals_with_array_membership(resolved: &Value, expected: &Value) -> bool {
    if let Value::Array(items) = resolved {
        return items.contains(expected);
    }
    resolved == expected
}

/// `contains`: substring for strings, subset-of-items for arrays.
fn contains(resolved: &Value, expected: &Value) -> bool {
    match (resolved, expected) {
        (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
        (Value::Array(haystack), Value::Array(needles)) => {
            needles.iter().all(|needle| haystack.contains(needle))
        }
        (Value::Array(haystack), needle) => haystack.contains(needle),
        _ => false,
    }
}

/// `in`: for array fields, non-empty intersection with `expected[]`; for
/// scalar fields, membership of the resolved value in `expected[]`.
fn in_set(resolved: &Value, expected: &Value) -> bool {
    let Value::Array(expected_items) = expected else {
        return false;
    };
    match resolved {
        Value::Array(items) => items.iter().any(|item| expected_items.contains(item)),
        scalar => expected_items.contains(scalar),
    }
}

/// Numeric ordering comparisons. Non-numeric operands evaluate to `false`.
fn compare_numeric(operator: Operator, resolved: &Value, expected: &Value) -> bool {
    let (Some(left), Some(right)) = (resolved.as_f64(), expected.as_f64()) else {
        return false;
    };
    match operator {
        Operator::Gt => left > right,
        Operator::Gte => left >= right,
        Operator::Lt => left < right,
        Operator::Lte => left <= right,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn leaf(field: &str, operator: Operator, value: Value) -> Condition {
        Condition::Leaf(Leaf {
            field: field.to_string(),
            claim_path: None,
            operator,
            value,
        })
    }

    #[test]
    fn risk_score_gte_branches_to_mfa_when_high() {
        let condition = leaf("risk.score", Operator::Gte, json!(80));
        let context = json!({"risk": {"score": 90}});
        assert!(evaluate(&condition, &context));
    }

    #[test]
    fn risk_score_gte_does_not_branch_when_low() {
        let condition = leaf("risk.score", Operator::Gte, json!(80));
        let context = json!({"risk": {"score": 10}});
        assert!(!evaluate(&condition, &context));
    }

    #[test]
    fn missing_field_is_false_for_gte_but_true_for_ne() {
        let context = json!({});
        assert!(!evaluate(&leaf("risk.score", Operator::Gte, json!(80)), &context));
        assert!(evaluate(&leaf("risk.score", Operator::Ne, json!(80)), &context));
        assert!(evaluate(&leaf("risk.score", Operator::NotIn, json!([1, 2])), &context));
    }

    #[test]
    fn and_over_empty_list_is_false() {
        let condition = Condition::Compound {
            kind: CompoundType::And,
            conditions: vec![],
        };
        assert!(!evaluate(&condition, &json!({})));
    }

    #[test]
    fn or_over_empty_list_is_false() {
        let condition = Condition::Compound {
            kind: CompoundType::Or,
            conditions: vec![],
        };
        assert!(!evaluate(&condition, &json!({})));
    }

    #[test]
    fn prototype_pollution_segments_are_rejected_as_missing() {
        let context = json!({"user": {"__proto__": {"isAdmin": true}}});
        assert!(resolve_path(&context, "user.__proto__.isAdmin").is_none());
        assert!(resolve_path(&context, "constructor.prototype").is_none());
    }

    #[test]
    fn array_field_eq_matches_scalar_membership() {
        let condition = leaf("roles", Operator::Eq, json!("admin"));
        let context = json!({"roles": ["user", "admin"]});
        assert!(evaluate(&condition, &context));
    }

    #[test]
    fn path_has_forbidden_segment_flags_a_switch_key_but_not_a_plain_one() {
        assert!(path_has_forbidden_segment("user.__proto__.isAdmin"));
        assert!(path_has_forbidden_segment("constructor.prototype"));
        assert!(!path_has_forbidden_segment("device.platform"));
    }

    #[test]
    fn array_field_in_matches_non_empty_intersection() {
        let condition = leaf("roles", Operator::In, json!(["admin", "owner"]));
        let context = json!({"roles": ["user", "admin"]});
        assert!(evaluate(&condition, &context));
    }
}
