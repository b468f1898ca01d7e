//! Condition evaluator — matches a trigger payload against a declarative
//! condition map.
//!
//! Each key maps to either a plain scalar (strict equality) or an operator
//! object with exactly one entry: `$gt`, `$gte`, `$lt`, `$lte`, `$eq`,
//! `$ne`, `$in`. Keys are AND-ed; there is no OR/NOT. An empty condition
//! map always matches.

use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Check a full condition map against the trigger data.
pub fn conditions_match(conditions: &Map<String, Value>, data: &Value) -> bool {
    conditions
        .iter()
        .all(|(field, expected)| field_matches(data.get(field), expected))
}

/// Match one field of the payload against its expected value.
fn field_matches(actual: Option<&Value>, expected: &Value) -> bool {
    if let Some(obj) = expected.as_object()
        && obj.len() == 1
        && let Some((op, operand)) = obj.iter().next()
        && op.starts_with('$')
    {
        return apply_operator(op, actual, operand);
    }
    actual == Some(expected)
}

fn apply_operator(op: &str, actual: Option<&Value>, operand: &Value) -> bool {
    match op {
        "$eq" => actual == Some(operand),
        "$ne" => actual != Some(operand),
        "$in" => match (operand.as_array(), actual) {
            (Some(options), Some(value)) => options.contains(value),
            _ => false,
        },
        "$gt" => compare(actual, operand) == Some(Ordering::Greater),
        "$gte" => matches!(
            compare(actual, operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        "$lt" => compare(actual, operand) == Some(Ordering::Less),
        "$lte" => matches!(
            compare(actual, operand),
            Some(Ordering::Less | Ordering::Equal)
        ),
        // Unknown operators never match
        _ => false,
    }
}

/// Ordering between the actual field value and the operand: numeric when
/// both sides are numbers, lexicographic when both are strings.
fn compare(actual: Option<&Value>, operand: &Value) -> Option<Ordering> {
    let actual = actual?;
    if let (Some(a), Some(b)) = (actual.as_f64(), operand.as_f64()) {
        return a.partial_cmp(&b);
    }
    if let (Some(a), Some(b)) = (actual.as_str(), operand.as_str()) {
        return Some(a.cmp(b));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cond(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_empty_conditions_always_match() {
        let conditions = Map::new();
        assert!(conditions_match(&conditions, &json!({"anything": 1})));
        assert!(conditions_match(&conditions, &json!({})));
    }

    #[test]
    fn test_scalar_equality() {
        let conditions = cond(json!({"source": "webinar"}));
        assert!(conditions_match(&conditions, &json!({"source": "webinar"})));
        assert!(!conditions_match(&conditions, &json!({"source": "ad"})));
        // Missing field never equals a scalar
        assert!(!conditions_match(&conditions, &json!({})));
    }

    #[test]
    fn test_comparison_operators() {
        let conditions = cond(json!({"score": {"$gte": 80}}));
        assert!(conditions_match(&conditions, &json!({"score": 80})));
        assert!(conditions_match(&conditions, &json!({"score": 95})));
        assert!(!conditions_match(&conditions, &json!({"score": 79})));

        let conditions = cond(json!({"visits": {"$lt": 3}}));
        assert!(conditions_match(&conditions, &json!({"visits": 2})));
        assert!(!conditions_match(&conditions, &json!({"visits": 3})));
    }

    #[test]
    fn test_in_and_ne() {
        let conditions = cond(json!({"plan": {"$in": ["pro", "enterprise"]}}));
        assert!(conditions_match(&conditions, &json!({"plan": "pro"})));
        assert!(!conditions_match(&conditions, &json!({"plan": "free"})));

        let conditions = cond(json!({"status": {"$ne": "unsubscribed"}}));
        assert!(conditions_match(&conditions, &json!({"status": "new"})));
        assert!(!conditions_match(&conditions, &json!({"status": "unsubscribed"})));
        // Missing field is not equal, so $ne matches
        assert!(conditions_match(&conditions, &json!({})));
    }

    #[test]
    fn test_unknown_operator_never_matches() {
        let conditions = cond(json!({"score": {"$between": [10, 20]}}));
        assert!(!conditions_match(&conditions, &json!({"score": 15})));
    }

    #[test]
    fn test_all_keys_are_anded() {
        let conditions = cond(json!({"source": "webinar", "score": {"$gt": 50}}));
        assert!(conditions_match(
            &conditions,
            &json!({"source": "webinar", "score": 60})
        ));
        assert!(!conditions_match(
            &conditions,
            &json!({"source": "webinar", "score": 40})
        ));
        assert!(!conditions_match(
            &conditions,
            &json!({"source": "ad", "score": 60})
        ));
    }

    #[test]
    fn test_string_ordering() {
        let conditions = cond(json!({"tier": {"$gt": "a"}}));
        assert!(conditions_match(&conditions, &json!({"tier": "b"})));
        assert!(!conditions_match(&conditions, &json!({"tier": "a"})));
        // Mixed types have no ordering
        assert!(!conditions_match(&conditions, &json!({"tier": 5})));
    }
}
