//! Filter evaluation against records
//!
//! Comparisons are strict:
//! - no type coercion: `"30"` never equals `30`
//! - a missing or null field never satisfies a comparison, `ne` included
//! - ordering operators apply to numbers and strings only

use std::cmp::Ordering;

use serde_json::Value;

use super::ast::{CompareOp, Filter};
use crate::store::Record;

/// Evaluates filters against records
pub struct FilterEvaluator;

impl FilterEvaluator {
    /// Checks whether `record` satisfies `filter`
    pub fn matches(record: &Record, filter: &Filter) -> bool {
        match filter {
            Filter::Compare { field, op, value } => {
                match record.get(field) {
                    None | Some(Value::Null) => false,
                    Some(actual) => Self::compare(actual, *op, value),
                }
            }
            Filter::IsNull(field) => matches!(record.get(field), None | Some(Value::Null)),
            Filter::And(parts) => parts.iter().all(|f| Self::matches(record, f)),
            Filter::Or(parts) => parts.iter().any(|f| Self::matches(record, f)),
            Filter::Not(inner) => !Self::matches(record, inner),
        }
    }

    fn compare(actual: &Value, op: CompareOp, expected: &Value) -> bool {
        match op {
            CompareOp::Eq => Self::scalar_eq(actual, expected),
            CompareOp::Ne => !Self::scalar_eq(actual, expected),
            CompareOp::Gt => Self::order(actual, expected) == Some(Ordering::Greater),
            CompareOp::Gte => matches!(
                Self::order(actual, expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            CompareOp::Lt => Self::order(actual, expected) == Some(Ordering::Less),
            CompareOp::Lte => matches!(
                Self::order(actual, expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
        }
    }

    /// Exact equality; `1` and `1.0` are the same number
    fn scalar_eq(actual: &Value, expected: &Value) -> bool {
        match (actual, expected) {
            (Value::Number(_), Value::Number(_)) => {
                Self::order(actual, expected) == Some(Ordering::Equal)
            }
            _ => actual == expected,
        }
    }

    /// Ordering between two numbers or two strings; `None` otherwise
    fn order(actual: &Value, bound: &Value) -> Option<Ordering> {
        match (actual, bound) {
            (Value::Number(a), Value::Number(b)) => {
                if let (Some(ai), Some(bi)) = (a.as_i64(), b.as_i64()) {
                    return Some(ai.cmp(&bi));
                }
                match (a.as_f64(), b.as_f64()) {
                    (Some(af), Some(bf)) => af.partial_cmp(&bf),
                    _ => None,
                }
            }
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Fields;
    use serde_json::json;

    fn record(value: Value) -> Record {
        let fields: Fields = value
            .as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Record::new("Person", fields)
    }

    #[test]
    fn test_equality_match() {
        let r = record(json!({"name": "Alice", "age": 30}));
        assert!(FilterEvaluator::matches(&r, &Filter::eq("name", json!("Alice"))));
        assert!(!FilterEvaluator::matches(&r, &Filter::eq("name", json!("Bob"))));
    }

    #[test]
    fn test_no_type_coercion() {
        let r = record(json!({"value": 123}));
        assert!(!FilterEvaluator::matches(&r, &Filter::eq("value", json!("123"))));
        assert!(FilterEvaluator::matches(&r, &Filter::eq("value", json!(123))));
        assert!(FilterEvaluator::matches(&r, &Filter::eq("value", json!(123.0))));
    }

    #[test]
    fn test_range_predicates() {
        let r = record(json!({"age": 25}));
        assert!(FilterEvaluator::matches(&r, &Filter::gte("age", json!(18))));
        assert!(FilterEvaluator::matches(&r, &Filter::lte("age", json!(30))));
        assert!(!FilterEvaluator::matches(&r, &Filter::gt("age", json!(25))));
        assert!(!FilterEvaluator::matches(&r, &Filter::lt("age", json!(25))));
        assert!(FilterEvaluator::matches(&r, &Filter::lt("age", json!(25.5))));
    }

    #[test]
    fn test_range_across_types_never_matches() {
        let r = record(json!({"age": 25}));
        assert!(!FilterEvaluator::matches(&r, &Filter::gt("age", json!("20"))));
        assert!(!FilterEvaluator::matches(&r, &Filter::lte("age", json!("30"))));
    }

    #[test]
    fn test_missing_and_null_fields() {
        let r = record(json!({"name": null}));
        assert!(!FilterEvaluator::matches(&r, &Filter::eq("name", json!("Alice"))));
        assert!(!FilterEvaluator::matches(&r, &Filter::ne("name", json!("Alice"))));
        assert!(!FilterEvaluator::matches(&r, &Filter::eq("age", json!(30))));
        assert!(FilterEvaluator::matches(&r, &Filter::is_null("name")));
        assert!(FilterEvaluator::matches(&r, &Filter::is_null("age")));
    }

    #[test]
    fn test_boolean_combinators() {
        let r = record(json!({"age": 25, "active": true}));

        let both = Filter::gte("age", json!(18)).and(Filter::eq("active", json!(true)));
        assert!(FilterEvaluator::matches(&r, &both));

        let either = Filter::eq("age", json!(99)).or(Filter::eq("active", json!(true)));
        assert!(FilterEvaluator::matches(&r, &either));

        assert!(!FilterEvaluator::matches(&r, &both.negate()));
        assert!(FilterEvaluator::matches(&r, &Filter::And(vec![])));
        assert!(!FilterEvaluator::matches(&r, &Filter::Or(vec![])));
    }
}
