//! Record sorting
//!
//! Multi-key, stable and deterministic. Values of different JSON types order
//! as: missing < null < bool < number < string.

use std::cmp::Ordering;

use serde_json::Value;

use super::ast::{SortDirection, SortSpec};
use crate::store::Record;

/// Sorts records by a list of keys
pub struct RecordSorter;

impl RecordSorter {
    /// Sorts in place; ties on every key keep their input order.
    pub fn sort(records: &mut [Record], keys: &[SortSpec]) {
        if keys.is_empty() {
            return;
        }

        records.sort_by(|a, b| {
            for key in keys {
                let ordering = Self::compare_values(a.get(&key.field), b.get(&key.field));
                let ordering = match key.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
        match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a_val), Some(b_val)) => {
                let type_order = |v: &Value| -> u8 {
                    match v {
                        Value::Null => 0,
                        Value::Bool(_) => 1,
                        Value::Number(_) => 2,
                        Value::String(_) => 3,
                        Value::Array(_) => 4,
                        Value::Object(_) => 5,
                    }
                };

                let a_type = type_order(a_val);
                let b_type = type_order(b_val);
                if a_type != b_type {
                    return a_type.cmp(&b_type);
                }

                match (a_val, b_val) {
                    (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
                    (Value::Number(x), Value::Number(y)) => {
                        if let (Some(xi), Some(yi)) = (x.as_i64(), y.as_i64()) {
                            return xi.cmp(&yi);
                        }
                        let xf = x.as_f64().unwrap_or(0.0);
                        let yf = y.as_f64().unwrap_or(0.0);
                        xf.partial_cmp(&yf).unwrap_or(Ordering::Equal)
                    }
                    (Value::String(x), Value::String(y)) => x.cmp(y),
                    _ => Ordering::Equal,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Fields;
    use serde_json::json;

    fn person(name: &str, age: Value) -> Record {
        let mut fields = Fields::new();
        fields.insert("name".into(), json!(name));
        if !age.is_null() {
            fields.insert("age".into(), age);
        }
        Record::new("Person", fields)
    }

    fn names(records: &[Record]) -> Vec<&str> {
        records
            .iter()
            .map(|r| r.get("name").and_then(Value::as_str).unwrap())
            .collect()
    }

    #[test]
    fn test_sort_ascending_and_descending() {
        let mut rows = vec![
            person("c", json!(30)),
            person("a", json!(20)),
            person("b", json!(25)),
        ];

        RecordSorter::sort(&mut rows, &[SortSpec::asc("age")]);
        assert_eq!(names(&rows), vec!["a", "b", "c"]);

        RecordSorter::sort(&mut rows, &[SortSpec::desc("age")]);
        assert_eq!(names(&rows), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_sort_stable_on_ties() {
        let mut rows = vec![
            person("a", json!(25)),
            person("b", json!(25)),
            person("c", json!(25)),
        ];
        RecordSorter::sort(&mut rows, &[SortSpec::asc("age")]);
        assert_eq!(names(&rows), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_secondary_key_breaks_ties() {
        let mut rows = vec![
            person("b", json!(30)),
            person("a", json!(30)),
            person("c", json!(20)),
        ];
        RecordSorter::sort(&mut rows, &[SortSpec::desc("age"), SortSpec::asc("name")]);
        assert_eq!(names(&rows), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_missing_sorts_first() {
        let mut rows = vec![person("x", json!(1)), person("y", Value::Null)];
        RecordSorter::sort(&mut rows, &[SortSpec::asc("age")]);
        assert_eq!(names(&rows), vec!["y", "x"]);
    }
}
