//! Typed query structures
//!
//! Filters are built as values, never parsed from strings:
//!
//! ```ignore
//! let adults = Filter::gte("age", json!(18)).and(Filter::eq("active", json!(true)));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    /// field = value
    Eq,
    /// field != value
    Ne,
    /// field > value
    Gt,
    /// field >= value
    Gte,
    /// field < value
    Lt,
    /// field <= value
    Lte,
}

impl CompareOp {
    /// Returns the operator name
    pub fn op_name(&self) -> &'static str {
        match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Gt => "gt",
            CompareOp::Gte => "gte",
            CompareOp::Lt => "lt",
            CompareOp::Lte => "lte",
        }
    }

    /// Returns true for the ordering operators
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            CompareOp::Gt | CompareOp::Gte | CompareOp::Lt | CompareOp::Lte
        )
    }
}

/// Filter expression over record fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    /// Compare a field against a constant
    Compare {
        /// Field name
        field: String,
        /// Operator
        op: CompareOp,
        /// Constant operand
        value: Value,
    },
    /// Field is missing or null
    IsNull(String),
    /// Every sub-filter matches; empty matches everything
    And(Vec<Filter>),
    /// Some sub-filter matches; empty matches nothing
    Or(Vec<Filter>),
    /// Sub-filter does not match
    Not(Box<Filter>),
}

impl Filter {
    fn compare(field: impl Into<String>, op: CompareOp, value: Value) -> Self {
        Filter::Compare {
            field: field.into(),
            op,
            value,
        }
    }

    /// field = value
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    /// field != value
    pub fn ne(field: impl Into<String>, value: Value) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    /// field > value
    pub fn gt(field: impl Into<String>, value: Value) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    /// field >= value
    pub fn gte(field: impl Into<String>, value: Value) -> Self {
        Self::compare(field, CompareOp::Gte, value)
    }

    /// field < value
    pub fn lt(field: impl Into<String>, value: Value) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    /// field <= value
    pub fn lte(field: impl Into<String>, value: Value) -> Self {
        Self::compare(field, CompareOp::Lte, value)
    }

    /// Field is missing or null
    pub fn is_null(field: impl Into<String>) -> Self {
        Filter::IsNull(field.into())
    }

    /// Conjunction, flattening nested `And`s
    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    /// Disjunction, flattening nested `Or`s
    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Or(mut parts) => {
                parts.push(other);
                Filter::Or(parts)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    /// Negation
    pub fn negate(self) -> Self {
        Filter::Not(Box::new(self))
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// One sort key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    /// Field to sort by
    pub field: String,
    /// Sort direction
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}
