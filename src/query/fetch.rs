//! Fetch requests
//!
//! A request names one entity and optionally filters, sorts and pages it.
//! Execution order is fixed: filter, then sort, then offset, then limit.

use serde::{Deserialize, Serialize};

use super::ast::{Filter, SortSpec};
use super::filter::FilterEvaluator;
use super::sorter::RecordSorter;
use crate::store::Record;

/// A query over one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Target entity
    pub entity: String,
    /// Optional filter; `None` selects every record
    #[serde(default)]
    pub filter: Option<Filter>,
    /// Sort keys, most significant first; empty keeps insertion order
    #[serde(default)]
    pub sort: Vec<SortSpec>,
    /// Records skipped after sorting
    #[serde(default)]
    pub offset: usize,
    /// Maximum records returned
    #[serde(default)]
    pub limit: Option<usize>,
}

impl FetchRequest {
    /// Every record of `entity`
    pub fn all(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            filter: None,
            sort: Vec::new(),
            offset: 0,
            limit: None,
        }
    }

    /// Records of `entity` matching `filter`
    pub fn matching(entity: impl Into<String>, filter: Filter) -> Self {
        Self::all(entity).with_filter(filter)
    }

    /// Replaces the filter
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Appends a sort key
    pub fn sort_by(mut self, key: SortSpec) -> Self {
        self.sort.push(key);
        self
    }

    /// Skips the first `offset` results
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Caps the number of results
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `record` belongs to the result set, ignoring paging
    pub fn selects(&self, record: &Record) -> bool {
        record.entity == self.entity
            && self
                .filter
                .as_ref()
                .map_or(true, |f| FilterEvaluator::matches(record, f))
    }

    /// Runs the request over `records`, which are in insertion order.
    pub fn apply(&self, records: Vec<Record>) -> Vec<Record> {
        let mut rows: Vec<Record> = records.into_iter().filter(|r| self.selects(r)).collect();
        RecordSorter::sort(&mut rows, &self.sort);

        let rows = rows.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => rows.take(limit).collect(),
            None => rows.collect(),
        }
    }
}
