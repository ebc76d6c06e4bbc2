use serde::{Deserialize, Serialize};
use serde_json::Value;
use tel_types::Record;

/// Record selection for [`LedgerEngine::query`](crate::LedgerEngine::query).
///
/// Base filters apply first, then module narrowing (only when
/// `module_filters` is a non-empty map), then `offset` and `limit`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryFilters {
    pub stream: Option<String>,
    pub id: Option<String>,
    /// Inclusive lower bound.
    pub timestamp_from: Option<u64>,
    /// Inclusive upper bound.
    pub timestamp_to: Option<u64>,
    /// Passed to every module that claims a matching record's stream.
    pub module_filters: Value,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Default for QueryFilters {
    fn default() -> Self {
        Self {
            stream: None,
            id: None,
            timestamp_from: None,
            timestamp_to: None,
            module_filters: Value::Object(serde_json::Map::new()),
            limit: None,
            offset: None,
        }
    }
}

impl QueryFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = Some(stream.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_timestamp_range(mut self, from: Option<u64>, to: Option<u64>) -> Self {
        self.timestamp_from = from;
        self.timestamp_to = to;
        self
    }

    pub fn with_module_filters(mut self, filters: Value) -> Self {
        self.module_filters = filters;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Whether `record` passes the stream, id and timestamp filters.
    pub fn matches(&self, record: &Record) -> bool {
        if self.stream.as_deref().is_some_and(|s| s != record.stream) {
            return false;
        }
        if self.id.as_deref().is_some_and(|id| id != record.id) {
            return false;
        }
        if self.timestamp_from.is_some_and(|from| record.timestamp < from) {
            return false;
        }
        if self.timestamp_to.is_some_and(|to| record.timestamp > to) {
            return false;
        }
        true
    }

    /// Whether module narrowing applies.
    pub fn has_module_filters(&self) -> bool {
        match &self.module_filters {
            Value::Null => false,
            Value::Object(map) => !map.is_empty(),
            _ => true,
        }
    }
}

/// One page of query results.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub records: Vec<Record>,
    /// Matches before pagination.
    pub total: usize,
    /// More matches exist after this page.
    pub has_more: bool,
}

impl QueryResult {
    /// Page `matches` with `offset` and `limit`.
    pub(crate) fn paginate(
        matches: Vec<&Record>,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> Self {
        let total = matches.len();
        let offset = offset.unwrap_or(0).min(total);
        let records: Vec<Record> = matches
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        let has_more = offset + records.len() < total;
        Self {
            records,
            total,
            has_more,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(id: &str, stream: &str, ts: u64) -> Record {
        Record::new(id, stream, ts, json!({}))
    }

    #[test]
    fn default_matches_everything() {
        let filters = QueryFilters::new();
        assert!(filters.matches(&record("a", "proofs", 1)));
        assert!(!filters.has_module_filters());
    }

    #[test]
    fn base_filters_combine() {
        let filters = QueryFilters::new()
            .with_stream("proofs")
            .with_timestamp_range(Some(10), Some(20));
        assert!(filters.matches(&record("a", "proofs", 10)));
        assert!(filters.matches(&record("a", "proofs", 20)));
        assert!(!filters.matches(&record("a", "proofs", 21)));
        assert!(!filters.matches(&record("a", "assets", 15)));

        let by_id = QueryFilters::new().with_id("b");
        assert!(!by_id.matches(&record("a", "proofs", 1)));
        assert!(by_id.matches(&record("b", "proofs", 1)));
    }

    #[test]
    fn module_filters_only_count_when_non_empty() {
        assert!(!QueryFilters::new()
            .with_module_filters(Value::Null)
            .has_module_filters());
        assert!(QueryFilters::new()
            .with_module_filters(json!({"owner_oid": "x"}))
            .has_module_filters());
    }

    #[test]
    fn pagination_reports_total_and_more() {
        let records: Vec<Record> = (1..=5).map(|i| record(&format!("r{i}"), "s", i)).collect();
        let refs: Vec<&Record> = records.iter().collect();

        let page = QueryResult::paginate(refs.clone(), Some(1), Some(2));
        assert_eq!(page.total, 5);
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].id, "r2");
        assert!(page.has_more);

        let tail = QueryResult::paginate(refs.clone(), Some(3), Some(10));
        assert_eq!(tail.records.len(), 2);
        assert!(!tail.has_more);

        let past_end = QueryResult::paginate(refs, Some(9), None);
        assert!(past_end.records.is_empty());
        assert!(!past_end.has_more);
    }
}
