//! In-memory query over a snapshot of records

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{Field, RequestFilter, RequestQuery, TimeWindow};
use crate::error::QueryError;
use crate::models::RequestRecord;

/// [`RequestQuery`] over a shared, immutable vector of records.
#[derive(Debug, Clone)]
pub struct MemoryQuery {
    records: Arc<Vec<RequestRecord>>,
    window: TimeWindow,
}

impl MemoryQuery {
    pub fn new(records: Arc<Vec<RequestRecord>>, window: TimeWindow) -> Self {
        Self { records, window }
    }

    fn matching<'a>(
        &'a self,
        filter: &'a RequestFilter,
    ) -> impl Iterator<Item = &'a RequestRecord> + 'a {
        self.records
            .iter()
            .filter(move |r| self.window.contains(r.time) && filter.matches(r))
    }
}

#[async_trait]
impl RequestQuery for MemoryQuery {
    fn window(&self) -> &TimeWindow {
        &self.window
    }

    async fn count(&self, filter: &RequestFilter) -> Result<u64, QueryError> {
        Ok(self.matching(filter).count() as u64)
    }

    async fn count_distinct(&self, field: Field, filter: &RequestFilter) -> Result<u64, QueryError> {
        let distinct: HashSet<String> = self
            .matching(filter)
            .filter_map(|r| field.value_of(r))
            .collect();
        Ok(distinct.len() as u64)
    }

    async fn top(
        &self,
        field: Field,
        filter: &RequestFilter,
        limit: usize,
    ) -> Result<Vec<(String, u64)>, QueryError> {
        let mut counts: HashMap<String, u64> = HashMap::new();
        for value in self.matching(filter).filter_map(|r| field.value_of(r)) {
            *counts.entry(value).or_insert(0) += 1;
        }

        let mut result: Vec<(String, u64)> = counts.into_iter().collect();
        result.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        result.truncate(limit);
        Ok(result)
    }

    async fn fetch(
        &self,
        filter: &RequestFilter,
        limit: Option<usize>,
    ) -> Result<Vec<RequestRecord>, QueryError> {
        let mut records: Vec<RequestRecord> = self.matching(filter).cloned().collect();
        records.sort_by(|a, b| b.time.cmp(&a.time).then_with(|| b.id.cmp(&a.id)));
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }
}
