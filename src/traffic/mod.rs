//! Traffic counters and the aggregator that lays them out as tables and
//! graphs
//!
//! A [`TrafficModule`] reduces a [`RequestQuery`] to one number. [`Modules`]
//! holds the configured modules (loaded through a [`Registry`]) and runs
//! every one of them over a list of queries: once per column for
//! [`Modules::table`], once per sampled day for [`Modules::graph`].

pub mod modules;

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::sync::Arc;

use crate::error::{ConfigurationError, QueryError, TrafficError};
use crate::naming::DisplayNames;
use crate::query::{start_of_day, RequestQuery};
use crate::registry::Registry;

pub use modules::{DistinctCount, FilteredCount};

/// Identifiers loaded when nothing else is configured.
pub const DEFAULT_MODULES: &[&str] = &["traffic.UniqueVisitor", "traffic.UniqueVisit", "traffic.Hit"];

/// Default graph length in days.
pub const DEFAULT_GRAPH_DAYS: u32 = 30;

#[async_trait]
pub trait TrafficModule: Send + Sync {
    fn names(&self) -> &DisplayNames;

    /// Pure reduction of `query` to a single count.
    async fn count(&self, query: &dyn RequestQuery) -> Result<u64, QueryError>;
}

/// Settings handed to every module factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleContext {
    /// Referers starting with this URL come from the site itself.
    pub base_url: String,
}

impl ModuleContext {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl Default for ModuleContext {
    fn default() -> Self {
        Self::new("http://127.0.0.1")
    }
}

/// One table row: a module and its count for each input query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrafficRow {
    pub label: String,
    pub counts: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrafficTable {
    pub columns: Vec<String>,
    pub rows: Vec<TrafficRow>,
}

/// One graph series; `data` holds `[epoch_millis, count]` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphSeries {
    pub data: Vec<(i64, u64)>,
    pub label: String,
}

pub struct Modules {
    registry: Registry<dyn TrafficModule, ModuleContext>,
}

impl Modules {
    /// Registry over `identifiers` with every built-in module registered.
    pub fn new(identifiers: Vec<String>, context: ModuleContext) -> Self {
        let mut loaded = Self {
            registry: Registry::new("traffic module", identifiers, context),
        };
        modules::register_builtin(&mut loaded);
        loaded
    }

    pub fn with_defaults(context: ModuleContext) -> Self {
        Self::new(default_identifiers(), context)
    }

    /// Make an application-defined module available under `identifier`.
    pub fn register<F>(&mut self, identifier: &str, factory: F) -> &mut Self
    where
        F: Fn(&ModuleContext) -> Arc<dyn TrafficModule> + Send + Sync + 'static,
    {
        self.registry.register(identifier, factory);
        self
    }

    pub fn identifiers(&self) -> &[String] {
        self.registry.identifiers()
    }

    pub fn context(&self) -> &ModuleContext {
        self.registry.context()
    }

    pub fn load(&self) -> Result<Arc<[Arc<dyn TrafficModule>]>, ConfigurationError> {
        self.registry.load()
    }

    /// The loaded modules, loading them on first use.
    pub fn modules(&self) -> Result<Arc<[Arc<dyn TrafficModule>]>, ConfigurationError> {
        self.registry.items()
    }

    /// One row per module, one column per query in input order.
    pub async fn table(
        &self,
        queries: &[(&str, &dyn RequestQuery)],
    ) -> Result<TrafficTable, TrafficError> {
        let modules = self.modules()?;
        let mut rows = Vec::with_capacity(modules.len());

        for module in modules.iter() {
            let mut counts = Vec::with_capacity(queries.len());
            for (_, query) in queries {
                counts.push(module.count(*query).await?);
            }
            rows.push(TrafficRow {
                label: module.names().verbose_name_plural.clone(),
                counts,
            });
        }

        Ok(TrafficTable {
            columns: queries.iter().map(|(label, _)| label.to_string()).collect(),
            rows,
        })
    }

    /// One series per module, one point per supplied day.
    pub async fn graph(
        &self,
        days: &[(NaiveDate, &dyn RequestQuery)],
    ) -> Result<Vec<GraphSeries>, TrafficError> {
        let modules = self.modules()?;
        let mut series = Vec::with_capacity(modules.len());

        for module in modules.iter() {
            let mut data = Vec::with_capacity(days.len());
            for (day, query) in days {
                let epoch = start_of_day(*day).timestamp_millis();
                data.push((epoch, module.count(*query).await?));
            }
            series.push(GraphSeries {
                data,
                label: module.names().verbose_name_plural.clone(),
            });
        }

        Ok(series)
    }
}

pub fn default_identifiers() -> Vec<String> {
    DEFAULT_MODULES.iter().map(|s| s.to_string()).collect()
}

/// Sampling step for a graph covering `days` days.
pub fn days_step(days: u32) -> u32 {
    if days < 10 {
        1
    } else if days < 60 {
        2
    } else {
        30
    }
}

/// Sample dates for a graph, starting at `today` and going back by
/// [`days_step`] until `days` days have been covered.
pub fn sample_days(today: NaiveDate, days: u32) -> Vec<NaiveDate> {
    let step = days_step(days);
    (0..=days / step)
        .filter_map(|i| today.checked_sub_days(Days::new(u64::from(i * step))))
        .collect()
}

/// Parse the `days` parameter of a graph request, falling back to the
/// default on anything that is not a non-negative integer.
pub fn parse_days(raw: Option<&str>) -> u32 {
    raw.and_then(|value| value.trim().parse().ok())
        .unwrap_or(DEFAULT_GRAPH_DAYS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewRequest, RequestRecord};
    use crate::query::{MemoryQuery, RequestFilter, TimeWindow};
    use chrono::{TimeZone, Utc};

    fn query_with(statuses: &[u16]) -> MemoryQuery {
        let rows: Vec<RequestRecord> = statuses
            .iter()
            .enumerate()
            .map(|(i, status)| {
                NewRequest {
                    status_code: *status,
                    ip: format!("10.0.0.{}", i % 2),
                    ..Default::default()
                }
                .into_record(i as i64 + 1)
            })
            .collect();
        MemoryQuery::new(Arc::new(rows), TimeWindow::all())
    }

    fn modules(identifiers: &[&str]) -> Modules {
        Modules::new(
            identifiers.iter().map(|s| s.to_string()).collect(),
            ModuleContext::default(),
        )
    }

    struct FailingQuery(TimeWindow);

    #[async_trait]
    impl RequestQuery for FailingQuery {
        fn window(&self) -> &TimeWindow {
            &self.0
        }

        async fn count(&self, _filter: &RequestFilter) -> Result<u64, QueryError> {
            Err(QueryError::InvalidDate("2021-02-30".to_string()))
        }

        async fn count_distinct(
            &self,
            _field: crate::query::Field,
            _filter: &RequestFilter,
        ) -> Result<u64, QueryError> {
            Err(QueryError::InvalidDate("2021-02-30".to_string()))
        }

        async fn top(
            &self,
            _field: crate::query::Field,
            _filter: &RequestFilter,
            _limit: usize,
        ) -> Result<Vec<(String, u64)>, QueryError> {
            Ok(Vec::new())
        }

        async fn fetch(
            &self,
            _filter: &RequestFilter,
            _limit: Option<usize>,
        ) -> Result<Vec<RequestRecord>, QueryError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_table_shape_and_column_order() {
        let modules = modules(&["traffic.Hit", "traffic.Error", "traffic.UniqueVisitor"]);
        let small = query_with(&[200]);
        let large = query_with(&[200, 404, 500, 200]);
        let queries: [(&str, &dyn RequestQuery); 2] = [("small", &small), ("large", &large)];

        let table = modules
            .table(&queries)
            .await
            .unwrap();

        assert_eq!(table.columns, vec!["small", "large"]);
        assert_eq!(table.rows.len(), 3);
        assert!(table.rows.iter().all(|row| row.counts.len() == 2));
        assert_eq!(
            table.rows[0],
            TrafficRow {
                label: "Hits".to_string(),
                counts: vec![1, 4]
            }
        );
        assert_eq!(table.rows[1].counts, vec![0, 2]);
        assert_eq!(table.rows[2].label, "Unique Visitors");
        assert_eq!(table.rows[2].counts, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_graph_points_at_start_of_day() {
        let modules = modules(&["traffic.Hit", "traffic.Error"]);
        let first = query_with(&[200, 200]);
        let second = query_with(&[404]);
        let d1 = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();

        let days: [(NaiveDate, &dyn RequestQuery); 2] = [(d1, &first), (d2, &second)];

        let series = modules.graph(&days).await.unwrap();

        assert_eq!(series.len(), 2);
        let midnight = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        assert_eq!(series[0].label, "Hits");
        assert_eq!(series[0].data[0], (midnight.timestamp_millis(), 2));
        assert_eq!(series[0].data[1].0, midnight.timestamp_millis() - 86_400_000);
        assert_eq!(
            series[1].data,
            vec![
                (midnight.timestamp_millis(), 0),
                (midnight.timestamp_millis() - 86_400_000, 1)
            ]
        );

        let json = serde_json::to_value(&series[0]).unwrap();
        assert_eq!(json["data"][0][1], 2);
    }

    #[tokio::test]
    async fn test_query_errors_propagate() {
        let modules = modules(&["traffic.Hit"]);
        let failing = FailingQuery(TimeWindow::all());
        let queries: [(&str, &dyn RequestQuery); 1] = [("broken", &failing)];
        let result = modules.table(&queries).await;
        assert!(matches!(result, Err(TrafficError::Query(QueryError::InvalidDate(_)))));
    }

    #[tokio::test]
    async fn test_misconfigured_modules_fail_closed() {
        let modules = modules(&["traffic.Hit", "traffic.Nope"]);
        let query = query_with(&[200]);
        let queries: [(&str, &dyn RequestQuery); 1] = [("all", &query)];
        let result = modules.table(&queries).await;
        assert!(matches!(
            result,
            Err(TrafficError::Configuration(ConfigurationError::UnknownType { .. }))
        ));
        assert!(modules.graph(&[]).await.is_err());
    }

    #[test]
    fn test_custom_namespace() {
        let mut modules = modules(&["site.Everything"]);
        modules.register("site.Everything", |_| {
            Arc::new(FilteredCount::new(
                DisplayNames::derive("Everything").with_plural("Everything"),
                RequestFilter::all(),
            ))
        });
        let loaded = modules.load().unwrap();
        assert_eq!(loaded[0].names().verbose_name, "Everything");
    }

    #[test]
    fn test_day_sampling() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        assert_eq!(days_step(9), 1);
        assert_eq!(sample_days(today, 9).len(), 10);
        assert_eq!(days_step(10), 2);
        assert_eq!(sample_days(today, 30).len(), 16);
        assert_eq!(days_step(59), 2);
        assert_eq!(days_step(60), 30);
        assert_eq!(sample_days(today, 365).len(), 13);

        let days = sample_days(today, 30);
        assert_eq!(days[0], today);
        assert_eq!(days[1], NaiveDate::from_ymd_opt(2024, 6, 28).unwrap());
        assert_eq!(days[15], NaiveDate::from_ymd_opt(2024, 5, 31).unwrap());
    }

    #[test]
    fn test_parse_days() {
        assert_eq!(parse_days(Some("7")), 7);
        assert_eq!(parse_days(Some("week")), DEFAULT_GRAPH_DAYS);
        assert_eq!(parse_days(Some("-3")), DEFAULT_GRAPH_DAYS);
        assert_eq!(parse_days(None), DEFAULT_GRAPH_DAYS);
    }
}
