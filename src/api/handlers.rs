use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::error::ApiResult;
use crate::classify::{resolve_hostnames, Classifier, RequestSummary};
use crate::plugins::{PluginContext, Plugins, RenderedPlugin};
use crate::query::{RequestFilter, RequestQuery, TimeWindow};
use crate::storage::RequestStorage;
use crate::traffic::{parse_days, sample_days, GraphSeries, Modules, TrafficTable};

pub struct AppState {
    pub storage: Arc<dyn RequestStorage>,
    pub modules: Arc<Modules>,
    pub plugins: Arc<Plugins>,
    pub classifier: Arc<Classifier>,
    /// Include reverse DNS names in request listings
    pub hostname_lookup: bool,
    /// Upper bound on the reverse lookups of one request listing
    pub hostname_timeout: Duration,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

#[derive(Deserialize)]
pub struct GraphQuery {
    /// Kept as text so that a malformed value falls back to the default
    pub days: Option<String>,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub limit: Option<String>,
}

const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 500;

/// Number of requests to list: the default when missing or malformed, capped
/// at [`MAX_LIST_LIMIT`].
pub fn parse_limit(raw: Option<&str>) -> usize {
    raw.and_then(|s| s.trim().parse::<usize>().ok())
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .min(MAX_LIST_LIMIT)
}

pub async fn health_check() -> Json<SuccessResponse> {
    Json(SuccessResponse {
        message: "OK".to_string(),
    })
}

/// Modules over today, this week, this month, this year and all time
pub async fn traffic_summary(State(state): State<Arc<AppState>>) -> ApiResult<Json<TrafficTable>> {
    let windows = [
        ("today", TimeWindow::today()),
        ("this_week", TimeWindow::this_week()),
        ("this_month", TimeWindow::this_month()),
        ("this_year", TimeWindow::this_year()?),
        ("all", TimeWindow::all()),
    ];
    let owned: Vec<(&str, Box<dyn RequestQuery>)> = windows
        .into_iter()
        .map(|(label, window)| (label, state.storage.query(window)))
        .collect();
    let queries: Vec<(&str, &dyn RequestQuery)> = owned
        .iter()
        .map(|(label, query)| (*label, query.as_ref()))
        .collect();

    Ok(Json(state.modules.table(&queries).await?))
}

/// Per-day series for the last `days` days
pub async fn traffic_graph(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GraphQuery>,
) -> ApiResult<Json<Vec<GraphSeries>>> {
    let days = parse_days(params.days.as_deref());
    let today = Utc::now().date_naive();

    let owned: Vec<_> = sample_days(today, days)
        .into_iter()
        .map(|day| (day, state.storage.query(TimeWindow::day(day))))
        .collect();
    let queries: Vec<_> = owned
        .iter()
        .map(|(day, query)| (*day, query.as_ref() as &dyn RequestQuery))
        .collect();

    Ok(Json(state.modules.graph(&queries).await?))
}

/// Every configured plugin over this month
pub async fn overview(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<RenderedPlugin>>> {
    let query = state.storage.query(TimeWindow::this_month());
    let ctx = PluginContext {
        query: query.as_ref(),
        storage: state.storage.as_ref(),
        modules: &state.modules,
        classifier: &state.classifier,
        now: Utc::now(),
    };

    Ok(Json(state.plugins.render(&ctx).await?))
}

/// Latest requests with their derived attributes
pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListQuery>,
) -> ApiResult<Json<Vec<RequestSummary>>> {
    let limit = parse_limit(params.limit.as_deref());
    let records = state
        .storage
        .query(TimeWindow::all())
        .fetch(&RequestFilter::all(), Some(limit))
        .await?;

    let requests: Vec<_> = records
        .into_iter()
        .map(|record| state.classifier.classify(record))
        .collect();

    if state.hostname_lookup {
        let ips = requests.iter().map(|request| request.record().ip.clone());
        let hostnames =
            resolve_hostnames(state.classifier.hostnames(), ips, state.hostname_timeout).await;
        for request in &requests {
            if let Some(hostname) = hostnames.get(&request.record().ip) {
                request.prime_hostname(hostname.clone());
            }
        }
    }

    Ok(Json(
        requests
            .iter()
            .map(|request| request.summary(state.hostname_lookup))
            .collect(),
    ))
}
