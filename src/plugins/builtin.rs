use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;

use super::{Plugin, PluginContext, PluginReport, Plugins, RankedValue};
use crate::error::TrafficError;
use crate::naming::DisplayNames;
use crate::query::{Field, RequestFilter, RequestQuery, TimeWindow};
use crate::ranking::set_count_present;
use crate::traffic::ModuleContext;

const LATEST_REQUESTS: usize = 5;
const TOP_LIMIT: usize = 10;
const TOP_BROWSERS: usize = 5;
const ACTIVE_WINDOW_MINUTES: i64 = 15;

/// Traffic table over today, this week, this month, this year and all time.
pub struct TrafficInformation {
    names: DisplayNames,
}

#[async_trait]
impl Plugin for TrafficInformation {
    fn names(&self) -> &DisplayNames {
        &self.names
    }

    async fn report(&self, ctx: &PluginContext<'_>) -> Result<PluginReport, TrafficError> {
        let windows = [
            ("today", TimeWindow::today()),
            ("this_week", TimeWindow::this_week()),
            ("this_month", TimeWindow::this_month()),
            ("this_year", TimeWindow::this_year()?),
            ("all", TimeWindow::all()),
        ];
        let owned: Vec<(&str, Box<dyn RequestQuery>)> = windows
            .into_iter()
            .map(|(label, window)| (label, ctx.storage.query(window)))
            .collect();
        let queries: Vec<(&str, &dyn RequestQuery)> = owned
            .iter()
            .map(|(label, query)| (*label, query.as_ref()))
            .collect();

        Ok(PluginReport::Traffic(ctx.modules.table(&queries).await?))
    }
}

pub struct LatestRequests {
    names: DisplayNames,
}

#[async_trait]
impl Plugin for LatestRequests {
    fn names(&self) -> &DisplayNames {
        &self.names
    }

    async fn report(&self, ctx: &PluginContext<'_>) -> Result<PluginReport, TrafficError> {
        let records = ctx
            .query
            .fetch(&RequestFilter::all(), Some(LATEST_REQUESTS))
            .await?;
        let summaries = records
            .into_iter()
            .map(|record| ctx.classifier.classify(record).summary(false))
            .collect();
        Ok(PluginReport::Requests(summaries))
    }
}

/// Most requested values of one field under a fixed filter.
pub struct TopField {
    names: DisplayNames,
    field: Field,
    filter: RequestFilter,
    limit: usize,
}

#[async_trait]
impl Plugin for TopField {
    fn names(&self) -> &DisplayNames {
        &self.names
    }

    async fn report(&self, ctx: &PluginContext<'_>) -> Result<PluginReport, TrafficError> {
        let top = ctx.query.top(self.field, &self.filter, self.limit).await?;
        Ok(PluginReport::Ranking(top.into_iter().map(RankedValue::from).collect()))
    }
}

pub struct TopSearchPhrases {
    names: DisplayNames,
}

#[async_trait]
impl Plugin for TopSearchPhrases {
    fn names(&self) -> &DisplayNames {
        &self.names
    }

    async fn report(&self, ctx: &PluginContext<'_>) -> Result<PluginReport, TrafficError> {
        let records = ctx.query.fetch(&RequestFilter::all().search(), None).await?;
        let phrases = records.into_iter().map(|record| {
            ctx.classifier
                .classify(record)
                .keywords()
                .map(str::to_string)
        });
        Ok(ranking(set_count_present(phrases), TOP_LIMIT))
    }
}

pub struct TopBrowsers {
    names: DisplayNames,
}

#[async_trait]
impl Plugin for TopBrowsers {
    fn names(&self) -> &DisplayNames {
        &self.names
    }

    async fn report(&self, ctx: &PluginContext<'_>) -> Result<PluginReport, TrafficError> {
        let records = ctx.query.fetch(&RequestFilter::all(), None).await?;
        let browsers = records
            .into_iter()
            .map(|record| ctx.classifier.classify(record).browser().map(str::to_string));
        Ok(ranking(set_count_present(browsers), TOP_BROWSERS))
    }
}

/// Users seen in the last few minutes, whatever the overview window.
pub struct ActiveUsers {
    names: DisplayNames,
}

#[async_trait]
impl Plugin for ActiveUsers {
    fn names(&self) -> &DisplayNames {
        &self.names
    }

    async fn report(&self, ctx: &PluginContext<'_>) -> Result<PluginReport, TrafficError> {
        let since = ctx.now - Duration::minutes(ACTIVE_WINDOW_MINUTES);
        Ok(PluginReport::Users(ctx.storage.active_users(since).await?))
    }
}

fn ranking(counted: Vec<(String, u64)>, limit: usize) -> PluginReport {
    PluginReport::Ranking(
        counted
            .into_iter()
            .take(limit)
            .map(RankedValue::from)
            .collect(),
    )
}

fn top_field(name: &str, field: Field, filter: RequestFilter, limit: usize) -> Arc<dyn Plugin> {
    Arc::new(TopField {
        names: DisplayNames::derive(name),
        field,
        filter,
        limit,
    })
}

pub(super) fn register_builtin(plugins: &mut Plugins) {
    plugins
        .register("plugins.TrafficInformation", |_| {
            Arc::new(TrafficInformation {
                names: DisplayNames::derive("TrafficInformation"),
            })
        })
        .register("plugins.LatestRequests", |_| {
            Arc::new(LatestRequests {
                names: DisplayNames::derive("LatestRequests"),
            })
        })
        .register("plugins.TopPaths", |_| {
            top_field(
                "TopPaths",
                Field::Path,
                RequestFilter::all().status_below(400),
                TOP_LIMIT,
            )
        })
        .register("plugins.TopErrorPaths", |_| {
            top_field(
                "TopErrorPaths",
                Field::Path,
                RequestFilter::all().status_at_least(400),
                TOP_LIMIT,
            )
        })
        .register("plugins.TopReferrers", |ctx: &ModuleContext| {
            top_field(
                "TopReferrers",
                Field::Referer,
                RequestFilter::all()
                    .unique_visits(&ctx.base_url)
                    .with_referer(),
                TOP_LIMIT,
            )
        })
        .register("plugins.TopSearchPhrases", |_| {
            Arc::new(TopSearchPhrases {
                names: DisplayNames::derive("TopSearchPhrases"),
            })
        })
        .register("plugins.TopBrowsers", |_| {
            Arc::new(TopBrowsers {
                names: DisplayNames::derive("TopBrowsers"),
            })
        })
        .register("plugins.ActiveUsers", |_| {
            Arc::new(ActiveUsers {
                names: DisplayNames::derive("ActiveUsers"),
            })
        });
}
