//! Built-in traffic counters

use async_trait::async_trait;
use std::sync::Arc;

use super::{ModuleContext, Modules, TrafficModule};
use crate::error::QueryError;
use crate::naming::DisplayNames;
use crate::query::{Field, RequestFilter, RequestQuery};

/// Counts the records matching a fixed filter.
pub struct FilteredCount {
    names: DisplayNames,
    filter: RequestFilter,
}

impl FilteredCount {
    pub fn new(names: DisplayNames, filter: RequestFilter) -> Self {
        Self { names, filter }
    }
}

#[async_trait]
impl TrafficModule for FilteredCount {
    fn names(&self) -> &DisplayNames {
        &self.names
    }

    async fn count(&self, query: &dyn RequestQuery) -> Result<u64, QueryError> {
        query.count(&self.filter).await
    }
}

/// Counts distinct values of one field.
pub struct DistinctCount {
    names: DisplayNames,
    field: Field,
}

impl DistinctCount {
    pub fn new(names: DisplayNames, field: Field) -> Self {
        Self { names, field }
    }
}

#[async_trait]
impl TrafficModule for DistinctCount {
    fn names(&self) -> &DisplayNames {
        &self.names
    }

    async fn count(&self, query: &dyn RequestQuery) -> Result<u64, QueryError> {
        query.count_distinct(self.field, &RequestFilter::all()).await
    }
}

fn filtered(names: DisplayNames, filter: RequestFilter) -> Arc<dyn TrafficModule> {
    Arc::new(FilteredCount::new(names, filter))
}

/// Register every built-in module under the `traffic` namespace.
pub(super) fn register_builtin(modules: &mut Modules) {
    modules
        .register("traffic.Hit", |_: &ModuleContext| {
            filtered(DisplayNames::derive("Hit"), RequestFilter::all())
        })
        .register("traffic.Error", |_: &ModuleContext| {
            filtered(
                DisplayNames::derive("Error"),
                RequestFilter::all().status_at_least(400),
            )
        })
        .register("traffic.Error404", |_: &ModuleContext| {
            filtered(
                DisplayNames::derive("Error404")
                    .with_verbose_name("Error 404")
                    .with_plural("Errors 404"),
                RequestFilter::all().status(404),
            )
        })
        .register("traffic.Secure", |_: &ModuleContext| {
            filtered(
                DisplayNames::derive("Secure").with_plural("Secure"),
                RequestFilter::all().secure(true),
            )
        })
        .register("traffic.Unsecure", |_: &ModuleContext| {
            filtered(
                DisplayNames::derive("Unsecure").with_plural("Unsecure"),
                RequestFilter::all().secure(false),
            )
        })
        .register("traffic.Ajax", |_: &ModuleContext| {
            filtered(
                DisplayNames::derive("Ajax").with_plural("Ajax"),
                RequestFilter::all().ajax(true),
            )
        })
        .register("traffic.NotAjax", |_: &ModuleContext| {
            filtered(
                DisplayNames::derive("NotAjax").with_plural("Not Ajax"),
                RequestFilter::all().ajax(false),
            )
        })
        .register("traffic.Search", |_: &ModuleContext| {
            filtered(
                DisplayNames::derive("Search").with_plural("Searches"),
                RequestFilter::all().search(),
            )
        })
        .register("traffic.UniqueVisit", |ctx: &ModuleContext| {
            filtered(
                DisplayNames::derive("UniqueVisit"),
                RequestFilter::all().unique_visits(&ctx.base_url),
            )
        })
        .register("traffic.UniqueVisitor", |_: &ModuleContext| {
            Arc::new(DistinctCount::new(
                DisplayNames::derive("UniqueVisitor"),
                Field::Ip,
            ))
        })
        .register("traffic.User", |_: &ModuleContext| {
            filtered(DisplayNames::derive("User"), RequestFilter::all().has_user(true))
        })
        .register("traffic.UniqueUser", |_: &ModuleContext| {
            Arc::new(DistinctCount::new(
                DisplayNames::derive("UniqueUser"),
                Field::UserId,
            ))
        });
}
