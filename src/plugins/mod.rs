//! Overview plugins
//!
//! Each plugin turns the overview query (usually "this month") into one
//! serialisable report. Plugins are loaded from configured identifiers the
//! same way traffic modules are.

pub mod builtin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::classify::{Classifier, RequestSummary};
use crate::error::{ConfigurationError, TrafficError};
use crate::naming::DisplayNames;
use crate::query::RequestQuery;
use crate::registry::Registry;
use crate::storage::RequestStorage;
use crate::traffic::{ModuleContext, Modules, TrafficTable};

pub const DEFAULT_PLUGINS: &[&str] = &[
    "plugins.TrafficInformation",
    "plugins.LatestRequests",
    "plugins.TopPaths",
    "plugins.TopErrorPaths",
    "plugins.TopReferrers",
    "plugins.TopSearchPhrases",
    "plugins.TopBrowsers",
];

/// Everything a plugin may read while building its report.
pub struct PluginContext<'a> {
    /// The overview query the report is scoped to
    pub query: &'a dyn RequestQuery,
    pub storage: &'a dyn RequestStorage,
    pub modules: &'a Modules,
    pub classifier: &'a Arc<Classifier>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedValue {
    pub value: String,
    pub count: u64,
}

impl From<(String, u64)> for RankedValue {
    fn from((value, count): (String, u64)) -> Self {
        Self { value, count }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum PluginReport {
    Traffic(TrafficTable),
    Requests(Vec<RequestSummary>),
    Ranking(Vec<RankedValue>),
    Users(Vec<i64>),
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn names(&self) -> &DisplayNames;

    async fn report(&self, ctx: &PluginContext<'_>) -> Result<PluginReport, TrafficError>;
}

/// A plugin report tagged with the plugin's display names.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedPlugin {
    pub name: String,
    pub verbose_name: String,
    pub report: PluginReport,
}

/// Plugin factories receive the same settings as traffic modules.
pub struct Plugins {
    registry: Registry<dyn Plugin, ModuleContext>,
}

impl Plugins {
    pub fn new(identifiers: Vec<String>, context: ModuleContext) -> Self {
        let mut plugins = Self {
            registry: Registry::new("plugin", identifiers, context),
        };
        builtin::register_builtin(&mut plugins);
        plugins
    }

    pub fn with_defaults(context: ModuleContext) -> Self {
        Self::new(default_identifiers(), context)
    }

    pub fn register<F>(&mut self, identifier: &str, factory: F) -> &mut Self
    where
        F: Fn(&ModuleContext) -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.registry.register(identifier, factory);
        self
    }

    pub fn identifiers(&self) -> &[String] {
        self.registry.identifiers()
    }

    pub fn load(&self) -> Result<Arc<[Arc<dyn Plugin>]>, ConfigurationError> {
        self.registry.load()
    }

    pub fn plugins(&self) -> Result<Arc<[Arc<dyn Plugin>]>, ConfigurationError> {
        self.registry.items()
    }

    /// Run every loaded plugin in configured order.
    pub async fn render(&self, ctx: &PluginContext<'_>) -> Result<Vec<RenderedPlugin>, TrafficError> {
        let plugins = self.plugins()?;
        let mut rendered = Vec::with_capacity(plugins.len());
        for plugin in plugins.iter() {
            rendered.push(RenderedPlugin {
                name: plugin.names().name.clone(),
                verbose_name: plugin.names().verbose_name.clone(),
                report: plugin.report(ctx).await?,
            });
        }
        Ok(rendered)
    }
}

pub fn default_identifiers() -> Vec<String> {
    DEFAULT_PLUGINS.iter().map(|s| s.to_string()).collect()
}
