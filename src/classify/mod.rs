//! Derived request attributes: browser, search keywords and hostname
//!
//! [`ClassifiedRequest`] wraps a stored [`RequestRecord`] and computes each
//! derived attribute on first access, caching it for the lifetime of the
//! wrapper.

pub mod hostname;
pub mod tables;

use serde::Serialize;
use std::sync::{Arc, OnceLock};

use crate::error::ConfigurationError;
use crate::models::{status_text, RequestRecord};
use crate::router::{Resolve, Resolved};

pub use hostname::{resolve_hostnames, DnsHostnameResolver, HostnameResolver, NoopHostnameResolver};
pub use tables::UNKNOWN_BROWSER;

pub type BrowserTable = Arc<dyn Resolve<Output = Resolved>>;
pub type EngineTable = Arc<dyn Resolve<Output = Option<Resolved>>>;

/// Shared, read-only classification tables.
pub struct Classifier {
    browsers: BrowserTable,
    engines: EngineTable,
    hostnames: Arc<dyn HostnameResolver>,
}

impl Classifier {
    pub fn new(
        browsers: BrowserTable,
        engines: EngineTable,
        hostnames: Arc<dyn HostnameResolver>,
    ) -> Self {
        Self {
            browsers,
            engines,
            hostnames,
        }
    }

    /// Classifier over the built-in browser and search engine tables.
    pub fn with_defaults(hostnames: Arc<dyn HostnameResolver>) -> Result<Self, ConfigurationError> {
        Ok(Self::new(
            Arc::new(tables::browsers()?),
            Arc::new(tables::engines()?),
            hostnames,
        ))
    }

    pub fn hostnames(&self) -> Arc<dyn HostnameResolver> {
        Arc::clone(&self.hostnames)
    }

    pub fn classify(self: &Arc<Self>, record: RequestRecord) -> ClassifiedRequest {
        ClassifiedRequest::new(record, Arc::clone(self))
    }
}

/// A request record plus lazily computed, memoized derived attributes.
pub struct ClassifiedRequest {
    record: RequestRecord,
    classifier: Arc<Classifier>,
    browser: OnceLock<Option<String>>,
    keywords: OnceLock<Option<String>>,
    hostname: OnceLock<String>,
}

impl ClassifiedRequest {
    pub fn new(record: RequestRecord, classifier: Arc<Classifier>) -> Self {
        Self {
            record,
            classifier,
            browser: OnceLock::new(),
            keywords: OnceLock::new(),
            hostname: OnceLock::new(),
        }
    }

    pub fn record(&self) -> &RequestRecord {
        &self.record
    }

    /// Mutable access to the underlying record. Attributes already computed
    /// keep their cached values.
    pub fn record_mut(&mut self) -> &mut RequestRecord {
        &mut self.record
    }

    pub fn into_record(self) -> RequestRecord {
        self.record
    }

    /// Browser label for the user agent, `None` when there is no user agent.
    pub fn browser(&self) -> Option<&str> {
        self.browser
            .get_or_init(|| {
                let user_agent = self.record.user_agent.as_deref().filter(|ua| !ua.is_empty())?;
                Some(self.classifier.browsers.resolve(user_agent).label)
            })
            .as_deref()
    }

    /// Search phrase from a search engine referer, with `+` turned back into
    /// spaces.
    pub fn keywords(&self) -> Option<&str> {
        self.keywords
            .get_or_init(|| {
                let referer = self.record.referer.as_deref().filter(|r| !r.is_empty())?;
                let resolved = self.classifier.engines.resolve(referer)?;
                resolved
                    .captures
                    .get("keywords")
                    .map(|keywords| keywords.split('+').collect::<Vec<_>>().join(" "))
            })
            .as_deref()
    }

    /// Reverse DNS name of the client IP, or the IP itself when the lookup
    /// fails for any reason.
    pub fn hostname(&self) -> &str {
        self.hostname.get_or_init(|| {
            self.classifier
                .hostnames
                .reverse(&self.record.ip)
                .unwrap_or_else(|| self.record.ip.clone())
        })
    }

    /// Use a hostname resolved elsewhere (see [`resolve_hostnames`]). Has no
    /// effect once the hostname has been computed.
    pub fn prime_hostname(&self, hostname: String) {
        let _ = self.hostname.set(hostname);
    }

    /// Serializable snapshot of the record and its derived attributes.
    pub fn summary(&self, with_hostname: bool) -> RequestSummary {
        RequestSummary {
            record: self.record.clone(),
            status_text: status_text(self.record.status_code),
            browser: self.browser().map(str::to_string),
            keywords: self.keywords().map(str::to_string),
            hostname: with_hostname.then(|| self.hostname().to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestSummary {
    #[serde(flatten)]
    pub record: RequestRecord,
    pub status_text: Option<&'static str>,
    pub browser: Option<String>,
    pub keywords: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}
