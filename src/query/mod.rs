//! Read-only queries over stored request records
//!
//! A [`RequestQuery`] is a handle on "every request inside a [`TimeWindow`]".
//! Traffic modules and plugins narrow it further with a [`RequestFilter`]
//! and ask for counts, distinct counts, top values or raw records. Storage
//! backends implement the trait; [`MemoryQuery`] does the same over a plain
//! vector.

pub mod memory;
pub mod window;

use async_trait::async_trait;

use crate::error::QueryError;
use crate::models::RequestRecord;

pub use memory::MemoryQuery;
pub use window::{start_of_day, TimeWindow};

/// Hosts whose referers count as search-engine traffic.
pub const SEARCH_ENGINE_HOSTS: &[&str] = &["google", "yahoo", "bing"];

/// Columns that can be grouped or counted distinctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Ip,
    UserId,
    Path,
    Referer,
    UserAgent,
}

impl Field {
    pub fn column(self) -> &'static str {
        match self {
            Field::Ip => "ip",
            Field::UserId => "user_id",
            Field::Path => "path",
            Field::Referer => "referer",
            Field::UserAgent => "user_agent",
        }
    }

    /// Value of this field on `record`, `None` when the column is NULL.
    pub fn value_of(self, record: &RequestRecord) -> Option<String> {
        match self {
            Field::Ip => Some(record.ip.clone()),
            Field::UserId => record.user_id.map(|id| id.to_string()),
            Field::Path => Some(record.path.clone()),
            Field::Referer => record.referer.clone(),
            Field::UserAgent => record.user_agent.clone(),
        }
    }
}

/// Conjunction of optional conditions on a request record. The default
/// filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub status_at_least: Option<u16>,
    pub status_below: Option<u16>,
    pub status: Option<u16>,
    pub is_secure: Option<bool>,
    pub is_ajax: Option<bool>,
    pub has_user: Option<bool>,
    /// Drop records whose referer starts with this prefix (NULL referers stay)
    pub exclude_referer_prefix: Option<String>,
    pub non_empty_referer: bool,
    /// Only referers from one of [`SEARCH_ENGINE_HOSTS`]
    pub search: bool,
}

impl RequestFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn status_at_least(mut self, code: u16) -> Self {
        self.status_at_least = Some(code);
        self
    }

    pub fn status_below(mut self, code: u16) -> Self {
        self.status_below = Some(code);
        self
    }

    pub fn status(mut self, code: u16) -> Self {
        self.status = Some(code);
        self
    }

    pub fn secure(mut self, is_secure: bool) -> Self {
        self.is_secure = Some(is_secure);
        self
    }

    pub fn ajax(mut self, is_ajax: bool) -> Self {
        self.is_ajax = Some(is_ajax);
        self
    }

    pub fn has_user(mut self, has_user: bool) -> Self {
        self.has_user = Some(has_user);
        self
    }

    /// Requests that did not come from the site itself.
    pub fn unique_visits(mut self, base_url: &str) -> Self {
        self.exclude_referer_prefix = Some(base_url.to_string());
        self
    }

    pub fn with_referer(mut self) -> Self {
        self.non_empty_referer = true;
        self
    }

    pub fn search(mut self) -> Self {
        self.search = true;
        self
    }

    pub fn matches(&self, record: &RequestRecord) -> bool {
        if let Some(code) = self.status_at_least {
            if record.status_code < code {
                return false;
            }
        }
        if let Some(code) = self.status_below {
            if record.status_code >= code {
                return false;
            }
        }
        if let Some(code) = self.status {
            if record.status_code != code {
                return false;
            }
        }
        if let Some(secure) = self.is_secure {
            if record.is_secure != secure {
                return false;
            }
        }
        if let Some(ajax) = self.is_ajax {
            if record.is_ajax != ajax {
                return false;
            }
        }
        if let Some(has_user) = self.has_user {
            if record.user_id.is_some() != has_user {
                return false;
            }
        }

        let referer = record.referer.as_deref();
        if let (Some(prefix), Some(referer)) = (&self.exclude_referer_prefix, referer) {
            if referer.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if self.non_empty_referer && referer.map(str::is_empty).unwrap_or(true) {
            return false;
        }
        if self.search {
            let from_engine = referer
                .map(|r| SEARCH_ENGINE_HOSTS.iter().any(|host| r.contains(host)))
                .unwrap_or(false);
            if !from_engine {
                return false;
            }
        }

        true
    }
}

/// Read-only view of the requests inside one time window.
#[async_trait]
pub trait RequestQuery: Send + Sync {
    fn window(&self) -> &TimeWindow;

    /// Number of matching records.
    async fn count(&self, filter: &RequestFilter) -> Result<u64, QueryError>;

    /// Number of distinct non-NULL values of `field` among matching records.
    async fn count_distinct(&self, field: Field, filter: &RequestFilter) -> Result<u64, QueryError>;

    /// Most frequent non-NULL values of `field`, most frequent first; ties
    /// ordered by value.
    async fn top(
        &self,
        field: Field,
        filter: &RequestFilter,
        limit: usize,
    ) -> Result<Vec<(String, u64)>, QueryError>;

    /// Matching records, newest first.
    async fn fetch(
        &self,
        filter: &RequestFilter,
        limit: Option<usize>,
    ) -> Result<Vec<RequestRecord>, QueryError>;
}
