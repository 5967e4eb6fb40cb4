//! Error types shared across the crate

use thiserror::Error;

/// Raised once, at load or construction time, when static configuration is
/// unusable. Never produced on the per-request path.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("'{0}' isn't a valid identifier (expected '<namespace>.<Type>')")]
    MalformedIdentifier(String),

    #[error("error importing '{identifier}': no namespace '{namespace}' is registered")]
    UnknownNamespace { identifier: String, namespace: String },

    #[error("'{namespace}' does not define a '{name}' type (requested by '{identifier}')")]
    UnknownType {
        identifier: String,
        namespace: String,
        name: String,
    },

    #[error("invalid value '{value}' for setting {key}")]
    InvalidSetting { key: String, value: String },
}

/// Errors originating in the query layer. These are propagated verbatim by
/// the traffic aggregator.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("invalid week {week} for year {year}")]
    InvalidWeek { year: i32, week: u32 },

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Errors surfaced by traffic reports (tables, graphs, plugin reports).
#[derive(Debug, Error)]
pub enum TrafficError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Storage(#[from] crate::storage::StorageError),
}
