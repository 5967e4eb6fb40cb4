use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::error::QueryError;
use crate::models::{NewRequest, RequestRecord};
use crate::query::{RequestQuery, TimeWindow};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait RequestStorage: Send + Sync {
    /// Initialize the storage (create tables, indexes)
    async fn init(&self) -> StorageResult<()>;

    /// Persist a request and return the stored record
    async fn insert(&self, request: &NewRequest) -> StorageResult<RequestRecord>;

    /// Read-only query over the requests inside `window`
    fn query(&self, window: TimeWindow) -> Box<dyn RequestQuery>;

    /// Number of requests logged strictly before `cutoff`
    async fn count_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64>;

    /// Delete requests logged strictly before `cutoff`, returning how many
    /// rows were removed
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64>;

    /// Distinct ids of users with at least one request since `since`
    async fn active_users(&self, since: DateTime<Utc>) -> StorageResult<Vec<i64>>;
}
