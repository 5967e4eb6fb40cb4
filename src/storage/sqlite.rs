use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

use crate::error::QueryError;
use crate::models::{NewRequest, RequestRecord};
use crate::query::{Field, RequestFilter, RequestQuery, TimeWindow, SEARCH_ENGINE_HOSTS};
use crate::storage::{RequestStorage, StorageResult};

const SELECT_COLUMNS: &str = "SELECT id, status_code, method, path, full_path, query_string, \
     headers, time, is_secure, is_ajax, ip, user_id, referer, user_agent, language FROM requests";

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl RequestStorage for SqliteStorage {
    async fn init(&self) -> StorageResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                status_code INTEGER NOT NULL DEFAULT 200,
                method TEXT NOT NULL DEFAULT 'GET',
                path TEXT NOT NULL,
                full_path TEXT NOT NULL,
                query_string TEXT,
                headers TEXT,
                time INTEGER NOT NULL,
                is_secure INTEGER NOT NULL DEFAULT 0,
                is_ajax INTEGER NOT NULL DEFAULT 0,
                ip TEXT NOT NULL,
                user_id INTEGER,
                referer TEXT,
                user_agent TEXT,
                language TEXT
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_requests_time ON requests(time)")
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn insert(&self, request: &NewRequest) -> StorageResult<RequestRecord> {
        let result = sqlx::query(
            r#"
            INSERT INTO requests (
                status_code, method, path, full_path, query_string, headers, time,
                is_secure, is_ajax, ip, user_id, referer, user_agent, language
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request.status_code as i64)
        .bind(&request.method)
        .bind(&request.path)
        .bind(&request.full_path)
        .bind(request.query_string.as_ref().map(|v| v.to_string()))
        .bind(request.headers.as_ref().map(|v| v.to_string()))
        .bind(request.time.timestamp_millis())
        .bind(request.is_secure)
        .bind(request.is_ajax)
        .bind(&request.ip)
        .bind(request.user_id)
        .bind(&request.referer)
        .bind(&request.user_agent)
        .bind(&request.language)
        .execute(self.pool.as_ref())
        .await?;

        // Stored with millisecond precision; hand back what a read would see.
        let mut record = request.clone().into_record(result.last_insert_rowid());
        if let Some(time) = DateTime::<Utc>::from_timestamp_millis(record.time.timestamp_millis()) {
            record.time = time;
        }
        Ok(record)
    }

    fn query(&self, window: TimeWindow) -> Box<dyn RequestQuery> {
        Box::new(SqliteQuery {
            pool: Arc::clone(&self.pool),
            window,
        })
    }

    async fn count_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM requests WHERE time < ?")
            .bind(cutoff.timestamp_millis())
            .fetch_one(self.pool.as_ref())
            .await?;
        Ok(count as u64)
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM requests WHERE time < ?")
            .bind(cutoff.timestamp_millis())
            .execute(self.pool.as_ref())
            .await?;
        Ok(result.rows_affected())
    }

    async fn active_users(&self, since: DateTime<Utc>) -> StorageResult<Vec<i64>> {
        let users: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT user_id
            FROM requests
            WHERE user_id IS NOT NULL AND time >= ?
            ORDER BY user_id
            "#,
        )
        .bind(since.timestamp_millis())
        .fetch_all(self.pool.as_ref())
        .await?;
        Ok(users)
    }
}

/// Query over the `requests` table restricted to one time window.
pub struct SqliteQuery {
    pool: Arc<SqlitePool>,
    window: TimeWindow,
}

impl SqliteQuery {
    fn push_conditions(&self, qb: &mut QueryBuilder<'_, Sqlite>, filter: &RequestFilter) {
        qb.push(" WHERE 1 = 1");

        if let Some(start) = self.window.start {
            qb.push(" AND time >= ").push_bind(start.timestamp_millis());
        }
        if let Some(end) = self.window.end {
            qb.push(" AND time < ").push_bind(end.timestamp_millis());
        }
        if let Some(code) = filter.status_at_least {
            qb.push(" AND status_code >= ").push_bind(code as i64);
        }
        if let Some(code) = filter.status_below {
            qb.push(" AND status_code < ").push_bind(code as i64);
        }
        if let Some(code) = filter.status {
            qb.push(" AND status_code = ").push_bind(code as i64);
        }
        if let Some(secure) = filter.is_secure {
            qb.push(" AND is_secure = ").push_bind(secure);
        }
        if let Some(ajax) = filter.is_ajax {
            qb.push(" AND is_ajax = ").push_bind(ajax);
        }
        match filter.has_user {
            Some(true) => {
                qb.push(" AND user_id IS NOT NULL");
            }
            Some(false) => {
                qb.push(" AND user_id IS NULL");
            }
            None => {}
        }
        if let Some(prefix) = &filter.exclude_referer_prefix {
            qb.push(" AND (referer IS NULL OR substr(referer, 1, ")
                .push_bind(prefix.chars().count() as i64)
                .push(") != ")
                .push_bind(prefix.clone())
                .push(")");
        }
        if filter.non_empty_referer {
            qb.push(" AND referer IS NOT NULL AND referer != ''");
        }
        // instr() is case-sensitive, like `str::contains` in MemoryQuery.
        if filter.search {
            qb.push(" AND (");
            for (i, host) in SEARCH_ENGINE_HOSTS.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                qb.push("instr(referer, ").push_bind(*host).push(") > 0");
            }
            qb.push(")");
        }
    }
}

#[async_trait]
impl RequestQuery for SqliteQuery {
    fn window(&self) -> &TimeWindow {
        &self.window
    }

    async fn count(&self, filter: &RequestFilter) -> Result<u64, QueryError> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM requests");
        self.push_conditions(&mut qb, filter);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool.as_ref())
            .await?;
        Ok(count as u64)
    }

    async fn count_distinct(&self, field: Field, filter: &RequestFilter) -> Result<u64, QueryError> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT COUNT(DISTINCT {}) FROM requests",
            field.column()
        ));
        self.push_conditions(&mut qb, filter);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool.as_ref())
            .await?;
        Ok(count as u64)
    }

    async fn top(
        &self,
        field: Field,
        filter: &RequestFilter,
        limit: usize,
    ) -> Result<Vec<(String, u64)>, QueryError> {
        let column = field.column();
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT CAST({column} AS TEXT) AS value, COUNT(*) AS hits FROM requests"
        ));
        self.push_conditions(&mut qb, filter);
        qb.push(format!(
            " AND {column} IS NOT NULL GROUP BY {column} ORDER BY hits DESC, value ASC LIMIT "
        ))
        .push_bind(limit as i64);

        let rows: Vec<(String, i64)> = qb
            .build_query_as()
            .fetch_all(self.pool.as_ref())
            .await?;
        Ok(rows
            .into_iter()
            .map(|(value, hits)| (value, hits as u64))
            .collect())
    }

    async fn fetch(
        &self,
        filter: &RequestFilter,
        limit: Option<usize>,
    ) -> Result<Vec<RequestRecord>, QueryError> {
        let mut qb = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        self.push_conditions(&mut qb, filter);
        qb.push(" ORDER BY time DESC, id DESC");
        if let Some(limit) = limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows: Vec<RequestRow> = qb
            .build_query_as()
            .fetch_all(self.pool.as_ref())
            .await?;
        rows.into_iter().map(RequestRecord::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct RequestRow {
    id: i64,
    status_code: i64,
    method: String,
    path: String,
    full_path: String,
    query_string: Option<String>,
    headers: Option<String>,
    time: i64,
    is_secure: bool,
    is_ajax: bool,
    ip: String,
    user_id: Option<i64>,
    referer: Option<String>,
    user_agent: Option<String>,
    language: Option<String>,
}

impl TryFrom<RequestRow> for RequestRecord {
    type Error = QueryError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        let time = DateTime::<Utc>::from_timestamp_millis(row.time)
            .ok_or_else(|| QueryError::InvalidDate(format!("stored timestamp {}", row.time)))?;
        let parse_json = |raw: Option<String>| raw.and_then(|s| serde_json::from_str(&s).ok());

        Ok(RequestRecord {
            id: row.id,
            status_code: u16::try_from(row.status_code).unwrap_or_default(),
            method: row.method,
            path: row.path,
            full_path: row.full_path,
            query_string: parse_json(row.query_string),
            headers: parse_json(row.headers),
            time,
            is_secure: row.is_secure,
            is_ajax: row.is_ajax,
            ip: row.ip,
            user_id: row.user_id,
            referer: row.referer,
            user_agent: row.user_agent,
            language: row.language,
        })
    }
}
