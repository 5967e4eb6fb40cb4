use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A logged HTTP request/response pair, as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: i64,

    /// Response status code
    pub status_code: u16,

    pub method: String,
    pub path: String,
    pub full_path: String,

    /// Query parameters as a JSON object
    pub query_string: Option<serde_json::Value>,

    /// Request headers as a JSON object
    pub headers: Option<serde_json::Value>,

    pub time: DateTime<Utc>,
    pub is_secure: bool,

    /// Whether the request was issued from javascript (`X-Requested-With`)
    pub is_ajax: bool,

    pub ip: String,
    pub user_id: Option<i64>,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
    pub language: Option<String>,
}

impl fmt::Display for RequestRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} {}",
            self.time, self.method, self.path, self.status_code
        )
    }
}

/// A request about to be stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRequest {
    pub status_code: u16,
    pub method: String,
    pub path: String,
    pub full_path: String,
    pub query_string: Option<serde_json::Value>,
    pub headers: Option<serde_json::Value>,
    pub time: DateTime<Utc>,
    pub is_secure: bool,
    pub is_ajax: bool,
    pub ip: String,
    pub user_id: Option<i64>,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
    pub language: Option<String>,
}

impl Default for NewRequest {
    fn default() -> Self {
        Self {
            status_code: 200,
            method: "GET".to_string(),
            path: "/".to_string(),
            full_path: "/".to_string(),
            query_string: None,
            headers: None,
            time: Utc::now(),
            is_secure: false,
            is_ajax: false,
            ip: String::new(),
            user_id: None,
            referer: None,
            user_agent: None,
            language: None,
        }
    }
}

impl NewRequest {
    pub fn into_record(self, id: i64) -> RequestRecord {
        RequestRecord {
            id,
            status_code: self.status_code,
            method: self.method,
            path: self.path,
            full_path: self.full_path,
            query_string: self.query_string,
            headers: self.headers,
            time: self.time,
            is_secure: self.is_secure,
            is_ajax: self.is_ajax,
            ip: self.ip,
            user_id: self.user_id,
            referer: self.referer,
            user_agent: self.user_agent,
            language: self.language,
        }
    }
}

/// Authenticated user attached to a request by upstream auth layers.
///
/// The recording middleware reads it from the request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestUser {
    pub id: i64,
    pub username: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_display() {
        let record = NewRequest {
            method: "POST".to_string(),
            path: "/login".to_string(),
            status_code: 302,
            time: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            ..Default::default()
        }
        .into_record(7);

        assert_eq!(record.id, 7);
        assert_eq!(record.to_string(), "[2024-03-01 12:00:00 UTC] POST /login 302");
    }
}
