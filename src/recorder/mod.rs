//! Request recording middleware
//!
//! [`record_requests`] captures the request metadata before the inner
//! service runs, waits for the response and then asks the [`Recorder`]
//! whether the exchange should be stored. Recording failures are logged and
//! never change the response.

pub mod client_ip;

use axum::body::Body;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, error};

use crate::classify::tables::ignore_list;
use crate::config::{MetricsConfig, ProxyConfig, TrustedProxyMode};
use crate::error::ConfigurationError;
use crate::models::{NewRequest, RequestRecord, RequestUser};
use crate::router::{Patterns, Resolved};
use crate::storage::RequestStorage;

pub use client_ip::{anonymize_ip, extract_client_ip};

/// Request side of an exchange, captured before the handler runs.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub method: String,
    pub path: String,
    pub full_path: String,
    pub query_string: Option<Value>,
    pub headers: Option<Value>,
    pub is_secure: bool,
    pub is_ajax: bool,
    pub client_ip: IpAddr,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
    pub language: Option<String>,
    pub user: Option<RequestUser>,
}

impl Exchange {
    pub fn from_request(request: &Request<Body>, proxy: &ProxyConfig) -> Self {
        let headers = request.headers();
        let uri = request.uri();

        let socket_ip = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        let query_string = uri.query().map(|_| {
            Query::<HashMap<String, String>>::try_from_uri(uri)
                .map(|Query(params)| {
                    Value::Object(
                        params
                            .into_iter()
                            .map(|(k, v)| (k, Value::String(v)))
                            .collect(),
                    )
                })
                .unwrap_or(Value::Null)
        });

        // X-Forwarded-Proto is client controlled unless a proxy sets it.
        let is_secure = uri.scheme_str() == Some("https")
            || (proxy.mode != TrustedProxyMode::None
                && header_str(headers, "x-forwarded-proto")
                    .is_some_and(|proto| proto.eq_ignore_ascii_case("https")));

        Self {
            method: request.method().as_str().to_string(),
            path: uri.path().to_string(),
            full_path: uri
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| uri.path().to_string()),
            query_string,
            headers: Some(headers_json(headers)),
            is_secure,
            is_ajax: header_str(headers, "x-requested-with") == Some("XMLHttpRequest"),
            client_ip: extract_client_ip(headers, socket_ip, proxy),
            referer: header_str(headers, header::REFERER.as_str()).map(str::to_string),
            user_agent: header_str(headers, header::USER_AGENT.as_str()).map(str::to_string),
            language: header_str(headers, header::ACCEPT_LANGUAGE.as_str()).map(str::to_string),
            user: request.extensions().get::<RequestUser>().cloned(),
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn headers_json(headers: &HeaderMap) -> Value {
    let mut map = Map::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            map.insert(name.as_str().to_string(), Value::String(value.to_string()));
        }
    }
    Value::Object(map)
}

/// Decides which exchanges are stored and applies the privacy settings.
pub struct Recorder {
    storage: Arc<dyn RequestStorage>,
    settings: MetricsConfig,
    proxy: ProxyConfig,
    ignore_paths: Patterns<Option<Resolved>>,
    ignore_user_agents: Patterns<Option<Resolved>>,
}

impl Recorder {
    /// Fails when an ignore pattern does not compile.
    pub fn new(
        storage: Arc<dyn RequestStorage>,
        settings: MetricsConfig,
        proxy: ProxyConfig,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            ignore_paths: ignore_list(&settings.ignore_paths)?,
            ignore_user_agents: ignore_list(&settings.ignore_user_agents)?,
            storage,
            settings,
            proxy,
        })
    }

    pub fn proxy(&self) -> &ProxyConfig {
        &self.proxy
    }

    /// Whether an exchange that produced `status` should be stored.
    pub fn should_record(&self, exchange: &Exchange, status: u16) -> bool {
        let method = exchange.method.to_lowercase();
        if !self.settings.valid_method_names.iter().any(|m| *m == method) {
            return false;
        }

        if self.settings.only_errors && status < 400 {
            return false;
        }

        let path = exchange.path.strip_prefix('/').unwrap_or(&exchange.path);
        if self.ignore_paths.is_match(path) {
            return false;
        }

        if self
            .settings
            .ignore_ip
            .iter()
            .any(|net| net.contains(&exchange.client_ip))
        {
            return false;
        }

        let user_agent = exchange.user_agent.as_deref().unwrap_or("");
        if self.ignore_user_agents.is_match(user_agent) {
            return false;
        }

        if let Some(user) = &exchange.user {
            if self.settings.ignore_usernames.contains(&user.username) {
                return false;
            }
        }

        true
    }

    /// The record to store, after the IP and user policies.
    pub fn prepare(&self, exchange: Exchange, status: u16) -> NewRequest {
        let ip = if !self.settings.log_ip {
            self.settings.ip_dummy
        } else if self.settings.anonymous_ip {
            anonymize_ip(exchange.client_ip)
        } else {
            exchange.client_ip
        };

        let user_id = exchange
            .user
            .filter(|_| self.settings.log_user)
            .map(|user| user.id);

        NewRequest {
            status_code: status,
            method: exchange.method,
            path: exchange.path,
            full_path: exchange.full_path,
            query_string: exchange.query_string,
            headers: exchange.headers,
            time: Utc::now(),
            is_secure: exchange.is_secure,
            is_ajax: exchange.is_ajax,
            ip: ip.to_string(),
            user_id,
            referer: exchange.referer,
            user_agent: exchange.user_agent,
            language: exchange.language,
        }
    }

    /// Filter, prepare and store. Returns the stored record, or `None` when
    /// the exchange was skipped or could not be stored.
    pub async fn record(&self, exchange: Exchange, status: u16) -> Option<RequestRecord> {
        if !self.should_record(&exchange, status) {
            debug!("Skipping {} {} ({})", exchange.method, exchange.path, status);
            return None;
        }

        let request = self.prepare(exchange, status);
        match self.storage.insert(&request).await {
            Ok(record) => Some(record),
            Err(e) => {
                error!("Failed to record {} {}: {}", request.method, request.path, e);
                None
            }
        }
    }
}

/// Axum middleware; mount with `middleware::from_fn_with_state`.
pub async fn record_requests(
    State(recorder): State<Arc<Recorder>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let exchange = Exchange::from_request(&request, recorder.proxy());
    let response = next.run(request).await;
    recorder.record(exchange, response.status().as_u16()).await;
    response
}
