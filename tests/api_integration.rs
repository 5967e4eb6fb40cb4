//! Integration tests for the report endpoints
//!
//! Requests go through the full router with `oneshot`; storage is an
//! in-memory SQLite database seeded through the storage trait.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use hitcount::api::{self, AppState};
use hitcount::classify::{Classifier, HostnameResolver, NoopHostnameResolver};
use hitcount::config::{MetricsConfig, ProxyConfig};
use hitcount::models::NewRequest;
use hitcount::plugins::Plugins;
use hitcount::query::{RequestFilter, TimeWindow};
use hitcount::recorder::Recorder;
use hitcount::storage::{RequestStorage, SqliteStorage};
use hitcount::traffic::{ModuleContext, Modules};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

async fn create_test_storage() -> Arc<dyn RequestStorage> {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

async fn seed(storage: &Arc<dyn RequestStorage>) {
    let requests = [
        ("/", 200, "10.0.0.1", 0),
        ("/blog/", 200, "10.0.0.2", 0),
        ("/missing", 404, "10.0.0.2", 0),
        ("/", 200, "10.0.0.3", 400),
    ];
    for (path, status, ip, days_ago) in requests {
        storage
            .insert(&NewRequest {
                path: path.to_string(),
                full_path: path.to_string(),
                status_code: status,
                ip: ip.to_string(),
                user_agent: Some("Mozilla/5.0 (X11; Linux x86_64; rv:126.0) Gecko/20100101 Firefox/126.0".to_string()),
                time: Utc::now() - Duration::days(days_ago),
                ..Default::default()
            })
            .await
            .unwrap();
    }
}

fn create_state(storage: Arc<dyn RequestStorage>, modules: Modules) -> Arc<AppState> {
    let classifier = Classifier::with_defaults(Arc::new(NoopHostnameResolver)).unwrap();
    Arc::new(AppState {
        storage,
        modules: Arc::new(modules),
        plugins: Arc::new(Plugins::with_defaults(ModuleContext::default())),
        classifier: Arc::new(classifier),
        hostname_lookup: false,
        hostname_timeout: std::time::Duration::from_millis(500),
    })
}

/// Resolver that answers after `delay`, standing in for a slow DNS server.
struct DelayedResolver {
    delay: std::time::Duration,
}

impl HostnameResolver for DelayedResolver {
    fn reverse(&self, ip: &str) -> Option<String> {
        std::thread::sleep(self.delay);
        Some(format!("host-{}.example", ip))
    }
}

async fn create_app_with_resolver(
    delay: std::time::Duration,
    timeout: std::time::Duration,
) -> Router {
    let storage = create_test_storage().await;
    seed(&storage).await;
    let classifier =
        Classifier::with_defaults(Arc::new(DelayedResolver { delay })).unwrap();
    api::create_api_router(Arc::new(AppState {
        storage,
        modules: Arc::new(Modules::with_defaults(ModuleContext::default())),
        plugins: Arc::new(Plugins::with_defaults(ModuleContext::default())),
        classifier: Arc::new(classifier),
        hostname_lookup: true,
        hostname_timeout: timeout,
    }))
}

async fn create_test_app() -> (Router, Arc<dyn RequestStorage>) {
    let storage = create_test_storage().await;
    seed(&storage).await;
    let state = create_state(
        Arc::clone(&storage),
        Modules::with_defaults(ModuleContext::default()),
    );
    (api::create_api_router(state), storage)
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = create_test_app().await;
    let (status, json) = get_json(app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "OK");
}

#[tokio::test]
async fn test_traffic_summary() {
    let (app, _) = create_test_app().await;
    let (status, json) = get_json(app, "/api/traffic/summary").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json["columns"],
        serde_json::json!(["today", "this_week", "this_month", "this_year", "all"])
    );

    let rows = json["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["label"], "Unique Visitors");
    assert_eq!(rows[0]["counts"][0], 2);
    assert_eq!(rows[0]["counts"][4], 3);
    assert_eq!(rows[2]["label"], "Hits");
    assert_eq!(rows[2]["counts"][0], 3);
    assert_eq!(rows[2]["counts"][4], 4);
}

#[tokio::test]
async fn test_traffic_graph_days() {
    let (app, _) = create_test_app().await;
    let (status, json) = get_json(app, "/api/traffic/graph?days=9").await;

    assert_eq!(status, StatusCode::OK);
    let series = json.as_array().unwrap();
    assert_eq!(series.len(), 3);
    assert_eq!(series[2]["label"], "Hits");

    let data = series[2]["data"].as_array().unwrap();
    assert_eq!(data.len(), 10);
    assert_eq!(data[0][1], 3);

    let today = Utc::now().date_naive();
    let midnight = today.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp_millis();
    assert_eq!(data[0][0], midnight);
    assert_eq!(data[1][0], midnight - 86_400_000);
}

#[tokio::test]
async fn test_traffic_graph_malformed_days_uses_default() {
    let (app, _) = create_test_app().await;
    let (status, json) = get_json(app, "/api/traffic/graph?days=abc").await;

    assert_eq!(status, StatusCode::OK);
    let series = json.as_array().unwrap();
    assert!(series
        .iter()
        .all(|s| s["data"].as_array().unwrap().len() == 16));
}

#[tokio::test]
async fn test_overview() {
    let (app, _) = create_test_app().await;
    let (status, json) = get_json(app, "/api/overview").await;

    assert_eq!(status, StatusCode::OK);
    let plugins = json.as_array().unwrap();
    assert_eq!(plugins.len(), 7);

    assert_eq!(plugins[0]["name"], "TrafficInformation");
    assert_eq!(plugins[0]["report"]["kind"], "traffic");

    assert_eq!(plugins[3]["verbose_name"], "Top Error Paths");
    assert_eq!(plugins[3]["report"]["kind"], "ranking");
    assert_eq!(plugins[3]["report"]["data"][0]["value"], "/missing");
    assert_eq!(plugins[3]["report"]["data"][0]["count"], 1);

    assert_eq!(plugins[6]["report"]["data"][0]["value"], "Firefox");
}

#[tokio::test]
async fn test_list_requests() {
    let (app, _) = create_test_app().await;
    let (status, json) = get_json(app, "/api/requests?limit=2").await;

    assert_eq!(status, StatusCode::OK);
    let requests = json.as_array().unwrap();
    assert_eq!(requests.len(), 2);
    // Newest first; the 404 was the last of today's inserts.
    assert_eq!(requests[0]["path"], "/missing");
    assert_eq!(requests[0]["status_text"], "Not Found");
    assert_eq!(requests[0]["browser"], "Firefox");
    assert!(requests[0].get("hostname").is_none());
}

#[tokio::test]
async fn test_list_requests_malformed_limit_uses_default() {
    let (app, _) = create_test_app().await;
    let (status, json) = get_json(app, "/api/requests?limit=abc").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_list_requests_with_hostnames() {
    let app = create_app_with_resolver(
        std::time::Duration::from_millis(1),
        std::time::Duration::from_secs(5),
    )
    .await;
    let (status, json) = get_json(app, "/api/requests").await;

    assert_eq!(status, StatusCode::OK);
    let requests = json.as_array().unwrap();
    assert_eq!(requests.len(), 4);
    assert!(requests
        .iter()
        .all(|r| r["hostname"] == format!("host-{}.example", r["ip"].as_str().unwrap())));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_slow_hostname_lookups_do_not_hold_up_listing() {
    let app = create_app_with_resolver(
        std::time::Duration::from_secs(3),
        std::time::Duration::from_millis(100),
    )
    .await;
    let started = std::time::Instant::now();
    let (status, json) = get_json(app, "/api/requests").await;

    assert_eq!(status, StatusCode::OK);
    assert!(started.elapsed() < std::time::Duration::from_secs(2));
    let requests = json.as_array().unwrap();
    assert_eq!(requests.len(), 4);
    // Lookups still pending fall back to the IP.
    assert!(requests.iter().all(|r| r["hostname"] == r["ip"]));
}

#[tokio::test]
async fn test_misconfigured_modules_return_error() {
    let storage = create_test_storage().await;
    let modules = Modules::new(
        vec!["traffic.Hit".to_string(), "traffic.Pageview".to_string()],
        ModuleContext::default(),
    );
    let app = api::create_api_router(create_state(storage, modules));

    let (status, json) = get_json(app, "/api/traffic/summary").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"]["code"], "CONFIGURATION_ERROR");
    assert!(json["error"]["message"]
        .as_str()
        .unwrap()
        .contains("traffic.Pageview"));
}

#[tokio::test]
async fn test_api_requests_are_recorded() {
    let storage = create_test_storage().await;
    let state = create_state(
        Arc::clone(&storage),
        Modules::with_defaults(ModuleContext::default()),
    );
    let recorder = Arc::new(
        Recorder::new(
            Arc::clone(&storage),
            MetricsConfig::default(),
            ProxyConfig::default(),
        )
        .unwrap(),
    );
    let app = api::with_recording(api::create_api_router(state), recorder);

    let (status, _) = get_json(app.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get_json(app, "/api/traffic/graph?days=3").await;
    assert_eq!(status, StatusCode::OK);

    let recorded = storage
        .query(TimeWindow::all())
        .fetch(&RequestFilter::all(), None)
        .await
        .unwrap();
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0].path, "/api/traffic/graph");
    assert_eq!(recorded[0].full_path, "/api/traffic/graph?days=3");
    assert_eq!(recorded[0].query_string, Some(serde_json::json!({"days": "3"})));
    assert_eq!(recorded[1].path, "/health");
}
