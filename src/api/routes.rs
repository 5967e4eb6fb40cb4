use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers::{
    health_check, list_requests, overview, traffic_graph, traffic_summary, AppState,
};
use crate::recorder::{record_requests, Recorder};

pub fn create_api_router(state: Arc<AppState>) -> Router {
    let reports = Router::new()
        .route("/traffic/summary", get(traffic_summary))
        .route("/traffic/graph", get(traffic_graph))
        .route("/overview", get(overview))
        .route("/requests", get(list_requests))
        .with_state(state);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", reports)
}

/// Wrap `router` so that every request through it is offered to `recorder`.
pub fn with_recording(router: Router, recorder: Arc<Recorder>) -> Router {
    router
        .layer(middleware::from_fn_with_state(recorder, record_requests))
        .layer(TraceLayer::new_for_http())
}
