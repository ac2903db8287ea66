pub mod config;
pub mod error;
pub mod form;
pub mod middleware;
pub mod notification;
pub mod pipeline;
pub mod probe;
pub mod record;
pub mod resolve;
pub mod routes;
pub mod scratch;
pub mod screenshot;
pub mod storage;

use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, Method, header::CONTENT_TYPE},
    routing::{get, post},
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::routes::AppState;

/// All public routes of the collector.
pub fn router(state: AppState) -> Router {
    // Probes run on arbitrary origins.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static("x-requested-with")])
        .max_age(Duration::from_secs(86400));

    Router::new()
        .route("/js_callback", post(routes::js_callback))
        .route("/health", get(routes::health))
        .route("/", get(routes::probe_root))
        .route("/{probe_id}", get(routes::probe))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(cors)
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .with_state(state)
}
