use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use blindfire_db::Database;
use serde_json::{Value, json};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::FormError;
use crate::form::read_submission;
use crate::middleware::ClientIp;
use crate::notification::Notifier;
use crate::pipeline::{FireContext, FireOutcome, process_fire};
use crate::probe::ProbeTemplate;
use crate::resolve::{blocking, resolve_user};
use crate::storage::BlobStore;

pub type AppState = Arc<AppStateInner>;

/// Shared state for all route handlers and the fire pipelines they spawn.
pub struct AppStateInner {
    pub config: Config,
    pub db: Arc<Database>,
    pub store: Arc<dyn BlobStore>,
    /// `None` when email notifications are disabled.
    pub notifier: Option<Arc<dyn Notifier>>,
    pub probe: ProbeTemplate,
    /// Pipelines still running after their response went out.
    pub tasks: TaskTracker,
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// POST /js_callback: a probe reporting in.
///
/// Only the shape of the submission is checked here. The probe gets its
/// acknowledgment right away and the rest runs in a detached task.
pub async fn js_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    ClientIp(client_ip): ClientIp,
    mut multipart: Multipart,
) -> Result<Json<Value>, FormError> {
    let submission = read_submission(&mut multipart, &state.config.upload_tmp_dir)
        .await
        .inspect_err(|e| debug!("Rejected fire submission: {}", e))?;

    let ctx = FireContext {
        host: header_str(&headers, header::HOST),
        client_ip,
        submission,
    };

    let task_state = state.clone();
    state.tasks.spawn(async move {
        match process_fire(&task_state, ctx).await {
            Ok(FireOutcome::Persisted { fire_id, notified }) => {
                debug!("Fire {} processed (notified: {})", fire_id, notified);
            }
            Ok(outcome) => debug!("Fire dropped: {:?}", outcome),
            Err(e) => error!("Failed to record fire: {:#}", e),
        }
    });

    Ok(Json(json!({ "status": "success" })))
}

/// GET /: the bare host never maps to a user.
pub async fn probe_root(State(state): State<AppState>, headers: HeaderMap) -> Response {
    serve_probe(&state, &headers, "").await
}

/// GET /{probe_id}: the probe script for the user whose path is `probe_id`.
pub async fn probe(
    State(state): State<AppState>,
    Path(probe_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    serve_probe(&state, &headers, &probe_id).await
}

async fn serve_probe(state: &AppStateInner, headers: &HeaderMap, user_path: &str) -> Response {
    let host = header_str(headers, header::HOST);
    if host.as_deref() != Some(state.config.xss_hostname.as_str()) {
        debug!("Probe requested on foreign host {:?}", host);
        return (StatusCode::FOUND, [(header::LOCATION, "/app/")]).into_response();
    }

    let user = if user_path.is_empty() {
        None
    } else {
        match resolve_user(&state.db, user_path).await {
            Ok(user) => user,
            Err(e) => {
                warn!("User lookup for probe failed: {:#}", e);
                None
            }
        }
    };
    let Some(user) = user else {
        debug!("No user found for path {:?}", user_path);
        return "Hey".into_response();
    };

    info!("Got probe fetch for user id {}", user.id);
    let body = state
        .probe
        .render(&state.config.probe_base_url(), &user, user_path);

    let mut response = body.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/javascript"),
    );
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; script-src 'none'"),
    );
    response
}

/// GET /health: uptime check including the database.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match blocking(&state.db, |db| db.ping()).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => {
            error!("Database health check failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error" })),
            )
        }
    }
}
