use blindfire_types::models::PayloadFire;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::form::FireSubmission;
use crate::notification::FireLinks;
use crate::record::{FireMeta, build_fire};
use crate::resolve::{blocking, resolve_correlation, resolve_user};
use crate::routes::AppStateInner;
use crate::screenshot::store_screenshot;

/// What the handler knew about a fire when it acknowledged it.
#[derive(Debug)]
pub struct FireContext {
    pub host: Option<String>,
    pub client_ip: String,
    pub submission: FireSubmission,
}

/// How far a fire got after it was acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    ForeignHost,
    MissingPath,
    UnknownUser,
    Persisted { fire_id: Uuid, notified: bool },
}

/// Process one acknowledged fire from user lookup through notification.
///
/// Runs after the probe already has its 200, so nothing here reaches the
/// caller. An `Err` means the fire was not persisted.
pub async fn process_fire(state: &AppStateInner, ctx: FireContext) -> anyhow::Result<FireOutcome> {
    let FireContext {
        host,
        client_ip,
        submission: FireSubmission { form, screenshot },
    } = ctx;

    if host.as_deref() != Some(state.config.xss_hostname.as_str()) {
        debug!("got bad host {:?}", host);
        return Ok(FireOutcome::ForeignHost);
    }

    if form.path.is_empty() {
        debug!("Fire had no user path");
        return Ok(FireOutcome::MissingPath);
    }

    let Some(user) = resolve_user(&state.db, &form.path).await? else {
        debug!("No user found for path {:?}", form.path);
        return Ok(FireOutcome::UnknownUser);
    };
    debug!("Got payload for user id {} (probe {:?})", user.id, form.probe_uid);

    let branch = form.branch();
    let screenshot_id = match screenshot {
        Some(upload) => store_screenshot(state.store.as_ref(), upload, branch).await,
        None => None,
    };

    let correlated_request = resolve_correlation(&state.db, &form.injection_key)
        .await?
        .map(|r| r.request);

    let fire = build_fire(
        &form,
        FireMeta {
            user_id: &user.id,
            ip_address: &client_ip,
            screenshot_id,
            correlated_request,
        },
    )?;

    let record = fire.clone();
    blocking(&state.db, move |db| db.insert_payload_fire(&record)).await?;
    info!("Saved fire {} for user id {}", fire.id, user.id);

    let notified = if user.send_email_alerts && state.config.email_notifications_enabled() {
        notify(state, &fire, &user.email).await
    } else {
        false
    };

    Ok(FireOutcome::Persisted {
        fire_id: fire.id,
        notified,
    })
}

async fn notify(state: &AppStateInner, fire: &PayloadFire, recipient: &str) -> bool {
    let Some(notifier) = &state.notifier else {
        return false;
    };

    let service_url = state.config.public_url();
    let links = FireLinks {
        screenshot_url: fire
            .screenshot_id
            .map(|id| format!("{}/screenshots/{}.png", service_url, id)),
        service_url,
    };

    match notifier.send(fire, &links, recipient).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to send notification for fire {}: {:#}", fire.id, e);
            false
        }
    }
}
