use std::sync::Arc;

use anyhow::{Result, anyhow};
use blindfire_db::Database;
use blindfire_types::models::{InjectionRequest, User};

/// Run a blocking database call off the async runtime.
pub(crate) async fn blocking<T, F>(db: &Arc<Database>, f: F) -> Result<T>
where
    F: FnOnce(&Database) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| anyhow!("spawn_blocking join error: {}", e))?
}

/// The user owning the probe served under `path`, if any.
pub async fn resolve_user(db: &Arc<Database>, path: &str) -> Result<Option<User>> {
    let path = path.to_string();
    let row = blocking(db, move |db| db.get_user_by_path(&path)).await?;
    Ok(row.map(User::from))
}

/// The injection request planted under `injection_key`, if any.
pub async fn resolve_correlation(
    db: &Arc<Database>,
    injection_key: &str,
) -> Result<Option<InjectionRequest>> {
    let key = injection_key.to_string();
    let row = blocking(db, move |db| db.get_injection_request(&key)).await?;
    Ok(row.map(InjectionRequest::from))
}
