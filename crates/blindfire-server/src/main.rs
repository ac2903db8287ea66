use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use blindfire_api::config::{Config, StorageConfig};
use blindfire_api::probe::ProbeTemplate;
use blindfire_api::routes::{AppState, AppStateInner};
use blindfire_api::{notification, storage};
use blindfire_db::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blindfire=debug,blindfire_api=debug,blindfire_db=info,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database, storage and notification backends
    let db = Arc::new(Database::open(&config.db_path)?);
    let store = storage::from_config(&config.storage).await?;
    let notifier = notification::from_config(config.email.as_ref());
    let probe = ProbeTemplate::load(&config.probe_path).await?;
    tokio::fs::create_dir_all(&config.upload_tmp_dir).await?;

    match &config.storage {
        StorageConfig::Local { dir } => info!("Storing screenshots in {}", dir.display()),
        StorageConfig::Bucket { bucket, .. } => info!("Storing screenshots in bucket {}", bucket),
    }
    if notifier.is_none() {
        info!("Email notifications disabled");
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let tasks = TaskTracker::new();
    let state: AppState = Arc::new(AppStateInner {
        config,
        db,
        store,
        notifier,
        probe,
        tasks: tasks.clone(),
    });

    let app = blindfire_api::router(state).layer(TraceLayer::new_for_http());

    info!("Blindfire listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Fires already acknowledged still get recorded.
    tasks.close();
    info!("Waiting for {} in-flight fires", tasks.len());
    tasks.wait().await;

    Ok(())
}

/// Resolves on SIGINT or SIGTERM. New connections stop being accepted; fires
/// already acknowledged are drained by the caller.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Ctrl+C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal = tokio::select! {
        _ = interrupt => "SIGINT",
        _ = terminate => "SIGTERM",
    };
    info!("Received {}, no longer accepting fires", signal);
}
