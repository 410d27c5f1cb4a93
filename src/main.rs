use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use roomledger::api::{self, AppState};
use roomledger::auth::HmacTokenVerifier;
use roomledger::config::Config;
use roomledger::ledger::Ledger;
use roomledger::{catalog, compactor};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    roomledger::observability::init(config.metrics_port);

    std::fs::create_dir_all(&config.data_dir)?;
    let ledger = Ledger::open(&config.wal_path(), config.ledger_options())?;

    if let Some(path) = &config.rooms_file {
        let rooms = catalog::load_rooms(path)?;
        catalog::seed_rooms(&ledger, rooms).await?;
    }

    let compactor_ledger = ledger.clone();
    let threshold = config.compact_threshold;
    tokio::spawn(async move {
        compactor::run_compactor(compactor_ledger, threshold).await;
    });

    if config.uses_default_secret() {
        warn!("ROOMLEDGER_JWT_SECRET not set, using the development secret");
    }
    let verifier = Arc::new(HmacTokenVerifier::new(config.jwt_secret.as_bytes()));
    let app = api::build_router(AppState::new(ledger.clone(), verifier));

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("roomledger listening on {addr}");
    info!("  wal: {}", config.wal_path().display());
    info!("  rooms: {}", ledger.room_count());
    info!(
        "  lock_timeout: {:?}, commit_timeout: {:?}",
        config.lock_timeout, config.commit_timeout
    );
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("roomledger stopped");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("ctrl-c handler unavailable: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received, draining requests");
}
