// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava Sessions API Server
//!
//! Keeps Strava OAuth sessions for athletes and deauthorizes the ones that
//! have gone idle.

use std::sync::Arc;
use strava_sessions::{
    config::{Config, StoreBackend},
    db::{FirestoreDb, MemoryStore, SessionStore},
    services::{CredentialCipher, LifecyclePolicy, SessionManager, StravaClient, SweepScheduler},
    AppState,
};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Strava Sessions API");

    // Initialize session store
    let store: Arc<dyn SessionStore> = match config.store_backend {
        StoreBackend::Firestore => Arc::new(FirestoreDb::new(&config.gcp_project_id).await?),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory session store; sessions are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let cipher = CredentialCipher::new(&config.token_encryption_key)?;

    let strava = StravaClient::new(
        config.strava_client_id.clone(),
        config.strava_client_secret.clone(),
        config.upstream_timeout,
    )?;

    let manager = Arc::new(SessionManager::new(
        store,
        Arc::new(strava),
        cipher,
        LifecyclePolicy::from_config(&config),
    ));
    tracing::info!(
        inactivity_days = config.inactivity_threshold.num_days(),
        max_age_days = config.max_session_age.num_days(),
        "Session manager initialized"
    );

    // Sweep once now, then on every interval
    let scheduler = Arc::new(SweepScheduler::new(manager.clone()));
    scheduler.start(config.sweep_interval).await;

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        manager,
        scheduler: scheduler.clone(),
    });

    // Build router
    let app = strava_sessions::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM (sent by Cloud Run before stopping an instance).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("strava_sessions=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
