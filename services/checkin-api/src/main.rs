//! Event check-in API server.
//!
//! Serves the REST API and the live-update WebSocket, and runs the change
//! notifier that pushes event snapshots to live subscribers.

use std::sync::Arc;

use anyhow::Result;
use checkin_api::{
    api,
    auth::{HmacCredentials, Pbkdf2Hasher},
    config::{Config, StoreKind},
    db::{Database, EventStore, MemoryEventStore, MemoryUserStore, UserStore},
    notifier::{BroadcastHub, ChangeNotifier},
    seed,
    state::{AppState, AuthSettings},
};
use rand::Rng;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to CHECKIN_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting check-in API");
    info!(
        listen_addr = %config.listen_addr,
        store = ?config.store,
        dev_mode = config.dev_mode,
        "Configuration loaded"
    );

    let (events, users): (Arc<dyn EventStore>, Arc<dyn UserStore>) = match config.store {
        StoreKind::Postgres => {
            let db = match Database::connect(&config.database).await {
                Ok(db) => {
                    info!("Database connection established");
                    db
                }
                Err(e) => {
                    error!(error = %e, "Failed to connect to database");
                    return Err(e.into());
                }
            };

            // Run migrations in dev mode
            if config.dev_mode {
                info!("Running database migrations (dev mode)");
                if let Err(e) = db.run_migrations_from(&config.database.migrations_dir).await {
                    error!(error = %e, "Failed to run migrations");
                    return Err(e.into());
                }
            }

            let events: Arc<dyn EventStore> = Arc::new(db.event_store());
            let users: Arc<dyn UserStore> = Arc::new(db.user_store());
            (events, users)
        }
        StoreKind::Memory => {
            warn!("Using in-memory store; data is lost on exit");
            let events: Arc<dyn EventStore> = Arc::new(MemoryEventStore::new());
            let users: Arc<dyn UserStore> = Arc::new(MemoryUserStore::new());
            (events, users)
        }
    };

    let secret = match &config.token_secret {
        Some(secret) => secret.as_bytes().to_vec(),
        None => {
            warn!("CHECKIN_TOKEN_SECRET not set; using a random key (dev mode)");
            let mut key = vec![0u8; 32];
            rand::rng().fill(key.as_mut_slice());
            key
        }
    };
    let credentials = Arc::new(HmacCredentials::new(&secret)?);
    let passwords = Arc::new(Pbkdf2Hasher::default());

    if let Err(e) = seed::seed_admin(users.as_ref(), passwords.as_ref(), &config.admin).await {
        error!(error = %e, "Failed to seed default admin");
        return Err(e.into());
    }

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let hub = BroadcastHub::new(config.live_capacity);
    let notifier = ChangeNotifier::new(events.clone(), Arc::new(hub.clone()));
    let notifier_handle = notifier.handle();
    let notifier_task = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            notifier.run(shutdown_rx).await;
        }
    });

    let state = AppState::new(
        events,
        users,
        hub,
        notifier_handle,
        AuthSettings {
            credentials,
            passwords,
            access_token_ttl: chrono::Duration::seconds(config.access_token_ttl_secs),
            refresh_token_ttl: chrono::Duration::seconds(config.refresh_token_ttl_secs),
            admin_email: config.admin.email.clone(),
        },
    );

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    // Spawn the server with graceful shutdown
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    // Wait for shutdown signal (Ctrl+C)
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    // Signal shutdown to the notifier
    let _ = shutdown_tx.send(true);

    let shutdown_timeout = std::time::Duration::from_secs(10);
    if let Err(e) = tokio::time::timeout(shutdown_timeout, notifier_task).await {
        warn!(error = %e, "Change notifier did not shut down in time");
    }

    info!("Check-in API shutdown complete");
    Ok(())
}
