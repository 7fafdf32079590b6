//! Client Sync Server
//!
//! Serves incremental state deltas to clients over HTTP. Sessions are kept
//! in the configured backend, so several server processes pointed at the
//! same SQLite database serve the same sessions.
//!
//! # Configuration
//!
//! Environment variables:
//! - `CLIENT_SYNC_PORT`: Port to listen on (default: 8080)
//! - `CLIENT_SYNC_BACKEND`: `sqlite` or `memory` (default: sqlite)
//! - `CLIENT_SYNC_DATABASE_PATH`: SQLite database (default: ~/.local/share/client-sync/sessions.db)
//! - `CLIENT_SYNC_SESSION_TTL`: Session lifetime in seconds, 0 for none (default: 86400)
//! - `CLIENT_SYNC_KEY_PREFIX`: Storage key namespace (default: clientsync)
//! - `CLIENT_SYNC_CONFIG`: Path to config file (default: ~/.config/client-sync/config.yaml)
//!
//! # Config File Format
//!
//! ```yaml
//! port: 8080
//! backend: sqlite
//! database_path: /var/lib/client-sync/sessions.db
//! session_ttl_secs: 86400
//! key_prefix: photomanager
//! max_commit_retries: 8
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use client_sync::config::Config;
use client_sync::server::{open_backend, router};
use client_sync::state::Schema;
use client_sync::sync::SessionHub;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often expired sessions are swept.
const PURGE_INTERVAL: Duration = Duration::from_secs(60 * 10);

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "client_sync=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(None)?;

    let backend = open_backend(&config).await?;
    let hub = SessionHub::from_config(backend, Schema::default(), &config);

    if config.session_ttl().is_some() {
        let hub = hub.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PURGE_INTERVAL);
            loop {
                interval.tick().await;
                if let Err(e) = hub.purge_expired().await {
                    tracing::warn!("Failed to purge expired sessions: {}", e);
                }
            }
        });
    }

    let app = router(hub).layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
