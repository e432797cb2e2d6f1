//! TableCheck API Server
//!
//! Serves the dashboard views over HTTP.

use std::sync::Arc;
use std::time::Duration;
use tablecheck_api::{app, spawn_session_reaper, AppState, DEFAULT_SESSION_TTL};
use tablecheck_warehouse::{connector_from_config, WarehouseConfig};
use tracing_subscriber::EnvFilter;

/// Upper bound on how often idle sessions are swept
const REAP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = WarehouseConfig::from_env().unwrap_or_else(|e| {
        tracing::error!("Invalid warehouse configuration: {}", e);
        std::process::exit(1);
    });
    tracing::info!(config = ?config, "Loaded warehouse configuration");

    let connector = connector_from_config(&config).unwrap_or_else(|e| {
        tracing::error!("Failed to create warehouse connector: {}", e);
        std::process::exit(1);
    });

    let session_ttl = match std::env::var("TABLECHECK_SESSION_TTL_SECS") {
        Ok(v) => match v.parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                tracing::error!("TABLECHECK_SESSION_TTL_SECS must be a positive number: {}", v);
                std::process::exit(1);
            }
        },
        Err(_) => DEFAULT_SESSION_TTL,
    };
    tracing::info!(ttl_secs = session_ttl.as_secs(), "Session TTL configured");

    let state = AppState::new(Arc::from(connector)).with_session_ttl(session_ttl);
    spawn_session_reaper(state.clone(), session_ttl.min(REAP_INTERVAL));
    let app = app(state);

    // Get port from environment or use default
    let port = std::env::var("TABLECHECK_PORT")
        .or_else(|_| std::env::var("PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse::<u16>()
        .unwrap_or_else(|e| {
            tracing::error!("PORT must be a valid number: {}", e);
            std::process::exit(1);
        });
    let bind = std::env::var("TABLECHECK_BIND")
        .unwrap_or_else(|_| "0.0.0.0".to_string())
        .parse::<std::net::IpAddr>()
        .unwrap_or_else(|e| {
            tracing::error!("TABLECHECK_BIND must be an IP address: {}", e);
            std::process::exit(1);
        });

    let addr = std::net::SocketAddr::new(bind, port);
    tracing::info!("TableCheck API listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
