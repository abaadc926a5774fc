//! gqlpulse server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - GQLPULSE_HOST: Bind address (default: 0.0.0.0)
//! - GQLPULSE_PORT: Port number (default: 8080)
//! - GQLPULSE_ENDPOINTS: Monitored endpoints (e.g., "api=ws://10.0.0.2:4000/telemetry,edge=wss://edge.example.com/ws")
//! - RUST_LOG: Log level (default: gqlpulse=info,tower_http=info)
//!
//! See `gqlpulse::config` for the reconnect, aggregation and notification settings.

use gqlpulse::alerts::EmailTransportConfig;
use gqlpulse::api::run_server;
use gqlpulse::ServiceConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gqlpulse=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServiceConfig::from_env()?;

    tracing::info!("gqlpulse configuration:");
    tracing::info!("  Host: {}", config.bind_addr());
    tracing::info!(
        "  Reconnect: every {:?}, up to {} attempts",
        config.connection.reconnect_interval,
        config.connection.max_reconnect_attempts
    );
    tracing::info!("  Heartbeat interval: {:?}", config.connection.heartbeat_interval);
    tracing::info!(
        "  Offline buffer: {} records",
        config.connection.offline_buffer_capacity
    );
    tracing::info!("  KPI window: {:?}", config.connection.aggregator.window);
    tracing::info!(
        "  Notifications: {} retries, {:?} per attempt",
        config.dispatcher.max_retries,
        config.dispatcher.attempt_timeout
    );
    match &config.email.transport {
        EmailTransportConfig::Smtp { host, port, .. } => {
            tracing::info!("  Email: SMTP via {}:{}", host, port)
        }
        EmailTransportConfig::Outbox { path } => {
            tracing::info!("  Email: outbox at {}", path.display())
        }
        EmailTransportConfig::Disabled => tracing::info!("  Email: disabled"),
    }

    if config.endpoints.is_empty() {
        tracing::warn!("  No endpoints configured; set GQLPULSE_ENDPOINTS");
    } else {
        tracing::info!("  Endpoints: {}", config.endpoints.len());
        for endpoint in &config.endpoints {
            tracing::info!("    - {} @ {}", endpoint.id, endpoint.url);
        }
    }

    println!(
        r#"
                   _             _
   __ _  __ _ | | _ __   _   _ | | ___   ___
  / _` |/ _` || || '_ \ | | | || |/ __| / _ \
 | (_| | (_| || || |_) || |_| || |\__ \|  __/
  \__, |\__, ||_|| .__/  \__,_||_||___/ \___|
  |___/    |_|   |_|

 Live GraphQL Endpoint Telemetry
 Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );

    run_server(config).await
}
