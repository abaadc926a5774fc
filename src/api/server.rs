use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    clear_notification_history, connect_endpoint, disconnect_endpoint, endpoint_connection,
    endpoint_events, endpoint_kpi, endpoint_records, get_preferences, health_check, ingest,
    list_endpoints, notification_events, notification_history, submit_alert, update_preferences,
    AppState,
};
use crate::alerts::NotificationDispatcher;
use crate::config::ServiceConfig;
use crate::events::EventBus;
use crate::ingest::{PipelineRegistry, WebSocketConnector};

/// Alerts waiting for the dispatcher loop
const ALERT_QUEUE_CAPACITY: usize = 256;

/// How long shutdown waits for queued and in-flight notifications
const DISPATCHER_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Monitored endpoints
        .route("/endpoints", get(list_endpoints))
        .route("/endpoints/:id/connection", get(endpoint_connection))
        .route("/endpoints/:id/kpi", get(endpoint_kpi))
        .route("/endpoints/:id/records", get(endpoint_records))
        .route("/endpoints/:id/connect", post(connect_endpoint))
        .route("/endpoints/:id/disconnect", post(disconnect_endpoint))
        .route("/endpoints/:id/ingest", post(ingest))
        .route("/endpoints/:id/events", get(endpoint_events))
        // Alerts and notifications
        .route("/alerts", post(submit_alert))
        .route(
            "/notifications/history",
            get(notification_history).delete(clear_notification_history),
        )
        .route(
            "/notifications/preferences",
            get(get_preferences).put(update_preferences),
        )
        .route("/notifications/events", get(notification_events))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Start every configured pipeline and the dispatcher, then serve HTTP until ctrl-c
pub async fn run_server(config: ServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    // Pipelines
    let pipelines = Arc::new(PipelineRegistry::new());
    for endpoint in &config.endpoints {
        let connector = Arc::new(WebSocketConnector::new(endpoint.url.clone()));
        let handle = pipelines.spawn(&endpoint.id, connector, config.connection.clone())?;
        if config.auto_connect {
            handle.connect().await?;
        }
    }

    // Dispatcher
    let dispatcher = Arc::new(NotificationDispatcher::with_standard_channels(
        config.dispatcher.clone(),
        &config.email,
        config.in_app_permission,
        EventBus::default(),
    )?);
    let (alert_tx, alert_rx) = mpsc::channel(ALERT_QUEUE_CAPACITY);
    let dispatcher_handle = Arc::clone(&dispatcher).run(alert_rx);

    let state = Arc::new(AppState {
        pipelines: Arc::clone(&pipelines),
        dispatcher,
        alert_queue: alert_tx,
    });

    // Build router
    let app = build_router(state);

    // Start server
    let addr: SocketAddr = config.bind_addr().parse()?;
    tracing::info!("Starting gqlpulse server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router, and with it the last alert sender, is gone once serve returns
    pipelines.shutdown_all().await;
    drain_dispatcher(dispatcher_handle, DISPATCHER_DRAIN_TIMEOUT).await;

    tracing::info!("gqlpulse server stopped");
    Ok(())
}

/// Wait for the dispatcher loop to finish the alerts already queued
async fn drain_dispatcher(handle: tokio::task::JoinHandle<()>, grace: Duration) {
    match tokio::time::timeout(grace, handle).await {
        Ok(Ok(())) => tracing::info!("Notification queue drained"),
        Ok(Err(e)) => tracing::error!(error = %e, "Notification dispatcher task failed"),
        Err(_) => tracing::warn!(
            grace = ?grace,
            "Notification queue not drained before shutdown deadline"
        ),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping pipelines...");
}
