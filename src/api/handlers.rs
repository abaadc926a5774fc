use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamExt;

use crate::alerts::{
    Alert, AlertStatus, DispatchReport, NotificationDispatcher, NotificationPreferences,
    NotificationRecord, PreferencesError, PreferencesUpdate, Severity,
};
use crate::data::{KpiSnapshot, MetricRecord};
use crate::events::PipelineEvent;
use crate::ingest::{ConnectionSnapshot, MetricsBatch, PipelineError, PipelineHandle, PipelineRegistry};

/// Application state shared across handlers
pub struct AppState {
    pub pipelines: Arc<PipelineRegistry>,
    pub dispatcher: Arc<NotificationDispatcher>,
    /// Queue drained by the dispatcher's background loop
    pub alert_queue: mpsc::Sender<Alert>,
}

impl AppState {
    fn pipeline(&self, endpoint_id: &str) -> Result<PipelineHandle, ApiError> {
        self.pipelines
            .get(endpoint_id)
            .ok_or_else(|| ApiError::NotFound(format!("Endpoint '{}' not found", endpoint_id)))
    }
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub endpoints: usize,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        endpoints: state.pipelines.len(),
    })
}

// ============================================================================
// Endpoints
// ============================================================================

pub async fn list_endpoints(State(state): State<Arc<AppState>>) -> Json<Vec<ConnectionSnapshot>> {
    Json(state.pipelines.snapshots())
}

pub async fn endpoint_connection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ConnectionSnapshot>, ApiError> {
    Ok(Json(state.pipeline(&id)?.connection()))
}

pub async fn endpoint_kpi(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<KpiSnapshot>, ApiError> {
    Ok(Json(state.pipeline(&id)?.kpi()))
}

pub async fn endpoint_records(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<MetricRecord>>, ApiError> {
    let records = state.pipeline(&id)?.records().await?;
    Ok(Json(records))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub endpoint_id: String,
    pub command: &'static str,
}

pub async fn connect_endpoint(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    state.pipeline(&id)?.connect().await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(CommandResponse {
            endpoint_id: id,
            command: "connect",
        }),
    ))
}

pub async fn disconnect_endpoint(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    state.pipeline(&id)?.disconnect().await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(CommandResponse {
            endpoint_id: id,
            command: "disconnect",
        }),
    ))
}

pub async fn endpoint_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    Ok(event_stream(state.pipeline(&id)?.subscribe()))
}

// ============================================================================
// Ingest
// ============================================================================

#[derive(Deserialize)]
pub struct IngestRequest {
    pub metrics: Vec<serde_json::Value>,
}

#[derive(Serialize)]
pub struct IngestResponse {
    pub accepted: usize,
    pub rejected: usize,
    pub errors: Vec<String>,
}

pub async fn ingest(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    let pipeline = state.pipeline(&id)?;
    let batch = MetricsBatch::validate(&request.metrics);

    let response = IngestResponse {
        accepted: batch.records.len(),
        rejected: batch.rejected.len(),
        errors: batch.rejected.iter().map(|e| e.to_string()).collect(),
    };
    pipeline.ingest(batch).await?;

    Ok(Json(response))
}

// ============================================================================
// Alerts
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRequest {
    pub id: String,
    pub rule_id: String,
    pub endpoint_id: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub triggered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metric_values: HashMap<String, f64>,
    #[serde(default)]
    pub status: AlertStatus,
}

impl From<AlertRequest> for Alert {
    fn from(request: AlertRequest) -> Self {
        let mut alert = Alert::new(
            request.id,
            request.rule_id,
            request.endpoint_id,
            request.severity,
            request.message,
        );
        if let Some(triggered_at) = request.triggered_at {
            alert = alert.with_triggered_at(triggered_at);
        }
        alert.metric_values = request.metric_values;
        alert.set_status(request.status);
        alert
    }
}

#[derive(Deserialize, Default)]
pub struct SubmitParams {
    /// Hand the alert to the background loop instead of waiting for delivery
    #[serde(default)]
    pub queue: bool,
}

pub async fn submit_alert(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SubmitParams>,
    Json(request): Json<AlertRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let alert = Alert::from(request);

    if params.queue {
        let (alert_id, rule_id) = (alert.id.clone(), alert.rule_id.clone());
        state
            .alert_queue
            .send(alert)
            .await
            .map_err(|_| ApiError::Unavailable("Alert queue is closed".to_string()))?;
        let body = serde_json::json!({ "alertId": alert_id, "ruleId": rule_id, "queued": true });
        return Ok((StatusCode::ACCEPTED, Json(body)).into_response());
    }

    let report: DispatchReport = state.dispatcher.submit(&alert).await;
    Ok((StatusCode::OK, Json(report)).into_response())
}

// ============================================================================
// Notifications
// ============================================================================

pub async fn notification_history(
    State(state): State<Arc<AppState>>,
) -> Json<Vec<NotificationRecord>> {
    Json(state.dispatcher.history())
}

pub async fn clear_notification_history(State(state): State<Arc<AppState>>) -> StatusCode {
    state.dispatcher.clear_history();
    StatusCode::NO_CONTENT
}

pub async fn get_preferences(State(state): State<Arc<AppState>>) -> Json<NotificationPreferences> {
    Json(state.dispatcher.preferences())
}

pub async fn update_preferences(
    State(state): State<Arc<AppState>>,
    Json(update): Json<PreferencesUpdate>,
) -> Result<Json<NotificationPreferences>, ApiError> {
    let preferences = state.dispatcher.update_preferences(update)?;
    tracing::info!("Notification preferences updated");
    Ok(Json(preferences))
}

pub async fn notification_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    event_stream(state.dispatcher.events().subscribe())
}

/// Server-sent events named after each signal, with its JSON body as data
fn event_stream(
    rx: broadcast::Receiver<PipelineEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(rx).filter_map(|item| match item {
        Ok(event) => match Event::default().event(event.name()).json_data(&event) {
            Ok(sse) => Some(Ok(sse)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode event");
                None
            }
        },
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::debug!(skipped, "Event subscriber lagged");
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unavailable(String),
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        ApiError::Unavailable(e.to_string())
    }
}

impl From<PreferencesError> for ApiError {
    fn from(e: PreferencesError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
