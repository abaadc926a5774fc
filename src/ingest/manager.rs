//! Pipeline actor for one monitored endpoint
//!
//! The actor task exclusively owns the connection state, the offline buffer and
//! the aggregator. Everything else talks to it through a [`PipelineHandle`]:
//! commands go in over an mpsc queue, snapshots come out over `watch` channels
//! and discrete signals over the pipeline's [`EventBus`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::protocol::{self, InboundFrame, MetricsBatch};
use super::state::{
    ConnectionSnapshot, ConnectionState, ConnectionStatus, DEFAULT_OFFLINE_BUFFER_CAPACITY,
};
use super::transport::{ConnectionError, Connector, TransportEvent, TransportLink};
use crate::aggregate::{AggregatorConfig, StreamingAggregator};
use crate::data::{KpiSnapshot, MetricRecord};
use crate::events::{EventBus, PipelineEvent};

/// Connection and buffering configuration for one pipeline
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Fixed delay before each reconnect attempt
    pub reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
    pub heartbeat_interval: Duration,
    pub offline_buffer_capacity: usize,
    pub command_capacity: usize,
    pub event_capacity: usize,
    pub aggregator: AggregatorConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_secs(3),
            max_reconnect_attempts: 5,
            heartbeat_interval: Duration::from_secs(30),
            offline_buffer_capacity: DEFAULT_OFFLINE_BUFFER_CAPACITY,
            command_capacity: 64,
            event_capacity: crate::events::DEFAULT_EVENT_CAPACITY,
            aggregator: AggregatorConfig::default(),
        }
    }
}

impl ConnectionConfig {
    pub fn with_reconnect(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.reconnect_interval = interval;
        self.max_reconnect_attempts = max_attempts;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        // tokio intervals panic on a zero period
        self.heartbeat_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_offline_buffer_capacity(mut self, capacity: usize) -> Self {
        self.offline_buffer_capacity = capacity;
        self
    }

    pub fn with_aggregator(mut self, aggregator: AggregatorConfig) -> Self {
        self.aggregator = aggregator;
        self
    }
}

enum Command {
    Connect,
    Disconnect,
    Ingest(MetricsBatch),
    Records(oneshot::Sender<Vec<MetricRecord>>),
    Shutdown,
}

/// Result of a background open, tagged with the attempt it belongs to
struct Opened {
    generation: u64,
    result: Result<TransportLink, ConnectionError>,
}

/// Cloneable handle to a running pipeline
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    endpoint_id: Arc<str>,
    commands: mpsc::Sender<Command>,
    kpi: watch::Receiver<KpiSnapshot>,
    connection: watch::Receiver<ConnectionSnapshot>,
    events: EventBus,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::Connect => "Connect",
            Command::Disconnect => "Disconnect",
            Command::Ingest(_) => "Ingest",
            Command::Records(_) => "Records",
            Command::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}

impl PipelineHandle {
    pub fn endpoint_id(&self) -> &str {
        &self.endpoint_id
    }

    /// Open the transport. No-op while connected or connecting.
    pub async fn connect(&self) -> Result<(), PipelineError> {
        self.send(Command::Connect).await
    }

    /// Close the transport and cancel every timer; stays down until [`connect`](Self::connect)
    pub async fn disconnect(&self) -> Result<(), PipelineError> {
        self.send(Command::Disconnect).await
    }

    /// Feed locally produced records through the same path as wire records
    pub async fn ingest(&self, batch: MetricsBatch) -> Result<(), PipelineError> {
        self.send(Command::Ingest(batch)).await
    }

    /// Disconnect and stop the actor task
    pub async fn shutdown(&self) -> Result<(), PipelineError> {
        self.send(Command::Shutdown).await
    }

    /// Copy of the aggregator's working set, oldest first
    pub async fn records(&self) -> Result<Vec<MetricRecord>, PipelineError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Records(tx)).await?;
        rx.await.map_err(|_| PipelineError::Stopped(self.endpoint_id.to_string()))
    }

    pub fn kpi(&self) -> KpiSnapshot {
        self.kpi.borrow().clone()
    }

    pub fn connection(&self) -> ConnectionSnapshot {
        self.connection.borrow().clone()
    }

    pub fn watch_kpi(&self) -> watch::Receiver<KpiSnapshot> {
        self.kpi.clone()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.connection.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// The actor task has exited
    pub fn is_stopped(&self) -> bool {
        self.commands.is_closed()
    }

    async fn send(&self, command: Command) -> Result<(), PipelineError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| PipelineError::Stopped(self.endpoint_id.to_string()))
    }
}

/// Start a pipeline task for `endpoint_id`. The pipeline starts disconnected.
pub fn spawn_pipeline(
    endpoint_id: impl Into<String>,
    connector: Arc<dyn Connector>,
    config: ConnectionConfig,
) -> (PipelineHandle, JoinHandle<()>) {
    let endpoint_id: Arc<str> = Arc::from(endpoint_id.into());
    let state = ConnectionState::new(config.offline_buffer_capacity);
    let aggregator = StreamingAggregator::new(config.aggregator.clone());

    let (command_tx, command_rx) = mpsc::channel(config.command_capacity.max(1));
    let (opened_tx, opened_rx) = mpsc::channel(4);
    let (kpi_tx, kpi_rx) = watch::channel(aggregator.snapshot().clone());
    let (connection_tx, connection_rx) = watch::channel(state.snapshot(
        &endpoint_id,
        config.max_reconnect_attempts,
        false,
    ));
    let events = EventBus::new(config.event_capacity);

    let actor = PipelineActor {
        endpoint_id: Arc::clone(&endpoint_id),
        config,
        connector,
        state,
        aggregator,
        link: None,
        generation: 0,
        reconnect_at: None,
        opened_tx,
        kpi_tx,
        connection_tx,
        events: events.clone(),
    };
    let task = tokio::spawn(actor.run(command_rx, opened_rx));

    let handle = PipelineHandle {
        endpoint_id,
        commands: command_tx,
        kpi: kpi_rx,
        connection: connection_rx,
        events,
    };
    (handle, task)
}

struct PipelineActor {
    endpoint_id: Arc<str>,
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    state: ConnectionState,
    aggregator: StreamingAggregator,
    link: Option<TransportLink>,
    /// Bumped on every open and every disconnect; stale opens are discarded
    generation: u64,
    reconnect_at: Option<Instant>,
    opened_tx: mpsc::Sender<Opened>,
    kpi_tx: watch::Sender<KpiSnapshot>,
    connection_tx: watch::Sender<ConnectionSnapshot>,
    events: EventBus,
}

impl PipelineActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut opened: mpsc::Receiver<Opened>,
    ) {
        tracing::info!(
            endpoint_id = %self.endpoint_id,
            url = self.connector.target(),
            "Pipeline started"
        );

        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let connected = self.state.status == ConnectionStatus::Connected;
            let reconnect_at = self.reconnect_at;

            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Connect) => self.connect(),
                    Some(Command::Disconnect) => self.disconnect(),
                    Some(Command::Ingest(batch)) => self.ingest(batch),
                    Some(Command::Records(reply)) => {
                        let _ = reply.send(self.aggregator.records().cloned().collect());
                    }
                    Some(Command::Shutdown) | None => {
                        self.disconnect();
                        break;
                    }
                },
                Some(result) = opened.recv() => self.on_opened(result, &mut heartbeat),
                event = recv_link(&mut self.link) => self.on_transport_event(event),
                _ = sleep_until(reconnect_at), if reconnect_at.is_some() => self.on_reconnect_timer(),
                _ = heartbeat.tick(), if connected => self.send_heartbeat(),
            }
        }

        tracing::info!(endpoint_id = %self.endpoint_id, "Pipeline stopped");
    }

    fn connect(&mut self) {
        if matches!(
            self.state.status,
            ConnectionStatus::Connected | ConnectionStatus::Connecting
        ) {
            tracing::debug!(
                endpoint_id = %self.endpoint_id,
                status = %self.state.status,
                "Connect ignored"
            );
            return;
        }

        // Manual connect always starts a fresh reconnect budget
        self.reconnect_at = None;
        self.state.reconnect_attempts = 0;
        self.state.exhausted = false;
        self.set_status(ConnectionStatus::Connecting);
        self.start_open();
    }

    fn disconnect(&mut self) {
        self.reconnect_at = None;
        self.generation += 1;
        if let Some(link) = self.link.take() {
            link.close();
        }
        if self.state.status != ConnectionStatus::Disconnected {
            tracing::info!(endpoint_id = %self.endpoint_id, "Disconnected");
            self.set_status(ConnectionStatus::Disconnected);
        } else {
            self.publish_connection();
        }
    }

    fn start_open(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        let connector = Arc::clone(&self.connector);
        let opened_tx = self.opened_tx.clone();

        tokio::spawn(async move {
            let result = connector.open().await;
            let _ = opened_tx.send(Opened { generation, result }).await;
        });
    }

    fn on_opened(&mut self, opened: Opened, heartbeat: &mut Interval) {
        if opened.generation != self.generation || !self.state.status.is_pending() {
            // Superseded by a disconnect or a newer attempt; dropping the link closes it
            return;
        }

        match opened.result {
            Ok(link) => {
                self.link = Some(link);
                self.state.reconnect_attempts = 0;
                self.state.last_connected_at = Some(Utc::now());
                self.state.last_error = None;
                heartbeat.reset();
                tracing::info!(
                    endpoint_id = %self.endpoint_id,
                    url = self.connector.target(),
                    "Connected"
                );
                self.set_status(ConnectionStatus::Connected);
                self.replay_offline_buffer();
            }
            Err(e) => {
                tracing::warn!(endpoint_id = %self.endpoint_id, error = %e, "Open failed");
                self.on_connection_lost(e);
            }
        }
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Frame(text) => self.on_frame(&text),
            other => {
                let error = ConnectionError::from(other);
                tracing::warn!(endpoint_id = %self.endpoint_id, error = %error, "Connection lost");
                self.on_connection_lost(error);
            }
        }
    }

    /// Unexpected close, link error or failed open
    fn on_connection_lost(&mut self, error: ConnectionError) {
        self.link = None;
        self.state.last_error = Some(error.to_string());
        self.set_status(ConnectionStatus::Disconnected);
        self.events.publish(PipelineEvent::ConnectionLost {
            endpoint_id: self.endpoint_id.to_string(),
            reason: error.to_string(),
        });

        if self.state.reconnect_attempts < self.config.max_reconnect_attempts {
            self.reconnect_at = Some(Instant::now() + self.config.reconnect_interval);
            tracing::info!(
                endpoint_id = %self.endpoint_id,
                attempt = self.state.reconnect_attempts + 1,
                max_attempts = self.config.max_reconnect_attempts,
                delay_ms = self.config.reconnect_interval.as_millis() as u64,
                "Scheduling reconnect"
            );
            self.set_status(ConnectionStatus::Reconnecting);
        } else {
            let exhausted = ConnectionError::Exhausted(self.state.reconnect_attempts);
            tracing::error!(endpoint_id = %self.endpoint_id, error = %exhausted, "Giving up");
            self.state.exhausted = true;
            self.state.last_error = Some(exhausted.to_string());
            self.publish_connection();
            self.events.publish(PipelineEvent::ConnectionExhausted {
                endpoint_id: self.endpoint_id.to_string(),
                attempts: self.state.reconnect_attempts,
            });
        }
    }

    fn on_reconnect_timer(&mut self) {
        self.reconnect_at = None;
        self.state.reconnect_attempts += 1;
        tracing::debug!(
            endpoint_id = %self.endpoint_id,
            attempt = self.state.reconnect_attempts,
            "Reconnecting"
        );
        self.publish_connection();
        self.start_open();
    }

    fn send_heartbeat(&mut self) {
        if let Some(link) = &self.link {
            if !link.send_text(protocol::heartbeat_frame()) {
                tracing::debug!(endpoint_id = %self.endpoint_id, "Heartbeat not queued");
            }
        }
    }

    fn on_frame(&mut self, text: &str) {
        match protocol::parse_frame(text) {
            Ok(InboundFrame::Metrics(batch)) => self.ingest(batch),
            Ok(InboundFrame::Kpi(partial)) => {
                let kpi = self.aggregator.apply_remote(&partial, Utc::now()).clone();
                self.publish_kpi(kpi);
            }
            Ok(InboundFrame::Heartbeat) => {
                tracing::trace!(endpoint_id = %self.endpoint_id, "Heartbeat received");
            }
            Ok(InboundFrame::Unknown(kind)) => {
                tracing::debug!(endpoint_id = %self.endpoint_id, kind = %kind, "Ignoring frame");
            }
            Err(e) => {
                self.state.malformed_frames += 1;
                tracing::warn!(
                    endpoint_id = %self.endpoint_id,
                    error = %e,
                    total = self.state.malformed_frames,
                    "Dropping malformed frame"
                );
                self.publish_connection();
            }
        }
    }

    fn ingest(&mut self, batch: MetricsBatch) {
        let MetricsBatch { records, rejected } = batch;

        if let Some(first) = rejected.first() {
            self.state.rejected_records += rejected.len() as u64;
            tracing::warn!(
                endpoint_id = %self.endpoint_id,
                rejected = rejected.len(),
                error = %first,
                "Rejected invalid records"
            );
            self.events.publish(PipelineEvent::RecordsRejected {
                endpoint_id: self.endpoint_id.to_string(),
                rejected: rejected.len(),
                first_error: first.to_string(),
            });
        }

        if self.state.status == ConnectionStatus::Connected {
            self.apply(records);
        } else if !records.is_empty() {
            self.state.buffer.extend(records);
            tracing::debug!(
                endpoint_id = %self.endpoint_id,
                buffered = self.state.buffer.len(),
                "Buffered records while offline"
            );
        }
        self.publish_connection();
    }

    /// Drain the offline buffer into the aggregator before any live record
    fn replay_offline_buffer(&mut self) {
        if self.state.buffer.is_empty() {
            return;
        }
        let records = self.state.buffer.drain();
        tracing::info!(
            endpoint_id = %self.endpoint_id,
            records = records.len(),
            "Replaying offline buffer"
        );
        self.apply(records);
        self.publish_connection();
    }

    fn apply(&mut self, records: Vec<MetricRecord>) {
        let accepted = records.len();
        let kpi = self.aggregator.insert_batch(records, Utc::now()).clone();

        self.events.publish(PipelineEvent::DataUpdate {
            endpoint_id: self.endpoint_id.to_string(),
            accepted,
            window_size: self.aggregator.len(),
        });
        self.publish_kpi(kpi);
    }

    fn publish_kpi(&self, kpi: KpiSnapshot) {
        self.kpi_tx.send_replace(kpi.clone());
        self.events.publish(PipelineEvent::KpiUpdate {
            endpoint_id: self.endpoint_id.to_string(),
            kpi,
        });
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        let changed = self.state.status != status;
        self.state.status = status;
        self.publish_connection();
        if changed {
            self.events.publish(PipelineEvent::StatusChange {
                endpoint_id: self.endpoint_id.to_string(),
                status,
            });
        }
    }

    fn publish_connection(&self) {
        self.connection_tx.send_replace(self.state.snapshot(
            &self.endpoint_id,
            self.config.max_reconnect_attempts,
            self.reconnect_at.is_some(),
        ));
    }
}

async fn recv_link(link: &mut Option<TransportLink>) -> TransportEvent {
    match link {
        Some(link) => link.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error("Pipeline '{0}' is not running")]
    Stopped(String),
}
