//! Discrete signals published to the presentation layer

use serde::Serialize;
use tokio::sync::broadcast;

use crate::alerts::{Alert, NotificationRecord};
use crate::data::KpiSnapshot;
use crate::ingest::ConnectionStatus;

/// Default number of undelivered events a slow subscriber may lag behind
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Signal emitted by a pipeline or by the notification dispatcher
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum PipelineEvent {
    StatusChange {
        endpoint_id: String,
        status: ConnectionStatus,
    },
    KpiUpdate {
        endpoint_id: String,
        kpi: KpiSnapshot,
    },
    DataUpdate {
        endpoint_id: String,
        accepted: usize,
        window_size: usize,
    },
    RecordsRejected {
        endpoint_id: String,
        rejected: usize,
        first_error: String,
    },
    ConnectionLost {
        endpoint_id: String,
        reason: String,
    },
    ConnectionExhausted {
        endpoint_id: String,
        attempts: u32,
    },
    NotificationSent {
        record: NotificationRecord,
    },
    NotificationFailed {
        record: NotificationRecord,
    },
    InAppNotification {
        alert: Alert,
    },
}

impl PipelineEvent {
    /// Event name as used on the SSE stream
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::StatusChange { .. } => "status-change",
            PipelineEvent::KpiUpdate { .. } => "kpi-update",
            PipelineEvent::DataUpdate { .. } => "data-update",
            PipelineEvent::RecordsRejected { .. } => "records-rejected",
            PipelineEvent::ConnectionLost { .. } => "connection-lost",
            PipelineEvent::ConnectionExhausted { .. } => "connection-exhausted",
            PipelineEvent::NotificationSent { .. } => "notification-sent",
            PipelineEvent::NotificationFailed { .. } => "notification-failed",
            PipelineEvent::InAppNotification { .. } => "in-app-notification",
        }
    }
}

/// Broadcast fan-out; publishing never blocks and never fails the publisher
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: PipelineEvent) {
        // No subscribers is the normal headless case
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
