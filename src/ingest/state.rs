//! Connection lifecycle state

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::data::{BoundedRing, MetricRecord};

pub const DEFAULT_OFFLINE_BUFFER_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Reconnecting => "reconnecting",
        }
    }

    /// An open attempt is in flight or scheduled
    pub fn is_pending(&self) -> bool {
        matches!(self, ConnectionStatus::Connecting | ConnectionStatus::Reconnecting)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Records that arrived while the endpoint was not connected.
///
/// Oldest records are evicted first once the capacity is reached.
#[derive(Debug)]
pub struct OfflineBuffer {
    ring: BoundedRing<MetricRecord>,
}

impl OfflineBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: BoundedRing::new(capacity),
        }
    }

    pub fn push(&mut self, record: MetricRecord) {
        if let Some(evicted) = self.ring.push(record) {
            tracing::debug!(
                operation = evicted.operation_id(),
                "Offline buffer full, dropped oldest record"
            );
        }
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = MetricRecord>) {
        for record in records {
            self.push(record);
        }
    }

    /// Take every buffered record, oldest first
    pub fn drain(&mut self) -> Vec<MetricRecord> {
        self.ring.drain()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Total records ever evicted
    pub fn evicted(&self) -> u64 {
        self.ring.evicted()
    }
}

impl Default for OfflineBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_OFFLINE_BUFFER_CAPACITY)
    }
}

/// Mutable state owned by a pipeline's actor task
#[derive(Debug)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub reconnect_attempts: u32,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub exhausted: bool,
    pub malformed_frames: u64,
    pub rejected_records: u64,
    pub buffer: OfflineBuffer,
}

impl ConnectionState {
    pub fn new(buffer_capacity: usize) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            reconnect_attempts: 0,
            last_connected_at: None,
            last_error: None,
            exhausted: false,
            malformed_frames: 0,
            rejected_records: 0,
            buffer: OfflineBuffer::new(buffer_capacity),
        }
    }

    pub fn snapshot(
        &self,
        endpoint_id: &str,
        max_reconnect_attempts: u32,
        reconnect_scheduled: bool,
    ) -> ConnectionSnapshot {
        ConnectionSnapshot {
            endpoint_id: endpoint_id.to_string(),
            status: self.status,
            reconnect_attempts: self.reconnect_attempts,
            max_reconnect_attempts,
            reconnect_scheduled,
            last_connected_at: self.last_connected_at,
            last_error: self.last_error.clone(),
            exhausted: self.exhausted,
            buffered_records: self.buffer.len(),
            buffer_capacity: self.buffer.capacity(),
            buffer_evictions: self.buffer.evicted(),
            malformed_frames: self.malformed_frames,
            rejected_records: self.rejected_records,
        }
    }
}

/// Read-only view of a pipeline's connection, published after every change
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    pub endpoint_id: String,
    pub status: ConnectionStatus,
    pub reconnect_attempts: u32,
    pub max_reconnect_attempts: u32,
    /// A reconnect timer is armed
    pub reconnect_scheduled: bool,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub exhausted: bool,
    pub buffered_records: usize,
    pub buffer_capacity: usize,
    pub buffer_evictions: u64,
    pub malformed_frames: u64,
    pub rejected_records: u64,
}
