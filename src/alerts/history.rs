//! Bounded record of notification outcomes

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::BoundedRing;

/// Default number of outcomes retained
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Delivery channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelKind {
    InApp,
    Email,
    Webhook,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::InApp => "in-app",
            ChannelKind::Email => "email",
            ChannelKind::Webhook => "webhook",
        }
    }

    /// Channels that go over the network and get a retry budget
    pub fn is_networked(&self) -> bool {
        !matches!(self, ChannelKind::InApp)
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final outcome of delivering one alert on one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub alert_id: String,
    pub channel: ChannelKind,
    pub success: bool,
    pub sent_at: DateTime<Utc>,
    /// Tries made, including the final one
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Append-only outcome log, oldest evicted first
#[derive(Debug, Clone)]
pub struct NotificationHistory {
    entries: BoundedRing<NotificationRecord>,
}

impl NotificationHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: BoundedRing::new(capacity),
        }
    }

    pub fn record(&mut self, record: NotificationRecord) {
        if let Some(evicted) = self.entries.push(record) {
            tracing::trace!(
                alert_id = %evicted.alert_id,
                channel = %evicted.channel,
                "Evicted oldest notification record"
            );
        }
    }

    /// Entries oldest first
    pub fn entries(&self) -> Vec<NotificationRecord> {
        self.entries.to_vec()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }
}

impl Default for NotificationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
