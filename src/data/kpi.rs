//! KPI snapshot types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rolling KPIs computed over the aggregator's trailing window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSnapshot {
    pub throughput_per_minute: f64,
    pub average_latency_ms: f64,
    pub error_rate_percent: f64,
    /// Heuristic estimate, see [`crate::aggregate::estimate_active_connections`]
    pub estimated_active_connections: u32,
    /// Number of records the snapshot was computed from
    pub records_in_window: usize,
    pub computed_at: DateTime<Utc>,
}

impl KpiSnapshot {
    /// Snapshot of an empty window
    pub fn empty(computed_at: DateTime<Utc>) -> Self {
        Self {
            throughput_per_minute: 0.0,
            average_latency_ms: 0.0,
            error_rate_percent: 0.0,
            estimated_active_connections: 0,
            records_in_window: 0,
            computed_at,
        }
    }

    /// Overlay the fields present in a server-provided partial snapshot
    pub fn merge(&mut self, partial: &PartialKpi, now: DateTime<Utc>) {
        if let Some(v) = partial.throughput_per_minute.filter(|v| v.is_finite() && *v >= 0.0) {
            self.throughput_per_minute = v;
        }
        if let Some(v) = partial.average_latency_ms.filter(|v| v.is_finite() && *v >= 0.0) {
            self.average_latency_ms = v;
        }
        if let Some(v) = partial.error_rate_percent.filter(|v| v.is_finite()) {
            self.error_rate_percent = v.clamp(0.0, 100.0);
        }
        if let Some(v) = partial.estimated_active_connections {
            self.estimated_active_connections = v;
        }
        self.computed_at = partial.computed_at.unwrap_or(now);
    }
}

impl Default for KpiSnapshot {
    fn default() -> Self {
        Self::empty(Utc::now())
    }
}

/// KPI fields pushed by the server in a `kpi` frame; any subset may be present
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialKpi {
    #[serde(default, alias = "throughput")]
    pub throughput_per_minute: Option<f64>,
    #[serde(default, alias = "averageLatency")]
    pub average_latency_ms: Option<f64>,
    #[serde(default, alias = "errorRate")]
    pub error_rate_percent: Option<f64>,
    #[serde(default, alias = "activeConnections")]
    pub estimated_active_connections: Option<u32>,
    #[serde(default)]
    pub computed_at: Option<DateTime<Utc>>,
}
