//! Alert types produced by the evaluator

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert severity, ordered from least to most urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of an alert; the only mutable part of an [`Alert`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    #[default]
    Active,
    Acknowledged,
    Resolved,
}

/// A triggered alert rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub rule_id: String,
    pub endpoint_id: String,
    pub severity: Severity,
    pub message: String,
    pub triggered_at: DateTime<Utc>,
    /// Metric values that tripped the rule, keyed by metric name
    #[serde(default)]
    pub metric_values: HashMap<String, f64>,
    #[serde(default)]
    pub status: AlertStatus,
}

impl Alert {
    /// Create an active alert triggered now
    pub fn new(
        id: impl Into<String>,
        rule_id: impl Into<String>,
        endpoint_id: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            rule_id: rule_id.into(),
            endpoint_id: endpoint_id.into(),
            severity,
            message: message.into(),
            triggered_at: Utc::now(),
            metric_values: HashMap::new(),
            status: AlertStatus::Active,
        }
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metric_values.insert(name.into(), value);
        self
    }

    pub fn with_triggered_at(mut self, triggered_at: DateTime<Utc>) -> Self {
        self.triggered_at = triggered_at;
        self
    }

    pub fn set_status(&mut self, status: AlertStatus) {
        self.status = status;
    }

    /// One-line human summary used by email subjects and logs
    pub fn summary(&self) -> String {
        format!(
            "[{}] {} on {}",
            self.severity.as_str().to_uppercase(),
            self.message,
            self.endpoint_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Low < Severity::Medium);
        assert_eq!(Severity::ALL.len(), 4);
    }

    #[test]
    fn test_alert_deserializes_with_defaults() {
        let json = r#"{
            "id": "a-1",
            "ruleId": "latency",
            "endpointId": "api",
            "severity": "high",
            "message": "p95 latency above 500ms",
            "triggeredAt": "2024-03-01T12:00:00Z"
        }"#;
        let alert: Alert = serde_json::from_str(json).unwrap();
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.status, AlertStatus::Active);
        assert!(alert.metric_values.is_empty());
    }

    #[test]
    fn test_summary() {
        let alert = Alert::new("a", "r", "billing", Severity::Critical, "errors spiking")
            .with_metric("errorRate", 42.0);
        assert_eq!(alert.summary(), "[CRITICAL] errors spiking on billing");
        assert_eq!(alert.metric_values["errorRate"], 42.0);
    }
}
