//! Telemetry wire protocol
//!
//! Every frame is a JSON object tagged by `type`:
//! ```json
//! {"type": "metrics", "metrics": [{"timestamp": "2024-03-01T12:00:00Z", "operationName": "GetUser", "executionTime": 42}]}
//! {"type": "kpi", "kpi": {"throughputPerMinute": 120.0}}
//! {"type": "heartbeat"}
//! ```
//! Unknown types parse successfully as [`InboundFrame::Unknown`] so that newer
//! servers do not break older clients.

use crate::data::{MetricRecord, PartialKpi, ValidationError};

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Metrics(MetricsBatch),
    Kpi(PartialKpi),
    Heartbeat,
    Unknown(String),
}

/// Result of validating an array of wire records one by one
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsBatch {
    /// Valid records, in the order received
    pub records: Vec<MetricRecord>,
    pub rejected: Vec<ValidationError>,
}

impl MetricsBatch {
    /// Validate every item; invalid ones never affect their siblings
    pub fn validate(items: &[serde_json::Value]) -> Self {
        let mut batch = Self::default();
        for item in items {
            match MetricRecord::from_json(item) {
                Ok(record) => batch.records.push(record),
                Err(e) => batch.rejected.push(e),
            }
        }
        batch
    }

    pub fn from_records(records: Vec<MetricRecord>) -> Self {
        Self {
            records,
            rejected: Vec::new(),
        }
    }
}

/// Decode one text frame
pub fn parse_frame(text: &str) -> Result<InboundFrame, FrameError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| FrameError::Json(e.to_string()))?;

    let obj = value.as_object().ok_or(FrameError::NotAnObject)?;
    let kind = obj
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(FrameError::MissingType)?;

    match kind {
        "metrics" => {
            let items = obj
                .get("metrics")
                .and_then(|m| m.as_array())
                .ok_or_else(|| FrameError::InvalidPayload {
                    kind: "metrics",
                    reason: "missing 'metrics' array".to_string(),
                })?;
            Ok(InboundFrame::Metrics(MetricsBatch::validate(items)))
        }
        "kpi" => {
            let kpi = obj.get("kpi").cloned().ok_or_else(|| FrameError::InvalidPayload {
                kind: "kpi",
                reason: "missing 'kpi' object".to_string(),
            })?;
            let partial = serde_json::from_value(kpi).map_err(|e| FrameError::InvalidPayload {
                kind: "kpi",
                reason: e.to_string(),
            })?;
            Ok(InboundFrame::Kpi(partial))
        }
        "heartbeat" => Ok(InboundFrame::Heartbeat),
        other => Ok(InboundFrame::Unknown(other.to_string())),
    }
}

/// Outbound keep-alive frame
pub fn heartbeat_frame() -> String {
    serde_json::json!({
        "type": "heartbeat",
        "timestamp": chrono::Utc::now().timestamp_millis(),
    })
    .to_string()
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("Invalid JSON: {0}")]
    Json(String),

    #[error("Frame is not a JSON object")]
    NotAnObject,

    #[error("Frame has no 'type' field")]
    MissingType,

    #[error("Invalid {kind} frame: {reason}")]
    InvalidPayload { kind: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metrics_frame_isolates_bad_records() {
        let text = r#"{
            "type": "metrics",
            "metrics": [
                {"timestamp": 1709294400000, "operationName": "A", "executionTime": 10},
                {"timestamp": 1709294400001, "operationName": "B", "executionTime": -1},
                {"operationName": "C", "executionTime": 5},
                {"timestamp": 1709294400002, "operationName": "D", "executionTime": 30}
            ]
        }"#;

        match parse_frame(text).unwrap() {
            InboundFrame::Metrics(batch) => {
                let ops: Vec<&str> = batch.records.iter().map(|r| r.operation_id()).collect();
                assert_eq!(ops, vec!["A", "D"]);
                assert_eq!(batch.rejected.len(), 2);
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_parse_kpi_frame() {
        let frame = parse_frame(r#"{"type": "kpi", "kpi": {"throughputPerMinute": 12.5}}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Kpi(PartialKpi {
                throughput_per_minute: Some(12.5),
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_parse_heartbeat_and_unknown() {
        assert_eq!(parse_frame(r#"{"type": "heartbeat"}"#).unwrap(), InboundFrame::Heartbeat);
        assert_eq!(
            parse_frame(r#"{"type": "schema-change", "x": 1}"#).unwrap(),
            InboundFrame::Unknown("schema-change".to_string())
        );
    }

    #[test]
    fn test_malformed_frames() {
        assert!(matches!(parse_frame("{not json"), Err(FrameError::Json(_))));
        assert_eq!(parse_frame("[1]"), Err(FrameError::NotAnObject));
        assert_eq!(parse_frame(r#"{"metrics": []}"#), Err(FrameError::MissingType));
        assert!(matches!(
            parse_frame(r#"{"type": "metrics", "metrics": 3}"#),
            Err(FrameError::InvalidPayload { kind: "metrics", .. })
        ));
        assert!(matches!(
            parse_frame(r#"{"type": "kpi", "kpi": {"errorRate": "high"}}"#),
            Err(FrameError::InvalidPayload { kind: "kpi", .. })
        ));
    }

    #[test]
    fn test_heartbeat_frame_shape() {
        let value: serde_json::Value = serde_json::from_str(&heartbeat_frame()).unwrap();
        assert_eq!(value["type"], "heartbeat");
    }
}
