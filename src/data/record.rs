//! Validated telemetry records

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

/// Field names accepted for the operation identifier, first match wins
const OPERATION_FIELDS: &[&str] = &["operationName", "operationIdentifier", "operation"];

/// Field names accepted for the execution duration in milliseconds
const DURATION_FIELDS: &[&str] = &["executionTime", "executionDurationMs", "durationMs"];

/// One GraphQL operation execution observed on a monitored endpoint.
///
/// Only constructed through [`MetricRecord::new`] or [`MetricRecord::from_json`],
/// both of which enforce a finite, non-negative duration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecord {
    timestamp: DateTime<Utc>,
    operation_id: String,
    execution_duration_ms: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<String>,
}

impl MetricRecord {
    pub fn new(
        timestamp: DateTime<Utc>,
        operation_id: impl Into<String>,
        execution_duration_ms: f64,
        errors: Vec<String>,
    ) -> Result<Self, ValidationError> {
        let operation_id = operation_id.into();
        if operation_id.trim().is_empty() {
            return Err(ValidationError::MissingField("operationName"));
        }
        if !execution_duration_ms.is_finite() || execution_duration_ms < 0.0 {
            return Err(ValidationError::InvalidDuration(execution_duration_ms));
        }

        Ok(Self {
            timestamp,
            operation_id,
            execution_duration_ms,
            errors,
        })
    }

    /// Validate a wire object into a record
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ValidationError> {
        let obj = value.as_object().ok_or(ValidationError::NotAnObject)?;

        let timestamp = obj
            .get("timestamp")
            .ok_or(ValidationError::MissingField("timestamp"))
            .and_then(parse_timestamp)?;

        let operation_id = OPERATION_FIELDS
            .iter()
            .find_map(|key| obj.get(*key))
            .and_then(|v| v.as_str())
            .ok_or(ValidationError::MissingField("operationName"))?;

        let duration = DURATION_FIELDS
            .iter()
            .find_map(|key| obj.get(*key))
            .ok_or(ValidationError::MissingField("executionTime"))?
            .as_f64()
            .ok_or_else(|| ValidationError::InvalidField {
                field: "executionTime",
                reason: "expected a number".to_string(),
            })?;

        let errors = match obj.get("errors") {
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(serde_json::Value::Array(items)) => items.iter().map(error_text).collect(),
            Some(_) => {
                return Err(ValidationError::InvalidField {
                    field: "errors",
                    reason: "expected an array".to_string(),
                })
            }
        };

        Self::new(timestamp, operation_id, duration, errors)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn execution_duration_ms(&self) -> f64 {
        self.execution_duration_ms
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Accepts RFC 3339 strings or epoch milliseconds
fn parse_timestamp(value: &serde_json::Value) -> Result<DateTime<Utc>, ValidationError> {
    match value {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| ValidationError::InvalidTimestamp(format!("{}: {}", s, e))),
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(|| ValidationError::InvalidTimestamp(n.to_string())),
        other => Err(ValidationError::InvalidTimestamp(other.to_string())),
    }
}

/// GraphQL errors carry a `message`; anything else is kept verbatim
fn error_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Object(obj) => obj
            .get("message")
            .and_then(|m| m.as_str())
            .map(String::from)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

/// Record validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Record is not a JSON object")]
    NotAnObject,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Invalid execution duration: {0}")]
    InvalidDuration(f64),

    #[error("Unparsable timestamp: {0}")]
    InvalidTimestamp(String),
}
