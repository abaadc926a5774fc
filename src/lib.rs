//! gqlpulse: live telemetry for a fleet of GraphQL endpoints
//!
//! Each monitored endpoint gets a pipeline that keeps a persistent transport
//! open, buffers records while offline and maintains rolling KPIs over a
//! trailing window. Alerts raised against those KPIs are fanned out to in-app,
//! email and webhook channels according to the user's notification preferences.
//!
//! # Features
//!
//! - **Resilient ingest**: fixed-interval reconnects with a bounded budget, heartbeats
//! - **Offline buffering**: bounded, ordered, replayed before any live record
//! - **Streaming KPIs**: throughput, latency, error rate, active-connection estimate
//! - **Notification dispatch**: severity filter, quiet hours, per-channel retries
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use gqlpulse::ingest::{spawn_pipeline, ConnectionConfig, WebSocketConnector};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let connector = Arc::new(WebSocketConnector::new("ws://127.0.0.1:4000/telemetry"));
//! let (pipeline, _task) = spawn_pipeline("api", connector, ConnectionConfig::default());
//! pipeline.connect().await?;
//!
//! let mut kpi = pipeline.watch_kpi();
//! while kpi.changed().await.is_ok() {
//!     let snapshot = kpi.borrow().clone();
//!     println!("{:.1} req/min, {:.1} ms avg", snapshot.throughput_per_minute, snapshot.average_latency_ms);
//! }
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod alerts;
pub mod api;
pub mod config;
pub mod data;
pub mod events;
pub mod ingest;

// Re-export commonly used types
pub use aggregate::{AggregatorConfig, StreamingAggregator};
pub use alerts::{Alert, NotificationDispatcher, NotificationPreferences, Severity};
pub use config::{ConfigError, ServiceConfig};
pub use data::{KpiSnapshot, MetricRecord, ValidationError};
pub use events::{EventBus, PipelineEvent};
pub use ingest::{ConnectionSnapshot, ConnectionStatus, PipelineHandle, PipelineRegistry};
