//! Live telemetry ingest
//!
//! One pipeline per monitored endpoint: a persistent transport, an offline
//! buffer for records that arrive while disconnected, and a streaming
//! aggregator producing KPI snapshots.

pub mod manager;
pub mod protocol;
pub mod registry;
pub mod state;
pub mod transport;

pub use manager::{spawn_pipeline, ConnectionConfig, PipelineError, PipelineHandle};
pub use protocol::{parse_frame, FrameError, InboundFrame, MetricsBatch};
pub use registry::{PipelineRegistry, RegistryError};
pub use state::{ConnectionSnapshot, ConnectionStatus, OfflineBuffer};
pub use transport::{
    ConnectionError, Connector, OutboundFrame, TransportEvent, TransportLink, WebSocketConnector,
};
