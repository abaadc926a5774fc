//! Windowed KPI aggregation over validated telemetry records

pub mod estimate;
pub mod window;

pub use estimate::{estimate_active_connections, EstimateBounds};
pub use window::{AggregatorConfig, StreamingAggregator};
