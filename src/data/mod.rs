pub mod kpi;
pub mod record;
pub mod ring;

pub use kpi::{KpiSnapshot, PartialKpi};
pub use record::{MetricRecord, ValidationError};
pub use ring::BoundedRing;
