//! Active-connection estimate
//!
//! The wire protocol carries no connection counts, so the dashboard figure is a
//! heuristic: a log-scaled function of throughput mapped into a fixed range, with
//! a few units of jitter seeded from the computation time so that consecutive
//! snapshots do not render as a flat line. It is not a measurement.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Tuning for [`estimate_active_connections`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimateBounds {
    pub min: u32,
    pub max: u32,
    /// Throughput (per minute) at which the estimate reaches `max`
    pub saturation_throughput: f64,
    /// Maximum absolute jitter added before clamping
    pub jitter: u32,
}

impl Default for EstimateBounds {
    fn default() -> Self {
        Self {
            min: 1,
            max: 500,
            saturation_throughput: 10_000.0,
            jitter: 2,
        }
    }
}

/// Estimate concurrent clients from throughput.
///
/// Returns a value in `[bounds.min, bounds.max]`. For a fixed `computed_at`
/// second the result is deterministic and non-decreasing in `throughput`
/// up to the jitter amplitude.
pub fn estimate_active_connections(
    throughput_per_minute: f64,
    computed_at: DateTime<Utc>,
    bounds: &EstimateBounds,
) -> u32 {
    let (min, max) = (bounds.min.min(bounds.max), bounds.max.max(bounds.min));
    let throughput = throughput_per_minute.max(0.0);
    if !throughput.is_finite() {
        return max;
    }

    let saturation = bounds.saturation_throughput.max(1.0);
    let scale = ((1.0 + throughput).ln() / (1.0 + saturation).ln()).clamp(0.0, 1.0);
    let base = min as f64 + scale * (max - min) as f64;

    let mut rng = StdRng::seed_from_u64(computed_at.timestamp() as u64);
    let jitter = bounds.jitter as f64;
    let noise = if jitter > 0.0 {
        rng.gen_range(-jitter..=jitter)
    } else {
        0.0
    };

    (base + noise).round().clamp(min as f64, max as f64) as u32
}
