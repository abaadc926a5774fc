//! Trailing-window KPI computation over a bounded working set

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::estimate::{estimate_active_connections, EstimateBounds};
use crate::data::{KpiSnapshot, MetricRecord, PartialKpi};

/// Shortest window the throughput denominator may use
const MIN_WINDOW_SECS: f64 = 1.0;

/// Aggregator configuration
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Trailing window used for every KPI
    pub window: Duration,
    /// Working-set size that triggers a trim
    pub capacity: usize,
    /// Working-set size after a trim
    pub trim_to: usize,
    pub estimate: EstimateBounds,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            capacity: 1000,
            trim_to: 500,
            estimate: EstimateBounds::default(),
        }
    }
}

impl AggregatorConfig {
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_capacity(mut self, capacity: usize, trim_to: usize) -> Self {
        self.capacity = capacity.max(1);
        self.trim_to = trim_to.min(self.capacity);
        self
    }
}

/// Bounded working set of accepted records with a KPI snapshot recomputed per batch
#[derive(Debug)]
pub struct StreamingAggregator {
    config: AggregatorConfig,
    /// Arrival order, oldest first
    records: VecDeque<MetricRecord>,
    snapshot: KpiSnapshot,
    total_accepted: u64,
}

impl StreamingAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            records: VecDeque::with_capacity(config.capacity + 1),
            snapshot: KpiSnapshot::default(),
            total_accepted: 0,
            config,
        }
    }

    /// Append a batch and recompute the snapshot once
    pub fn insert_batch(&mut self, batch: Vec<MetricRecord>, now: DateTime<Utc>) -> &KpiSnapshot {
        self.total_accepted += batch.len() as u64;
        self.records.extend(batch);

        if self.records.len() > self.config.capacity {
            let keep = self.config.trim_to.min(self.config.capacity);
            let excess = self.records.len() - keep;
            self.records.drain(..excess);
            tracing::debug!(
                trimmed = excess,
                retained = self.records.len(),
                "Trimmed aggregator working set"
            );
        }

        self.snapshot = self.compute(now);
        &self.snapshot
    }

    /// Overlay a server-pushed partial snapshot
    pub fn apply_remote(&mut self, partial: &PartialKpi, now: DateTime<Utc>) -> &KpiSnapshot {
        self.snapshot.merge(partial, now);
        &self.snapshot
    }

    /// Compute KPIs over records inside the trailing window ending at `now`.
    /// Records stamped after `now` are outside the window.
    pub fn compute(&self, now: DateTime<Utc>) -> KpiSnapshot {
        let window_ms = self.config.window.as_millis().min(i64::MAX as u128) as i64;
        let now_ms = now.timestamp_millis();
        let cutoff = now_ms.saturating_sub(window_ms);

        let mut count = 0usize;
        let mut with_errors = 0usize;
        let mut latency_sum = 0.0;
        let mut latency_count = 0usize;

        let in_window = |r: &&MetricRecord| (cutoff..=now_ms).contains(&r.timestamp_millis());
        for record in self.records.iter().filter(in_window) {
            count += 1;
            if record.has_errors() {
                with_errors += 1;
            }
            let duration = record.execution_duration_ms();
            if duration.is_finite() && duration >= 0.0 {
                latency_sum += duration;
                latency_count += 1;
            }
        }

        if count == 0 {
            return KpiSnapshot::empty(now);
        }

        let window_secs = self.config.window.as_secs_f64().max(MIN_WINDOW_SECS);
        let throughput_per_minute = count as f64 / (window_secs / 60.0);
        let average_latency_ms = if latency_count > 0 {
            latency_sum / latency_count as f64
        } else {
            0.0
        };
        let error_rate_percent = 100.0 * with_errors as f64 / count as f64;

        KpiSnapshot {
            throughput_per_minute,
            average_latency_ms,
            error_rate_percent,
            estimated_active_connections: estimate_active_connections(
                throughput_per_minute,
                now,
                &self.config.estimate,
            ),
            records_in_window: count,
            computed_at: now,
        }
    }

    pub fn snapshot(&self) -> &KpiSnapshot {
        &self.snapshot
    }

    /// Records currently retained, oldest first
    pub fn records(&self) -> impl Iterator<Item = &MetricRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records accepted since creation, including trimmed ones
    pub fn total_accepted(&self) -> u64 {
        self.total_accepted
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }
}

impl Default for StreamingAggregator {
    fn default() -> Self {
        Self::new(AggregatorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(now: DateTime<Utc>, ago_ms: i64, duration: f64, errors: bool) -> MetricRecord {
        let errors = if errors { vec!["failed".to_string()] } else { vec![] };
        MetricRecord::new(
            now - chrono::Duration::milliseconds(ago_ms),
            "Query",
            duration,
            errors,
        )
        .unwrap()
    }

    #[test]
    fn test_durations_scenario() {
        let now = Utc::now();
        let mut agg = StreamingAggregator::default();
        let batch = vec![
            record(now, 3000, 100.0, false),
            record(now, 2000, 150.0, false),
            record(now, 1000, 200.0, false),
        ];

        let kpi = agg.insert_batch(batch, now).clone();
        assert!((kpi.average_latency_ms - 150.0).abs() < 1e-9);
        assert_eq!(kpi.error_rate_percent, 0.0);
        assert!((kpi.throughput_per_minute - 3.0).abs() < 1e-9);
        assert_eq!(kpi.records_in_window, 3);
        assert!(kpi.estimated_active_connections >= 1);
    }

    #[test]
    fn test_empty_window_defaults_to_zero() {
        let now = Utc::now();
        let agg = StreamingAggregator::default();
        let kpi = agg.compute(now);
        assert_eq!(kpi.throughput_per_minute, 0.0);
        assert_eq!(kpi.average_latency_ms, 0.0);
        assert_eq!(kpi.error_rate_percent, 0.0);
        assert_eq!(kpi.estimated_active_connections, 0);
    }

    #[test]
    fn test_records_outside_window_are_ignored() {
        let now = Utc::now();
        let mut agg = StreamingAggregator::default();
        let kpi = agg
            .insert_batch(
                vec![record(now, 120_000, 900.0, true), record(now, 500, 20.0, false)],
                now,
            )
            .clone();
        assert_eq!(kpi.records_in_window, 1);
        assert_eq!(kpi.average_latency_ms, 20.0);
        assert_eq!(kpi.error_rate_percent, 0.0);
        assert_eq!(agg.len(), 2);
    }

    #[test]
    fn test_future_records_are_outside_window() {
        let now = Utc::now();
        let mut agg = StreamingAggregator::default();
        let far_future = MetricRecord::new(
            Utc.with_ymd_and_hms(3000, 1, 1, 0, 0, 0).unwrap(),
            "Query",
            5000.0,
            vec!["failed".to_string()],
        )
        .unwrap();

        let kpi = agg
            .insert_batch(vec![far_future, record(now, 100, 10.0, false)], now)
            .clone();
        assert_eq!(kpi.records_in_window, 1);
        assert_eq!(kpi.average_latency_ms, 10.0);
        assert_eq!(kpi.error_rate_percent, 0.0);
    }

    #[test]
    fn test_trim_target_above_capacity_does_not_panic() {
        let now = Utc::now();
        let mut agg = StreamingAggregator::new(AggregatorConfig {
            capacity: 4,
            trim_to: 10,
            ..Default::default()
        });

        agg.insert_batch((0..6).map(|_| record(now, 1, 1.0, false)).collect(), now);
        assert_eq!(agg.len(), 4);
        assert_eq!(agg.snapshot().records_in_window, 4);
        assert_eq!(agg.total_accepted(), 6);
    }

    #[test]
    fn test_error_rate() {
        let now = Utc::now();
        let mut agg = StreamingAggregator::default();
        let batch = (0..8).map(|i| record(now, i * 10, 5.0, i % 4 == 0)).collect();
        let kpi = agg.insert_batch(batch, now);
        assert_eq!(kpi.error_rate_percent, 25.0);
        assert!(kpi.error_rate_percent >= 0.0 && kpi.error_rate_percent <= 100.0);
    }

    #[test]
    fn test_batch_adds_exactly_n_records() {
        let now = Utc::now();
        let mut agg = StreamingAggregator::default();
        agg.insert_batch((0..10).map(|_| record(now, 10, 1.0, false)).collect(), now);
        let before = agg.snapshot().records_in_window;

        let kpi = agg.insert_batch((0..7).map(|_| record(now, 5, 1.0, false)).collect(), now);
        assert_eq!(kpi.records_in_window, before + 7);
    }

    #[test]
    fn test_trim_happens_in_batches() {
        let now = Utc::now();
        let config = AggregatorConfig::default().with_capacity(10, 5);
        let mut agg = StreamingAggregator::new(config);

        agg.insert_batch((0..10).map(|_| record(now, 1, 1.0, false)).collect(), now);
        assert_eq!(agg.len(), 10);

        agg.insert_batch(vec![record(now, 1, 2.0, false)], now);
        assert_eq!(agg.len(), 5);
        // newest record survives the trim
        assert_eq!(agg.records().last().unwrap().execution_duration_ms(), 2.0);
        assert_eq!(agg.total_accepted(), 11);
    }

    #[test]
    fn test_throughput_scales_with_window() {
        let now = Utc::now();
        let config = AggregatorConfig::default().with_window(Duration::from_secs(30));
        let mut agg = StreamingAggregator::new(config);
        let kpi = agg.insert_batch((0..3).map(|i| record(now, i * 100, 1.0, false)).collect(), now);
        assert!((kpi.throughput_per_minute - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_tiny_window_is_clamped() {
        let now = Utc::now();
        let config = AggregatorConfig::default().with_window(Duration::from_millis(10));
        let mut agg = StreamingAggregator::new(config);
        let kpi = agg.insert_batch(vec![record(now, 0, 1.0, false)], now);
        assert!((kpi.throughput_per_minute - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_remote_kpi_merge() {
        let now = Utc::now();
        let mut agg = StreamingAggregator::default();
        agg.insert_batch(vec![record(now, 0, 10.0, false)], now);
        let partial = PartialKpi {
            average_latency_ms: Some(99.0),
            ..Default::default()
        };
        let kpi = agg.apply_remote(&partial, now);
        assert_eq!(kpi.average_latency_ms, 99.0);
        assert_eq!(kpi.records_in_window, 1);
    }
}
