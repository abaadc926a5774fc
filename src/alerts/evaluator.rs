//! Seam between a pipeline's KPI stream and the dispatcher
//!
//! Rule evaluation lives outside this crate; implementors of [`AlertEvaluator`]
//! look at each fresh snapshot and decide whether anything fires.

use tokio::sync::{mpsc, watch};

use super::model::Alert;
use crate::data::KpiSnapshot;

/// Turns KPI snapshots into alerts
pub trait AlertEvaluator: Send + 'static {
    fn evaluate(&mut self, endpoint_id: &str, kpi: &KpiSnapshot) -> Vec<Alert>;
}

/// Feed every KPI change for one endpoint through `evaluator`, forwarding alerts.
///
/// Stops when the KPI stream or the alert receiver goes away.
pub fn spawn_evaluator<E: AlertEvaluator>(
    endpoint_id: impl Into<String>,
    mut evaluator: E,
    mut kpi: watch::Receiver<KpiSnapshot>,
    alerts: mpsc::Sender<Alert>,
) -> tokio::task::JoinHandle<()> {
    let endpoint_id = endpoint_id.into();

    tokio::spawn(async move {
        while kpi.changed().await.is_ok() {
            let snapshot = kpi.borrow_and_update().clone();
            for alert in evaluator.evaluate(&endpoint_id, &snapshot) {
                if alerts.send(alert).await.is_err() {
                    tracing::debug!(endpoint_id = %endpoint_id, "Alert receiver closed");
                    return;
                }
            }
        }
        tracing::debug!(endpoint_id = %endpoint_id, "KPI stream closed, evaluator stopping");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::model::Severity;
    use chrono::Utc;

    struct ErrorRateAbove(f64);

    impl AlertEvaluator for ErrorRateAbove {
        fn evaluate(&mut self, endpoint_id: &str, kpi: &KpiSnapshot) -> Vec<Alert> {
            if kpi.error_rate_percent > self.0 {
                vec![Alert::new(
                    format!("{}-{}", endpoint_id, kpi.computed_at.timestamp_millis()),
                    "error-rate",
                    endpoint_id,
                    Severity::High,
                    format!("Error rate {:.1}%", kpi.error_rate_percent),
                )
                .with_metric("errorRatePercent", kpi.error_rate_percent)]
            } else {
                vec![]
            }
        }
    }

    #[tokio::test]
    async fn test_evaluator_forwards_alerts() {
        let (kpi_tx, kpi_rx) = watch::channel(KpiSnapshot::empty(Utc::now()));
        let (alert_tx, mut alert_rx) = mpsc::channel(8);
        let handle = spawn_evaluator("api", ErrorRateAbove(10.0), kpi_rx, alert_tx);

        let mut quiet = KpiSnapshot::empty(Utc::now());
        quiet.error_rate_percent = 2.0;
        kpi_tx.send(quiet).unwrap();

        let mut noisy = KpiSnapshot::empty(Utc::now());
        noisy.error_rate_percent = 40.0;
        kpi_tx.send(noisy).unwrap();

        let alert = alert_rx.recv().await.unwrap();
        assert_eq!(alert.endpoint_id, "api");
        assert_eq!(alert.metric_values["errorRatePercent"], 40.0);

        drop(kpi_tx);
        handle.await.unwrap();
    }
}
