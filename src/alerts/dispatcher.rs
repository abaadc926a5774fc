//! Preference-gated, retrying fan-out of alerts to notification channels

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::mpsc;

use super::history::{ChannelKind, NotificationHistory, NotificationRecord, DEFAULT_HISTORY_CAPACITY};
use super::model::Alert;
use super::notifier::{
    DeliveryError, EmailChannel, EmailConfig, InAppChannel, InAppPermission, NotificationChannel,
    NotifierError, WebhookChannel,
};
use super::preferences::{NotificationPreferences, PreferencesError, PreferencesUpdate};
use crate::events::{EventBus, PipelineEvent};

/// Retry and timeout policy
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Extra tries after the first for networked channels
    pub max_retries: u32,
    /// Upper bound on a single attempt
    pub attempt_timeout: Duration,
    /// Pause between sequential attempts on one channel
    pub retry_delay: Duration,
    pub history_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            attempt_timeout: Duration::from_secs(10),
            retry_delay: Duration::from_secs(1),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl DispatcherConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }
}

/// What happened to one submitted alert
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub alert_id: String,
    /// One entry per attempted channel
    pub outcomes: Vec<NotificationRecord>,
    /// Enabled channels held back by the severity filter or quiet hours
    pub suppressed: Vec<ChannelKind>,
}

impl DispatchReport {
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|r| !r.success).count()
    }
}

/// Notification dispatcher
pub struct NotificationDispatcher {
    config: DispatcherConfig,
    preferences: RwLock<NotificationPreferences>,
    history: Arc<Mutex<NotificationHistory>>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    in_app: Option<Arc<InAppChannel>>,
    events: EventBus,
}

impl NotificationDispatcher {
    /// Dispatcher with no channels registered
    pub fn new(config: DispatcherConfig, events: EventBus) -> Self {
        Self {
            history: Arc::new(Mutex::new(NotificationHistory::new(config.history_capacity))),
            preferences: RwLock::new(NotificationPreferences::default()),
            channels: Vec::new(),
            in_app: None,
            events,
            config,
        }
    }

    /// Dispatcher with the in-app, email and webhook channels
    pub fn with_standard_channels(
        config: DispatcherConfig,
        email: &EmailConfig,
        in_app_permission: InAppPermission,
        events: EventBus,
    ) -> Result<Self, NotifierError> {
        let client = reqwest::Client::builder()
            .timeout(config.attempt_timeout)
            .build()
            .map_err(|e| NotifierError::Http(e.to_string()))?;

        let in_app = Arc::new(InAppChannel::new(events.clone(), in_app_permission));
        let email = EmailChannel::new(email)?;

        Ok(Self::new(config, events)
            .with_in_app(in_app)
            .with_channel(Arc::new(email))
            .with_channel(Arc::new(WebhookChannel::with_client(client))))
    }

    /// Register a channel. A later channel of the same kind is attempted too.
    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    /// Register the in-app channel and keep a handle for permission changes
    pub fn with_in_app(mut self, channel: Arc<InAppChannel>) -> Self {
        self.channels.push(channel.clone());
        self.in_app = Some(channel);
        self
    }

    pub fn with_preferences(self, preferences: NotificationPreferences) -> Result<Self, PreferencesError> {
        self.set_preferences(preferences)?;
        Ok(self)
    }

    // ------------------------------------------------------------------------
    // Preferences
    // ------------------------------------------------------------------------

    pub fn preferences(&self) -> NotificationPreferences {
        self.preferences.read().clone()
    }

    /// Replace preferences wholesale; invalid values leave the current ones intact
    pub fn set_preferences(&self, preferences: NotificationPreferences) -> Result<(), PreferencesError> {
        preferences.validate()?;
        *self.preferences.write() = preferences;
        Ok(())
    }

    /// Merge a partial update; invalid values leave the current ones intact
    pub fn update_preferences(
        &self,
        update: PreferencesUpdate,
    ) -> Result<NotificationPreferences, PreferencesError> {
        let mut current = self.preferences.write();
        let next = current.apply(update)?;
        *current = next.clone();
        Ok(next)
    }

    pub fn in_app_permission(&self) -> Option<InAppPermission> {
        self.in_app.as_ref().map(|c| c.permission())
    }

    pub fn set_in_app_permission(&self, permission: InAppPermission) {
        if let Some(channel) = &self.in_app {
            channel.set_permission(permission);
        }
    }

    // ------------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------------

    /// Outcomes, oldest first
    pub fn history(&self) -> Vec<NotificationRecord> {
        self.history.lock().entries()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    /// Deliver an alert using the current local time for quiet hours
    pub async fn submit(&self, alert: &Alert) -> DispatchReport {
        self.submit_at(alert, Local::now().time()).await
    }

    /// Deliver an alert as if the local time of day were `local_time`.
    ///
    /// Each channel attempt runs on its own task, so dropping the returned
    /// future does not cancel deliveries already started; they still record
    /// their outcome and publish their event.
    pub async fn submit_at(&self, alert: &Alert, local_time: NaiveTime) -> DispatchReport {
        let preferences = self.preferences();
        let permitted = preferences.permits(alert.severity, local_time);

        let mut suppressed = Vec::new();
        let mut deliveries = Vec::new();
        for channel in &self.channels {
            if !is_enabled(&preferences, channel.kind()) {
                continue;
            }
            if permitted {
                let delivery = Delivery {
                    channel: Arc::clone(channel),
                    alert: alert.clone(),
                    preferences: preferences.clone(),
                    config: self.config.clone(),
                    history: Arc::clone(&self.history),
                    events: self.events.clone(),
                };
                deliveries.push(tokio::spawn(delivery.run()));
            } else {
                suppressed.push(channel.kind());
            }
        }

        if !suppressed.is_empty() {
            tracing::debug!(
                alert_id = %alert.id,
                severity = %alert.severity,
                channels = ?suppressed,
                "Alert suppressed by notification preferences"
            );
        }

        let mut outcomes = Vec::with_capacity(deliveries.len());
        for joined in futures::future::join_all(deliveries).await {
            match joined {
                Ok(record) => outcomes.push(record),
                Err(e) => tracing::error!(alert_id = %alert.id, error = %e, "Delivery task failed"),
            }
        }

        DispatchReport {
            alert_id: alert.id.clone(),
            outcomes,
            suppressed,
        }
    }

    /// Consume alerts until the sender side closes
    pub fn run(self: Arc<Self>, mut alerts: mpsc::Receiver<Alert>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("Notification dispatcher started");
            while let Some(alert) = alerts.recv().await {
                let report = self.submit(&alert).await;
                tracing::debug!(
                    alert_id = %report.alert_id,
                    delivered = report.delivered(),
                    failed = report.failed(),
                    "Alert dispatched"
                );
            }
            tracing::info!("Notification dispatcher stopped");
        })
    }
}

/// One alert on one channel, owned so it can outlive the submitting caller
struct Delivery {
    channel: Arc<dyn NotificationChannel>,
    alert: Alert,
    preferences: NotificationPreferences,
    config: DispatcherConfig,
    history: Arc<Mutex<NotificationHistory>>,
    events: EventBus,
}

impl Delivery {
    /// Attempt the channel within its retry budget and record the outcome
    async fn run(self) -> NotificationRecord {
        let Delivery {
            channel,
            alert,
            preferences,
            config,
            history,
            events,
        } = self;
        let kind = channel.kind();
        let max_attempts = if kind.is_networked() {
            1 + config.max_retries
        } else {
            1
        };

        let mut attempts = 0;
        let result = loop {
            attempts += 1;
            let result = match tokio::time::timeout(
                config.attempt_timeout,
                channel.send(&alert, &preferences),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(DeliveryError::Timeout(config.attempt_timeout)),
            };

            match result {
                Err(e) if e.is_retryable() && attempts < max_attempts => {
                    tracing::warn!(
                        alert_id = %alert.id,
                        channel = %kind,
                        attempt = attempts,
                        error = %e,
                        "Notification attempt failed, retrying"
                    );
                    tokio::time::sleep(config.retry_delay).await;
                }
                other => break other,
            }
        };

        let record = NotificationRecord {
            alert_id: alert.id.clone(),
            channel: kind,
            success: result.is_ok(),
            sent_at: Utc::now(),
            attempts,
            error: result.as_ref().err().map(|e| e.to_string()),
        };

        history.lock().record(record.clone());

        match &result {
            Ok(()) => {
                tracing::info!(alert_id = %alert.id, channel = %kind, attempts, "Notification sent");
                events.publish(PipelineEvent::NotificationSent {
                    record: record.clone(),
                });
            }
            Err(e) => {
                tracing::error!(
                    alert_id = %alert.id,
                    channel = %kind,
                    attempts,
                    error = %e,
                    "Notification failed"
                );
                events.publish(PipelineEvent::NotificationFailed {
                    record: record.clone(),
                });
            }
        }

        record
    }
}

fn is_enabled(preferences: &NotificationPreferences, kind: ChannelKind) -> bool {
    match kind {
        ChannelKind::InApp => preferences.channels_enabled.in_app,
        ChannelKind::Email => preferences.channels_enabled.email,
        ChannelKind::Webhook => preferences.channels_enabled.webhook,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::model::Severity;
    use crate::alerts::preferences::{ChannelsEnabled, QuietHours};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Channel that replays scripted results, then succeeds
    struct ScriptedChannel {
        kind: ChannelKind,
        script: Mutex<VecDeque<Result<(), DeliveryError>>>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedChannel {
        fn new(kind: ChannelKind, script: Vec<Result<(), DeliveryError>>) -> Arc<Self> {
            Self::with_delay(kind, script, Duration::ZERO)
        }

        fn with_delay(
            kind: ChannelKind,
            script: Vec<Result<(), DeliveryError>>,
            delay: Duration,
        ) -> Arc<Self> {
            Arc::new(Self {
                kind,
                script: Mutex::new(script.into()),
                delay,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NotificationChannel for ScriptedChannel {
        fn kind(&self) -> ChannelKind {
            self.kind
        }

        async fn send(
            &self,
            _alert: &Alert,
            _preferences: &NotificationPreferences,
        ) -> Result<(), DeliveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.script.lock().pop_front().unwrap_or(Ok(()))
        }
    }

    fn transient() -> Result<(), DeliveryError> {
        Err(DeliveryError::Transient("connection reset".to_string()))
    }

    fn fast_config() -> DispatcherConfig {
        DispatcherConfig::default().with_retry_delay(Duration::ZERO)
    }

    fn all_channels() -> ChannelsEnabled {
        ChannelsEnabled {
            in_app: true,
            email: true,
            webhook: true,
        }
    }

    fn noon() -> NaiveTime {
        NaiveTime::from_hms_opt(12, 0, 0).unwrap()
    }

    fn alert(severity: Severity) -> Alert {
        Alert::new("alert-1", "error-rate", "api", severity, "Error rate above 5%")
    }

    #[tokio::test]
    async fn test_severity_filter_blocks_all_attempts() {
        let webhook = ScriptedChannel::new(ChannelKind::Webhook, vec![]);
        let dispatcher = NotificationDispatcher::new(fast_config(), EventBus::default())
            .with_channel(webhook.clone())
            .with_preferences(NotificationPreferences {
                channels_enabled: all_channels(),
                webhook_url: Some("https://hooks.example.com/a".to_string()),
                severity_filter: [Severity::High, Severity::Critical].into_iter().collect(),
                ..Default::default()
            })
            .unwrap();

        let report = dispatcher.submit_at(&alert(Severity::Low), noon()).await;
        assert!(report.outcomes.is_empty());
        assert_eq!(report.suppressed, vec![ChannelKind::Webhook]);
        assert_eq!(webhook.calls(), 0);
        assert!(dispatcher.history().is_empty());
    }

    #[tokio::test]
    async fn test_quiet_hours_suppress_all_but_critical() {
        let webhook = ScriptedChannel::new(ChannelKind::Webhook, vec![]);
        let dispatcher = NotificationDispatcher::new(fast_config(), EventBus::default())
            .with_channel(webhook.clone())
            .with_preferences(NotificationPreferences {
                channels_enabled: all_channels(),
                quiet_hours: Some(QuietHours::parse("22:00", "06:00").unwrap()),
                allow_critical_during_quiet_hours: true,
                ..Default::default()
            })
            .unwrap();
        let eleven_pm = NaiveTime::from_hms_opt(23, 0, 0).unwrap();

        let report = dispatcher.submit_at(&alert(Severity::Medium), eleven_pm).await;
        assert!(report.outcomes.is_empty());
        assert_eq!(webhook.calls(), 0);

        let report = dispatcher.submit_at(&alert(Severity::Critical), eleven_pm).await;
        assert_eq!(report.delivered(), 1);
        assert_eq!(webhook.calls(), 1);
        assert_eq!(dispatcher.history().len(), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let webhook = ScriptedChannel::new(ChannelKind::Webhook, vec![transient(), transient()]);
        let dispatcher = NotificationDispatcher::new(fast_config(), EventBus::default())
            .with_channel(webhook.clone())
            .with_preferences(NotificationPreferences {
                channels_enabled: all_channels(),
                ..Default::default()
            })
            .unwrap();

        let report = dispatcher.submit_at(&alert(Severity::High), noon()).await;
        assert_eq!(webhook.calls(), 3);
        let record = &report.outcomes[0];
        assert!(record.success);
        assert_eq!(record.attempts, 3);
        assert_eq!(dispatcher.history().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_budget_exhaustion_records_failure() {
        let webhook = ScriptedChannel::new(
            ChannelKind::Webhook,
            vec![transient(), transient(), transient(), transient()],
        );
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let dispatcher = NotificationDispatcher::new(fast_config(), events)
            .with_channel(webhook.clone())
            .with_preferences(NotificationPreferences {
                channels_enabled: all_channels(),
                ..Default::default()
            })
            .unwrap();

        let report = dispatcher.submit_at(&alert(Severity::High), noon()).await;
        assert_eq!(webhook.calls(), 3);
        assert_eq!(report.failed(), 1);

        let history = dispatcher.history();
        assert_eq!(history.len(), 1);
        assert!(!history[0].success);
        assert!(history[0].error.as_deref().unwrap().contains("connection reset"));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "notification-failed");
    }

    #[tokio::test]
    async fn test_rejections_are_not_retried() {
        let webhook = ScriptedChannel::new(
            ChannelKind::Webhook,
            vec![Err(DeliveryError::Rejected("status 400".to_string()))],
        );
        let dispatcher = NotificationDispatcher::new(fast_config(), EventBus::default())
            .with_channel(webhook.clone())
            .with_preferences(NotificationPreferences {
                channels_enabled: all_channels(),
                ..Default::default()
            })
            .unwrap();

        let report = dispatcher.submit_at(&alert(Severity::High), noon()).await;
        assert_eq!(webhook.calls(), 1);
        assert_eq!(report.outcomes[0].attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_count_as_transient() {
        let webhook = ScriptedChannel::with_delay(
            ChannelKind::Webhook,
            vec![],
            Duration::from_secs(30),
        );
        let config = fast_config().with_attempt_timeout(Duration::from_secs(5));
        let dispatcher = NotificationDispatcher::new(config, EventBus::default())
            .with_channel(webhook.clone())
            .with_preferences(NotificationPreferences {
                channels_enabled: all_channels(),
                ..Default::default()
            })
            .unwrap();

        let report = dispatcher.submit_at(&alert(Severity::High), noon()).await;
        assert_eq!(webhook.calls(), 3);
        let record = &report.outcomes[0];
        assert!(!record.success);
        assert!(record.error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_channel_does_not_block_sibling() {
        let email = ScriptedChannel::with_delay(
            ChannelKind::Email,
            vec![transient(), transient(), transient()],
            Duration::from_secs(2),
        );
        let webhook = ScriptedChannel::new(ChannelKind::Webhook, vec![]);
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let dispatcher = NotificationDispatcher::new(fast_config(), events)
            .with_channel(email.clone())
            .with_channel(webhook.clone())
            .with_preferences(NotificationPreferences {
                channels_enabled: all_channels(),
                ..Default::default()
            })
            .unwrap();

        let report = dispatcher.submit_at(&alert(Severity::High), noon()).await;
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.delivered(), 1);
        assert_eq!(report.failed(), 1);

        // webhook finishes while email is still retrying
        let first = rx.recv().await.unwrap();
        assert_eq!(first.name(), "notification-sent");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.name(), "notification-failed");

        let history = dispatcher.history();
        assert_eq!(history[0].channel, ChannelKind::Webhook);
        assert_eq!(history[1].channel, ChannelKind::Email);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_submit_still_records_outcome() {
        let webhook = ScriptedChannel::with_delay(
            ChannelKind::Webhook,
            vec![],
            Duration::from_secs(2),
        );
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let dispatcher = Arc::new(
            NotificationDispatcher::new(fast_config(), events)
                .with_channel(webhook.clone())
                .with_preferences(NotificationPreferences {
                    channels_enabled: all_channels(),
                    ..Default::default()
                })
                .unwrap(),
        );

        let submitting = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.submit_at(&alert(Severity::High), noon()).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        submitting.abort();
        assert!(submitting.await.unwrap_err().is_cancelled());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "notification-sent");
        assert_eq!(webhook.calls(), 1);
        let history = dispatcher.history();
        assert_eq!(history.len(), 1);
        assert!(history[0].success);
    }

    #[tokio::test]
    async fn test_disabled_channels_leave_no_record() {
        let email = ScriptedChannel::new(ChannelKind::Email, vec![]);
        let webhook = ScriptedChannel::new(ChannelKind::Webhook, vec![]);
        let dispatcher = NotificationDispatcher::new(fast_config(), EventBus::default())
            .with_channel(email.clone())
            .with_channel(webhook.clone());

        // defaults: only in-app enabled, and no in-app channel registered
        let report = dispatcher.submit_at(&alert(Severity::Critical), noon()).await;
        assert!(report.outcomes.is_empty());
        assert!(report.suppressed.is_empty());
        assert_eq!(email.calls() + webhook.calls(), 0);
    }

    #[tokio::test]
    async fn test_standard_channels_without_destinations() {
        let dispatcher = NotificationDispatcher::with_standard_channels(
            fast_config(),
            &EmailConfig::default(),
            InAppPermission::Denied,
            EventBus::default(),
        )
        .unwrap()
        .with_preferences(NotificationPreferences {
            channels_enabled: all_channels(),
            ..Default::default()
        })
        .unwrap();

        let report = dispatcher.submit_at(&alert(Severity::High), noon()).await;
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.failed(), 3);
        for record in &report.outcomes {
            assert_eq!(record.attempts, 1, "{:?}", record.channel);
        }

        dispatcher.set_in_app_permission(InAppPermission::Granted);
        assert_eq!(dispatcher.in_app_permission(), Some(InAppPermission::Granted));
    }

    #[tokio::test]
    async fn test_invalid_preferences_keep_previous() {
        let dispatcher = NotificationDispatcher::new(fast_config(), EventBus::default());
        let valid = PreferencesUpdate {
            webhook_url: Some(Some("https://hooks.example.com/ok".to_string())),
            ..Default::default()
        };
        dispatcher.update_preferences(valid).unwrap();

        let invalid = PreferencesUpdate {
            webhook_url: Some(Some("not a url".to_string())),
            ..Default::default()
        };
        assert!(matches!(
            dispatcher.update_preferences(invalid),
            Err(PreferencesError::InvalidWebhookUrl(_))
        ));
        assert_eq!(
            dispatcher.preferences().webhook_url.as_deref(),
            Some("https://hooks.example.com/ok")
        );

        let replaced = NotificationPreferences {
            email_address: Some("@@".to_string()),
            ..Default::default()
        };
        assert!(dispatcher.set_preferences(replaced).is_err());
        assert!(dispatcher.preferences().webhook_url.is_some());
    }

    #[tokio::test]
    async fn test_history_is_bounded_and_clearable() {
        let webhook = ScriptedChannel::new(ChannelKind::Webhook, vec![]);
        let config = fast_config().with_history_capacity(2);
        let dispatcher = NotificationDispatcher::new(config, EventBus::default())
            .with_channel(webhook)
            .with_preferences(NotificationPreferences {
                channels_enabled: all_channels(),
                ..Default::default()
            })
            .unwrap();

        for id in ["a", "b", "c"] {
            let mut a = alert(Severity::High);
            a.id = id.to_string();
            dispatcher.submit_at(&a, noon()).await;
        }
        let ids: Vec<_> = dispatcher.history().into_iter().map(|r| r.alert_id).collect();
        assert_eq!(ids, vec!["b", "c"]);

        dispatcher.clear_history();
        assert!(dispatcher.history().is_empty());
    }

    #[tokio::test]
    async fn test_run_consumes_channel() {
        let webhook = ScriptedChannel::new(ChannelKind::Webhook, vec![]);
        let dispatcher = Arc::new(
            NotificationDispatcher::new(fast_config(), EventBus::default())
                .with_channel(webhook.clone())
                .with_preferences(NotificationPreferences {
                    channels_enabled: all_channels(),
                    ..Default::default()
                })
                .unwrap(),
        );

        let (tx, rx) = mpsc::channel(4);
        let handle = Arc::clone(&dispatcher).run(rx);
        tx.send(alert(Severity::Critical)).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(webhook.calls(), 1);
        assert_eq!(dispatcher.history().len(), 1);
    }
}
