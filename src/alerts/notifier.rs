//! Notification channels

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::history::ChannelKind;
use super::model::Alert;
use super::preferences::NotificationPreferences;
use crate::events::{EventBus, PipelineEvent};

/// A delivery channel. One call is one attempt; retries are the dispatcher's job.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn send(
        &self,
        alert: &Alert,
        preferences: &NotificationPreferences,
    ) -> Result<(), DeliveryError>;
}

// ============================================================================
// In-app
// ============================================================================

/// Platform permission for in-app notifications
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InAppPermission {
    Granted,
    Denied,
    /// Never asked
    #[default]
    Default,
}

impl std::str::FromStr for InAppPermission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "granted" => Ok(InAppPermission::Granted),
            "denied" => Ok(InAppPermission::Denied),
            "default" => Ok(InAppPermission::Default),
            other => Err(format!("unknown in-app permission '{}'", other)),
        }
    }
}

/// Publishes alerts onto the dispatcher's event bus for the presentation layer
pub struct InAppChannel {
    events: EventBus,
    permission: Arc<RwLock<InAppPermission>>,
}

impl InAppChannel {
    pub fn new(events: EventBus, permission: InAppPermission) -> Self {
        Self {
            events,
            permission: Arc::new(RwLock::new(permission)),
        }
    }

    pub fn permission(&self) -> InAppPermission {
        *self.permission.read()
    }

    pub fn set_permission(&self, permission: InAppPermission) {
        *self.permission.write() = permission;
    }
}

#[async_trait]
impl NotificationChannel for InAppChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::InApp
    }

    async fn send(
        &self,
        alert: &Alert,
        _preferences: &NotificationPreferences,
    ) -> Result<(), DeliveryError> {
        let permission = self.permission();
        if permission != InAppPermission::Granted {
            return Err(DeliveryError::Permission(format!(
                "in-app notifications not granted ({:?})",
                permission
            )));
        }

        self.events.publish(PipelineEvent::InAppNotification {
            alert: alert.clone(),
        });
        Ok(())
    }
}

// ============================================================================
// Webhook
// ============================================================================

/// JSON POST to the user's webhook URL
pub struct WebhookChannel {
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn payload(alert: &Alert) -> serde_json::Value {
        serde_json::json!({
            "alertId": alert.id,
            "ruleId": alert.rule_id,
            "endpointId": alert.endpoint_id,
            "severity": alert.severity,
            "message": alert.message,
            "triggeredAt": alert.triggered_at.to_rfc3339(),
            "metricValues": alert.metric_values,
            "status": alert.status,
            "sentAt": chrono::Utc::now().to_rfc3339(),
        })
    }
}

impl Default for WebhookChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    async fn send(
        &self,
        alert: &Alert,
        preferences: &NotificationPreferences,
    ) -> Result<(), DeliveryError> {
        let url = preferences
            .webhook_url
            .as_deref()
            .ok_or(DeliveryError::MissingDestination(ChannelKind::Webhook))?;

        let response = self
            .client
            .post(url)
            .json(&Self::payload(alert))
            .send()
            .await
            .map_err(|e| DeliveryError::Transient(format!("Failed to send webhook: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("Webhook returned status {}", status);
            return Err(if status.is_server_error()
                || status == reqwest::StatusCode::TOO_MANY_REQUESTS
                || status == reqwest::StatusCode::REQUEST_TIMEOUT
            {
                DeliveryError::Transient(message)
            } else {
                DeliveryError::Rejected(message)
            });
        }

        tracing::debug!(
            alert_id = %alert.id,
            url = %url,
            "Webhook notification sent"
        );

        Ok(())
    }
}

// ============================================================================
// Email
// ============================================================================

/// Email transport settings
#[derive(Debug, Clone, Default)]
pub enum EmailTransportConfig {
    Smtp {
        host: String,
        port: u16,
        username: Option<String>,
        password: Option<String>,
        use_tls: bool,
    },
    /// Write messages as files, for development
    Outbox { path: PathBuf },
    /// No transport; email attempts fail without a network call
    #[default]
    Disabled,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub transport: EmailTransportConfig,
    /// `Name <address>` or bare address
    pub from: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            transport: EmailTransportConfig::Disabled,
            from: "gqlpulse <alerts@gqlpulse.local>".to_string(),
        }
    }
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    Outbox(AsyncFileTransport<Tokio1Executor>),
    Disabled,
}

/// Plain-text alert email over SMTP or to an outbox directory
pub struct EmailChannel {
    transport: EmailTransport,
    from: Mailbox,
}

impl EmailChannel {
    pub fn new(config: &EmailConfig) -> Result<Self, NotifierError> {
        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| NotifierError::Sender(format!("{}: {}", config.from, e)))?;

        let transport = match &config.transport {
            EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                if !use_tls {
                    tracing::warn!("SMTP TLS is disabled - this is not recommended for production");
                }
                let mut builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                        .map_err(|e| NotifierError::Smtp(e.to_string()))?
                } else {
                    AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                }
                .port(*port);

                if let (Some(user), Some(pass)) = (username, password) {
                    builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
                }
                EmailTransport::Smtp(builder.build())
            }
            EmailTransportConfig::Outbox { path } => {
                std::fs::create_dir_all(path)
                    .map_err(|e| NotifierError::Outbox(format!("{}: {}", path.display(), e)))?;
                EmailTransport::Outbox(AsyncFileTransport::<Tokio1Executor>::new(path))
            }
            EmailTransportConfig::Disabled => EmailTransport::Disabled,
        };

        Ok(Self { transport, from })
    }

    fn body(alert: &Alert) -> String {
        let mut metrics: Vec<_> = alert.metric_values.iter().collect();
        metrics.sort_by(|a, b| a.0.cmp(b.0));

        let mut body = format!(
            "{}\n\nEndpoint: {}\nRule: {}\nSeverity: {}\nTriggered at: {}\nStatus: {:?}\n",
            alert.message,
            alert.endpoint_id,
            alert.rule_id,
            alert.severity,
            alert.triggered_at.to_rfc3339(),
            alert.status,
        );
        if !metrics.is_empty() {
            body.push_str("\nMetric values:\n");
            for (name, value) in metrics {
                body.push_str(&format!("  {}: {}\n", name, value));
            }
        }
        body.push_str(&format!("\nAlert ID: {}\n", alert.id));
        body
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(
        &self,
        alert: &Alert,
        preferences: &NotificationPreferences,
    ) -> Result<(), DeliveryError> {
        let address = preferences
            .email_address
            .as_deref()
            .ok_or(DeliveryError::MissingDestination(ChannelKind::Email))?;

        let to = address
            .parse::<Mailbox>()
            .map_err(|e| DeliveryError::Rejected(format!("parse recipient: {}", e)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(alert.summary())
            .header(ContentType::TEXT_PLAIN)
            .body(Self::body(alert))
            .map_err(|e| DeliveryError::Rejected(format!("build email message: {}", e)))?;

        match &self.transport {
            EmailTransport::Smtp(smtp) => {
                smtp.send(message).await.map_err(|e| {
                    if e.is_permanent() {
                        DeliveryError::Rejected(format!("send SMTP email: {}", e))
                    } else {
                        DeliveryError::Transient(format!("send SMTP email: {}", e))
                    }
                })?;
            }
            EmailTransport::Outbox(outbox) => {
                outbox
                    .send(message)
                    .await
                    .map_err(|e| DeliveryError::Transient(format!("write outbox email: {}", e)))?;
            }
            EmailTransport::Disabled => {
                return Err(DeliveryError::MissingDestination(ChannelKind::Email));
            }
        }

        tracing::debug!(alert_id = %alert.id, recipient = %address, "Email notification sent");
        Ok(())
    }
}

/// Outcome of a single failed attempt
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeliveryError {
    /// Network failure or retryable status
    #[error("Transient delivery failure: {0}")]
    Transient(String),

    #[error("Attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Channel not permitted at the platform level
    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("No destination configured for {0} channel")]
    MissingDestination(ChannelKind),

    /// Permanent refusal, not worth retrying
    #[error("Delivery rejected: {0}")]
    Rejected(String),
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Transient(_) | DeliveryError::Timeout(_))
    }
}

/// Channel construction errors
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("Outbox error: {0}")]
    Outbox(String),

    #[error("Invalid sender address: {0}")]
    Sender(String),

    #[error("HTTP client error: {0}")]
    Http(String),
}
