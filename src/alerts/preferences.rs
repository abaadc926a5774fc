//! User notification preferences

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::NaiveTime;
use serde::{Deserialize, Deserializer, Serialize};

use super::model::Severity;

/// Per-channel on/off switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsEnabled {
    pub in_app: bool,
    pub email: bool,
    pub webhook: bool,
}

impl Default for ChannelsEnabled {
    fn default() -> Self {
        Self {
            in_app: true,
            email: false,
            webhook: false,
        }
    }
}

/// Daily local time-of-day window during which non-critical alerts are held back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl QuietHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Parse a pair of `HH:MM` strings
    pub fn parse(start: &str, end: &str) -> Result<Self, PreferencesError> {
        Ok(Self {
            start: hhmm::parse(start).map_err(PreferencesError::InvalidQuietHours)?,
            end: hhmm::parse(end).map_err(PreferencesError::InvalidQuietHours)?,
        })
    }

    /// Whether `time` falls inside the window; `start == end` is an empty window.
    /// Start is inclusive, end exclusive, and `start > end` wraps past midnight.
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start == self.end {
            false
        } else if self.start < self.end {
            time >= self.start && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

/// Notification preferences owned by the dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationPreferences {
    pub channels_enabled: ChannelsEnabled,
    pub email_address: Option<String>,
    pub webhook_url: Option<String>,
    pub severity_filter: BTreeSet<Severity>,
    pub quiet_hours: Option<QuietHours>,
    pub allow_critical_during_quiet_hours: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            channels_enabled: ChannelsEnabled::default(),
            email_address: None,
            webhook_url: None,
            severity_filter: Severity::ALL.into_iter().collect(),
            quiet_hours: None,
            allow_critical_during_quiet_hours: true,
        }
    }
}

impl NotificationPreferences {
    /// Check destination formats
    pub fn validate(&self) -> Result<(), PreferencesError> {
        if let Some(email) = &self.email_address {
            validate_email(email)?;
        }
        if let Some(url) = &self.webhook_url {
            validate_webhook_url(url)?;
        }
        Ok(())
    }

    /// Merge an update over these preferences, validating the result
    pub fn apply(&self, update: PreferencesUpdate) -> Result<Self, PreferencesError> {
        let mut next = self.clone();

        if let Some(channels) = update.channels_enabled {
            if let Some(v) = channels.in_app {
                next.channels_enabled.in_app = v;
            }
            if let Some(v) = channels.email {
                next.channels_enabled.email = v;
            }
            if let Some(v) = channels.webhook {
                next.channels_enabled.webhook = v;
            }
        }
        if let Some(email) = update.email_address {
            next.email_address = email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty());
        }
        if let Some(url) = update.webhook_url {
            next.webhook_url = url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());
        }
        if let Some(filter) = update.severity_filter {
            next.severity_filter = filter;
        }
        if let Some(quiet_hours) = update.quiet_hours {
            next.quiet_hours = quiet_hours;
        }
        if let Some(allow) = update.allow_critical_during_quiet_hours {
            next.allow_critical_during_quiet_hours = allow;
        }

        next.validate()?;
        Ok(next)
    }

    /// Severity and quiet-hours gate applied to every channel
    pub fn permits(&self, severity: Severity, local_time: NaiveTime) -> bool {
        if !self.severity_filter.contains(&severity) {
            return false;
        }
        match &self.quiet_hours {
            Some(quiet) if quiet.contains(local_time) => {
                severity == Severity::Critical && self.allow_critical_during_quiet_hours
            }
            _ => true,
        }
    }
}

/// Partial preferences; absent fields keep their current value.
/// For the nullable fields, an explicit `null` clears the value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesUpdate {
    #[serde(default)]
    pub channels_enabled: Option<ChannelsUpdate>,
    #[serde(default, deserialize_with = "double_option")]
    pub email_address: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub webhook_url: Option<Option<String>>,
    #[serde(default)]
    pub severity_filter: Option<BTreeSet<Severity>>,
    #[serde(default, deserialize_with = "double_option")]
    pub quiet_hours: Option<Option<QuietHours>>,
    #[serde(default)]
    pub allow_critical_during_quiet_hours: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsUpdate {
    pub in_app: Option<bool>,
    pub email: Option<bool>,
    pub webhook: Option<bool>,
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

pub fn validate_email(email: &str) -> Result<(), PreferencesError> {
    lettre::Address::from_str(email)
        .map(|_| ())
        .map_err(|e| PreferencesError::InvalidEmail(format!("{}: {}", email, e)))
}

pub fn validate_webhook_url(url: &str) -> Result<(), PreferencesError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| PreferencesError::InvalidWebhookUrl(format!("{}: {}", url, e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(PreferencesError::InvalidWebhookUrl(format!(
            "{}: scheme must be http or https",
            url
        )));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(PreferencesError::InvalidWebhookUrl(format!(
            "{}: missing host",
            url
        )));
    }
    Ok(())
}

/// Rejected preference values
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PreferencesError {
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Invalid webhook URL: {0}")]
    InvalidWebhookUrl(String),

    #[error("Invalid quiet hours: {0}")]
    InvalidQuietHours(String),
}

/// `HH:MM` time-of-day serialization helper
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(s: &str) -> Result<NaiveTime, String> {
        NaiveTime::parse_from_str(s.trim(), "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(s.trim(), "%H:%M:%S"))
            .map_err(|e| format!("{}: {}", s, e))
    }

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }
}
