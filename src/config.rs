//! Service configuration from environment variables
//!
//! - `GQLPULSE_HOST`, `GQLPULSE_PORT`: HTTP bind address (default 0.0.0.0:8080)
//! - `GQLPULSE_ENDPOINTS`: monitored endpoints, `id=ws://host/path,id2=wss://...`
//! - `GQLPULSE_AUTO_CONNECT`: connect every pipeline at startup (default true)
//! - `GQLPULSE_RECONNECT_INTERVAL_MS`, `GQLPULSE_MAX_RECONNECT_ATTEMPTS`
//! - `GQLPULSE_HEARTBEAT_INTERVAL_SECS`, `GQLPULSE_OFFLINE_BUFFER_CAPACITY`
//! - `GQLPULSE_KPI_WINDOW_SECS`
//! - `GQLPULSE_NOTIFY_TIMEOUT_SECS`, `GQLPULSE_NOTIFY_MAX_RETRIES`
//! - `GQLPULSE_IN_APP_PERMISSION`: granted, denied or default
//! - `GQLPULSE_SMTP_HOST`, `GQLPULSE_SMTP_PORT`, `GQLPULSE_SMTP_USERNAME`,
//!   `GQLPULSE_SMTP_PASSWORD`, `GQLPULSE_SMTP_TLS`
//! - `GQLPULSE_EMAIL_FROM`, `GQLPULSE_EMAIL_OUTBOX_DIR`

use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::alerts::{DispatcherConfig, EmailConfig, EmailTransportConfig, InAppPermission};
use crate::ingest::ConnectionConfig;

/// One monitored endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointConfig {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub endpoints: Vec<EndpointConfig>,
    pub auto_connect: bool,
    pub connection: ConnectionConfig,
    pub dispatcher: DispatcherConfig,
    pub email: EmailConfig,
    pub in_app_permission: InAppPermission,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            endpoints: Vec::new(),
            auto_connect: true,
            connection: ConnectionConfig::default(),
            dispatcher: DispatcherConfig::default(),
            email: EmailConfig::default(),
            in_app_permission: InAppPermission::Granted,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset and empty variables keep their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env { lookup };
        let mut config = Self::default();

        if let Some(host) = env.string("GQLPULSE_HOST") {
            config.host = host;
        }
        if let Some(port) = env.parse("GQLPULSE_PORT")? {
            config.port = port;
        }
        if let Some(list) = env.string("GQLPULSE_ENDPOINTS") {
            config.endpoints = parse_endpoints(&list)?;
        }
        if let Some(auto_connect) = env.flag("GQLPULSE_AUTO_CONNECT")? {
            config.auto_connect = auto_connect;
        }

        // Connection
        let connection = &mut config.connection;
        if let Some(ms) = env.parse::<u64>("GQLPULSE_RECONNECT_INTERVAL_MS")? {
            connection.reconnect_interval = Duration::from_millis(ms);
        }
        if let Some(max) = env.parse("GQLPULSE_MAX_RECONNECT_ATTEMPTS")? {
            connection.max_reconnect_attempts = max;
        }
        if let Some(secs) = env.parse::<u64>("GQLPULSE_HEARTBEAT_INTERVAL_SECS")? {
            if secs == 0 {
                return Err(ConfigError::invalid(
                    "GQLPULSE_HEARTBEAT_INTERVAL_SECS",
                    "0",
                    "must be at least 1",
                ));
            }
            connection.heartbeat_interval = Duration::from_secs(secs);
        }
        if let Some(capacity) = env.parse("GQLPULSE_OFFLINE_BUFFER_CAPACITY")? {
            connection.offline_buffer_capacity = capacity;
        }
        if let Some(secs) = env.parse::<u64>("GQLPULSE_KPI_WINDOW_SECS")? {
            connection.aggregator = connection
                .aggregator
                .clone()
                .with_window(Duration::from_secs(secs));
        }

        // Notifications
        if let Some(secs) = env.parse::<u64>("GQLPULSE_NOTIFY_TIMEOUT_SECS")? {
            config.dispatcher.attempt_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(retries) = env.parse("GQLPULSE_NOTIFY_MAX_RETRIES")? {
            config.dispatcher.max_retries = retries;
        }
        if let Some(permission) = env.parse::<InAppPermission>("GQLPULSE_IN_APP_PERMISSION")? {
            config.in_app_permission = permission;
        }

        // Email
        if let Some(from) = env.string("GQLPULSE_EMAIL_FROM") {
            config.email.from = from;
        }
        if let Some(host) = env.string("GQLPULSE_SMTP_HOST") {
            config.email.transport = EmailTransportConfig::Smtp {
                host,
                port: env.parse("GQLPULSE_SMTP_PORT")?.unwrap_or(587),
                username: env.string("GQLPULSE_SMTP_USERNAME"),
                password: env.string("GQLPULSE_SMTP_PASSWORD"),
                use_tls: env.flag("GQLPULSE_SMTP_TLS")?.unwrap_or(true),
            };
        } else if let Some(dir) = env.string("GQLPULSE_EMAIL_OUTBOX_DIR") {
            config.email.transport = EmailTransportConfig::Outbox {
                path: PathBuf::from(dir),
            };
        }

        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.string(key) {
            None => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|e: T::Err| ConfigError::invalid(key, &raw, e)),
        }
    }

    fn flag(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        match self.string(key).map(|v| v.to_ascii_lowercase()) {
            None => Ok(None),
            Some(v) if v == "true" || v == "1" || v == "yes" => Ok(Some(true)),
            Some(v) if v == "false" || v == "0" || v == "no" => Ok(Some(false)),
            Some(v) => Err(ConfigError::invalid(key, &v, "expected true or false")),
        }
    }
}

/// Parse `id=url,id2=url2`
pub fn parse_endpoints(list: &str) -> Result<Vec<EndpointConfig>, ConfigError> {
    let mut seen = HashSet::new();
    let mut endpoints = Vec::new();

    for entry in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (id, url) = entry
            .split_once('=')
            .map(|(id, url)| (id.trim(), url.trim()))
            .filter(|(id, url)| !id.is_empty() && !url.is_empty())
            .ok_or_else(|| ConfigError::InvalidEndpoint {
                entry: entry.to_string(),
                reason: "expected id=url".to_string(),
            })?;

        let parsed = reqwest::Url::parse(url).map_err(|e| ConfigError::InvalidEndpoint {
            entry: entry.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(ConfigError::InvalidEndpoint {
                entry: entry.to_string(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        if !seen.insert(id.to_string()) {
            return Err(ConfigError::DuplicateEndpoint(id.to_string()));
        }
        endpoints.push(EndpointConfig {
            id: id.to_string(),
            url: url.to_string(),
        });
    }

    Ok(endpoints)
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {var}: {reason}")]
    InvalidValue {
        var: String,
        value: String,
        reason: String,
    },

    #[error("Invalid endpoint '{entry}': {reason}")]
    InvalidEndpoint { entry: String, reason: String },

    #[error("Endpoint '{0}' is configured more than once")]
    DuplicateEndpoint(String),
}

impl ConfigError {
    fn invalid(var: &str, value: &str, reason: impl std::fmt::Display) -> Self {
        ConfigError::InvalidValue {
            var: var.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}
