//! Alert notification dispatch
//!
//! Alerts arrive from an external evaluator and are fanned out to the in-app,
//! email and webhook channels according to the user's notification preferences.

pub mod dispatcher;
pub mod evaluator;
pub mod history;
pub mod model;
pub mod notifier;
pub mod preferences;

pub use dispatcher::{DispatchReport, DispatcherConfig, NotificationDispatcher};
pub use evaluator::{spawn_evaluator, AlertEvaluator};
pub use history::{ChannelKind, NotificationHistory, NotificationRecord};
pub use model::{Alert, AlertStatus, Severity};
pub use notifier::{
    DeliveryError, EmailChannel, EmailConfig, EmailTransportConfig, InAppChannel, InAppPermission,
    NotificationChannel, NotifierError, WebhookChannel,
};
pub use preferences::{
    ChannelsEnabled, NotificationPreferences, PreferencesError, PreferencesUpdate, QuietHours,
};
