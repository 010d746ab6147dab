//! Notification configuration document (`notifications.json`).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::atomic;
use crate::error::StoreResult;

/// Notifier service kind; drives the Apprise URL builder.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    /// Discord webhook.
    Discord,
    /// Telegram bot.
    Telegram,
    /// Slack webhook.
    Slack,
    /// Pushover application.
    Pushover,
    /// ntfy topic.
    Ntfy,
    /// Gotify server.
    Gotify,
    /// SMTP mail.
    Email,
    /// Plain HTTP webhook.
    Webhook,
    /// Raw Apprise URL supplied by the user.
    Custom,
}

/// Per-event-type enable map over the fixed event set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvents {
    /// Fire on record admission.
    pub download_added: bool,
    /// Fire on first completion.
    pub download_finished: bool,
    /// Fire on category reassignment.
    pub category_changed: bool,
    /// Fire when a payload is relocated.
    pub file_moved: bool,
    /// Fire when a payload is deleted.
    pub file_deleted: bool,
}

impl Default for NotificationEvents {
    fn default() -> Self {
        Self {
            download_added: false,
            download_finished: true,
            category_changed: false,
            file_moved: false,
            file_deleted: false,
        }
    }
}

/// One configured notification target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationService {
    /// Stable identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Service kind.
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    /// Whether this target receives events.
    pub enabled: bool,
    /// Opaque type-specific options (tokens, chat ids, URLs).
    #[serde(default)]
    pub options: serde_json::Value,
}

/// Top-level notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotificationsConfig {
    /// Master enable flag.
    pub enabled: bool,
    /// Per-event enables.
    #[serde(default)]
    pub events: NotificationEvents,
    /// Configured targets.
    #[serde(default)]
    pub services: Vec<NotificationService>,
}

/// File-backed notification configuration.
#[derive(Debug, Clone)]
pub struct NotificationsStore {
    path: PathBuf,
}

impl NotificationsStore {
    /// Construct a store rooted at the provided file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the configuration; a missing file yields the disabled default.
    ///
    /// # Errors
    ///
    /// Returns an error when an existing document cannot be read or parsed.
    pub fn load(&self) -> StoreResult<NotificationsConfig> {
        Ok(atomic::read_json(&self.path)?.unwrap_or_default())
    }

    /// Persist the configuration atomically.
    ///
    /// # Errors
    ///
    /// Returns an error when the document cannot be written.
    pub fn save(&self, config: &NotificationsConfig) -> StoreResult<()> {
        atomic::write_json(&self.path, config)
    }
}
