//! Push notifications and notification clicks.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use super::config::NotificationConfig;

pub const EXPLORE_ACTION: &str = "explore";
pub const CLOSE_ACTION: &str = "close";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationData {
    #[serde(with = "time::serde::rfc3339")]
    pub date_of_arrival: OffsetDateTime,
    pub primary_key: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: String,
}

impl Notification {
    /// Build the notification shown for a push with `payload`.
    pub fn from_push(config: &NotificationConfig, payload: Option<&[u8]>) -> Self {
        let action = |action: &str, title: &str| NotificationAction {
            action: action.to_string(),
            title: title.to_string(),
            icon: config.icon.clone(),
        };

        Self {
            id: Uuid::new_v4(),
            title: config.title.clone(),
            body: payload_text(payload, &config.default_body),
            icon: config.icon.clone(),
            badge: config.badge.clone(),
            vibrate: config.vibrate.clone(),
            data: NotificationData {
                date_of_arrival: OffsetDateTime::now_utc(),
                primary_key: config.primary_key,
            },
            actions: vec![action(EXPLORE_ACTION, "View"), action(CLOSE_ACTION, "Close")],
        }
    }
}

/// Decode a push payload as UTF-8 text.
///
/// Absent, blank or undecodable payloads fall back to `default` instead of
/// failing the push.
pub fn payload_text(payload: Option<&[u8]>, default: &str) -> String {
    payload
        .and_then(|bytes| std::str::from_utf8(bytes).ok())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map_or_else(|| default.to_string(), str::to_string)
}

/// What a notification click led to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClickOutcome {
    Opened { url: String },
    Dismissed,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification `{0}` does not exist")]
    UnknownNotification(Uuid),
    #[error("notification could not be displayed: {0}")]
    Display(String),
}

/// User-visible notification surface.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn show(&self, notification: Notification) -> Result<(), NotifyError>;

    async fn close(&self, id: Uuid) -> Result<(), NotifyError>;
}
