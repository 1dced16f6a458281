use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::{rw_read, rw_write};
use crate::worker::{Notification, Notifier, NotifyError};

const SOURCE: &str = "infra::notifications";

pub const DEFAULT_RETAINED_NOTIFICATIONS: usize = 64;

/// Notifications currently on display, oldest first. At capacity the oldest
/// one is dismissed to make room.
pub struct NotificationCenter {
    shown: RwLock<VecDeque<Notification>>,
    limit: NonZeroUsize,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::with_limit(
            NonZeroUsize::new(DEFAULT_RETAINED_NOTIFICATIONS).unwrap_or(NonZeroUsize::MIN),
        )
    }
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: NonZeroUsize) -> Self {
        Self {
            shown: RwLock::new(VecDeque::new()),
            limit,
        }
    }

    pub fn list(&self) -> Vec<Notification> {
        rw_read(&self.shown, SOURCE, "list").iter().cloned().collect()
    }
}

#[async_trait]
impl Notifier for NotificationCenter {
    async fn show(&self, notification: Notification) -> Result<(), NotifyError> {
        info!(notification = %notification.id, title = %notification.title, "Showing notification");
        let mut shown = rw_write(&self.shown, SOURCE, "show");
        if shown.len() >= self.limit.get() {
            if let Some(dismissed) = shown.pop_front() {
                debug!(notification = %dismissed.id, "Dismissed oldest notification");
            }
        }
        shown.push_back(notification);
        Ok(())
    }

    async fn close(&self, id: Uuid) -> Result<(), NotifyError> {
        let mut shown = rw_write(&self.shown, SOURCE, "close");
        let position = shown
            .iter()
            .position(|notification| notification.id == id)
            .ok_or(NotifyError::UnknownNotification(id))?;
        shown.remove(position);
        Ok(())
    }
}
