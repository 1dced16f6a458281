//! Background sync: replay of actions queued while offline.
//!
//! Replays run in queue order. The queue is only acknowledged once every
//! replay succeeded, so a failed sync leaves it intact for the next attempt
//! and replay is at-least-once.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::cache::mutex_lock;

const SOURCE: &str = "worker::sync";

/// A write the storefront could not send while offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineAction {
    pub id: Uuid,
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub body: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub queued_at: OffsetDateTime,
}

impl OfflineAction {
    pub fn new(method: impl Into<String>, path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            method: method.into(),
            path: path.into(),
            body,
            queued_at: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The tag is not ours.
    Ignored,
    Completed { replayed: usize },
    /// The queue was left intact for the next sync.
    Failed { error: String },
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("offline action queue failed: {0}")]
    Queue(String),
    #[error("replay of offline action `{id}` failed: {reason}")]
    Replay { id: Uuid, reason: String },
}

/// Durable log of offline actions.
#[async_trait]
pub trait OfflineActionQueue: Send + Sync {
    async fn enqueue(&self, action: OfflineAction) -> Result<(), SyncError>;

    /// Pending actions in the order they were queued.
    async fn pending(&self) -> Result<Vec<OfflineAction>, SyncError>;

    /// Drop the given actions once they have been replayed.
    async fn acknowledge(&self, ids: &[Uuid]) -> Result<(), SyncError>;
}

/// Sends one queued action to the backend.
#[async_trait]
pub trait ActionReplayer: Send + Sync {
    async fn replay(&self, action: &OfflineAction) -> Result<(), SyncError>;
}

/// Process-local offline action queue.
#[derive(Default)]
pub struct MemoryActionQueue {
    actions: Mutex<Vec<OfflineAction>>,
}

impl MemoryActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.actions, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl OfflineActionQueue for MemoryActionQueue {
    async fn enqueue(&self, action: OfflineAction) -> Result<(), SyncError> {
        mutex_lock(&self.actions, SOURCE, "enqueue").push(action);
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<OfflineAction>, SyncError> {
        Ok(mutex_lock(&self.actions, SOURCE, "pending").clone())
    }

    async fn acknowledge(&self, ids: &[Uuid]) -> Result<(), SyncError> {
        mutex_lock(&self.actions, SOURCE, "acknowledge").retain(|action| !ids.contains(&action.id));
        Ok(())
    }
}

/// Replay every pending action, then acknowledge them all.
pub async fn drain_offline_actions(
    queue: &dyn OfflineActionQueue,
    replayer: &dyn ActionReplayer,
) -> Result<usize, SyncError> {
    let actions = queue.pending().await?;

    for action in &actions {
        replayer.replay(action).await?;
    }

    let ids: Vec<Uuid> = actions.iter().map(|action| action.id).collect();
    queue.acknowledge(&ids).await?;
    Ok(ids.len())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct RecordingReplayer {
        replayed: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    impl RecordingReplayer {
        fn new(fail_on: Option<&str>) -> Self {
            Self {
                replayed: Mutex::new(Vec::new()),
                fail_on: fail_on.map(str::to_string),
            }
        }

        fn replayed(&self) -> Vec<String> {
            self.replayed.lock().expect("replayed lock").clone()
        }
    }

    #[async_trait]
    impl ActionReplayer for RecordingReplayer {
        async fn replay(&self, action: &OfflineAction) -> Result<(), SyncError> {
            if self.fail_on.as_deref() == Some(action.path.as_str()) {
                return Err(SyncError::Replay {
                    id: action.id,
                    reason: "backend unreachable".to_string(),
                });
            }
            self.replayed
                .lock()
                .expect("replayed lock")
                .push(action.path.clone());
            Ok(())
        }
    }

    async fn queue_with(paths: &[&str]) -> MemoryActionQueue {
        let queue = MemoryActionQueue::new();
        for path in paths {
            queue
                .enqueue(OfflineAction::new("POST", *path, json!({"quantity": 1})))
                .await
                .expect("enqueue");
        }
        queue
    }

    #[tokio::test]
    async fn drain_replays_in_order_and_clears() {
        let queue = queue_with(&["/api/cart/1", "/api/cart/2", "/api/orders"]).await;
        let replayer = RecordingReplayer::new(None);

        let replayed = drain_offline_actions(&queue, &replayer)
            .await
            .expect("drain");

        assert_eq!(replayed, 3);
        assert_eq!(
            replayer.replayed(),
            vec!["/api/cart/1", "/api/cart/2", "/api/orders"]
        );
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn failed_replay_leaves_queue_intact() {
        let queue = queue_with(&["/api/cart/1", "/api/orders", "/api/cart/2"]).await;
        let replayer = RecordingReplayer::new(Some("/api/orders"));

        let err = drain_offline_actions(&queue, &replayer)
            .await
            .expect_err("replay failure");

        assert!(matches!(err, SyncError::Replay { .. }));
        assert_eq!(replayer.replayed(), vec!["/api/cart/1"]);
        assert_eq!(queue.len(), 3);
    }

    #[tokio::test]
    async fn acknowledge_keeps_actions_queued_during_replay() {
        let queue = queue_with(&["/api/cart/1"]).await;
        let pending = queue.pending().await.expect("pending");

        queue
            .enqueue(OfflineAction::new("POST", "/api/orders", json!({})))
            .await
            .expect("enqueue");
        let ids: Vec<Uuid> = pending.iter().map(|a| a.id).collect();
        queue.acknowledge(&ids).await.expect("acknowledge");

        let left = queue.pending().await.expect("pending");
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].path, "/api/orders");
    }

    #[test]
    fn offline_action_round_trips_through_json() {
        let action = OfflineAction::new("POST", "/api/orders", json!({"items": [1, 2]}));
        let encoded = serde_json::to_string(&action).expect("encode");
        let decoded: OfflineAction = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded.id, action.id);
        assert_eq!(decoded.body, action.body);
        assert_eq!(decoded.queued_at.unix_timestamp(), action.queued_at.unix_timestamp());
    }
}
