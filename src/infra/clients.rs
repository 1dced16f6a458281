//! Client tracking for the gateway.
//!
//! A client is a browser seen on the public listener, keyed by remote
//! address. Window-open requests cannot be executed server-side; they are
//! recorded so the admin surface can report them.
//!
//! Both collections are bounded: the least recently seen client and the
//! oldest window request are dropped first.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::RwLock;

use async_trait::async_trait;
use lru::LruCache;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::info;
use url::Url;

use crate::cache::{rw_read, rw_write};
use crate::worker::{ClientError, Clients};

const SOURCE: &str = "infra::clients";

pub const DEFAULT_TRACKED_CLIENTS: usize = 1024;
pub const DEFAULT_RETAINED_WINDOWS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientRecord {
    pub id: String,
    pub controlled: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenedWindow {
    pub url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub requested_at: OffsetDateTime,
}

pub struct ClientRegistry {
    clients: RwLock<LruCache<String, ClientRecord>>,
    windows: RwLock<VecDeque<OpenedWindow>>,
    window_limit: NonZeroUsize,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::with_limits(
            NonZeroUsize::new(DEFAULT_TRACKED_CLIENTS).unwrap_or(NonZeroUsize::MIN),
            NonZeroUsize::new(DEFAULT_RETAINED_WINDOWS).unwrap_or(NonZeroUsize::MIN),
        )
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(clients: NonZeroUsize, windows: NonZeroUsize) -> Self {
        Self {
            clients: RwLock::new(LruCache::new(clients)),
            windows: RwLock::new(VecDeque::new()),
            window_limit: windows,
        }
    }

    /// Record a request from `id`. Clients that load while a worker is
    /// active are controlled from the start.
    pub fn observe(&self, id: impl Into<String>, controlled: bool) {
        let id = id.into();
        let now = OffsetDateTime::now_utc();
        let mut clients = rw_write(&self.clients, SOURCE, "observe");
        if let Some(record) = clients.get_mut(&id) {
            record.controlled |= controlled;
            record.last_seen = now;
            return;
        }
        clients.put(
            id.clone(),
            ClientRecord {
                id,
                controlled,
                last_seen: now,
            },
        );
    }

    /// Tracked clients ordered by id.
    pub fn clients(&self) -> Vec<ClientRecord> {
        let mut records: Vec<ClientRecord> = rw_read(&self.clients, SOURCE, "clients")
            .iter()
            .map(|(_, record)| record.clone())
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    pub fn controlled(&self) -> usize {
        rw_read(&self.clients, SOURCE, "controlled")
            .iter()
            .filter(|(_, record)| record.controlled)
            .count()
    }

    pub fn opened_windows(&self) -> Vec<OpenedWindow> {
        rw_read(&self.windows, SOURCE, "opened_windows")
            .iter()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Clients for ClientRegistry {
    async fn claim(&self) -> Result<usize, ClientError> {
        let mut clients = rw_write(&self.clients, SOURCE, "claim");
        for (_, record) in clients.iter_mut() {
            record.controlled = true;
        }
        Ok(clients.len())
    }

    async fn open_window(&self, url: &str) -> Result<(), ClientError> {
        Url::parse(url).map_err(|err| ClientError::OpenWindow {
            url: url.to_string(),
            reason: err.to_string(),
        })?;

        let mut windows = rw_write(&self.windows, SOURCE, "open_window");
        if windows.len() >= self.window_limit.get() {
            windows.pop_front();
        }
        windows.push_back(OpenedWindow {
            url: url.to_string(),
            requested_at: OffsetDateTime::now_utc(),
        });
        info!(url, "Window open requested");
        Ok(())
    }
}
