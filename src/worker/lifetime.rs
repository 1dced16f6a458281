//! Event lifetimes.
//!
//! Work spawned while handling an event (for example the cache write behind
//! a network-first response) must finish before the worker may go away.
//! Handlers register that work with the event's [`EventLifetime`]; whoever
//! owns the event settles it, or hands it to [`BackgroundTasks`] so shutdown
//! can wait for it.

use std::future::Future;
use std::sync::Mutex;

use metrics::gauge;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::cache::mutex_lock;

const SOURCE: &str = "worker::lifetime";

/// Lifetime token of a single event.
///
/// Dropping a lifetime without settling it aborts the tasks it still holds.
pub struct EventLifetime {
    event: &'static str,
    tasks: Mutex<JoinSet<()>>,
}

impl EventLifetime {
    pub fn new(event: &'static str) -> Self {
        Self {
            event,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn event(&self) -> &'static str {
        self.event
    }

    /// Extend the event until `future` completes.
    pub fn wait_until<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        mutex_lock(&self.tasks, SOURCE, "wait_until").spawn(future);
    }

    /// Number of registered tasks that have not been joined yet.
    pub fn pending(&self) -> usize {
        mutex_lock(&self.tasks, SOURCE, "pending").len()
    }

    /// Wait for every registered task. Returns how many completed cleanly.
    pub async fn settle(self) -> usize {
        let event = self.event;
        let mut tasks = self
            .tasks
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut settled = 0;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(()) => settled += 1,
                Err(err) => warn!(event, error = %err, "Event task did not complete"),
            }
        }
        settled
    }
}

/// Tracker for settled-later event lifetimes.
#[derive(Default)]
pub struct BackgroundTasks {
    tasks: Mutex<JoinSet<usize>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `lifetime` alive in the background until it settles.
    pub fn adopt(&self, lifetime: EventLifetime) {
        if lifetime.pending() == 0 {
            return;
        }

        let mut tasks = mutex_lock(&self.tasks, SOURCE, "adopt");
        while tasks.try_join_next().is_some() {}
        tasks.spawn(lifetime.settle());
        gauge!("storefront_offline_background_events").set(tasks.len() as f64);
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.tasks, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for every adopted lifetime. Returns the number of tasks settled.
    pub async fn drain(&self) -> usize {
        let mut tasks = std::mem::take(&mut *mutex_lock(&self.tasks, SOURCE, "drain"));

        let mut settled = 0;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(count) => settled += count,
                Err(err) => warn!(error = %err, "Background event did not settle"),
            }
        }
        gauge!("storefront_offline_background_events").set(0.0);
        debug!(settled, "Background event tasks drained");
        settled
    }
}
