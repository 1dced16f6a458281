//! Worker registration and version handover.
//!
//! A new version installs while the current one keeps serving. Install
//! success skips the waiting phase: the new version activates at once and
//! the previous one is retired. Install failure leaves the previous version
//! in control.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::cache::{rw_read, rw_write};

use super::config::ControllerConfig;
use super::controller::{ActivationReport, InstallError, OfflineCacheController, WorkerContext};
use super::lifecycle::LifecycleError;
use super::lifetime::{BackgroundTasks, EventLifetime};

const SOURCE: &str = "worker::registration";

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("worker install failed")]
    Install(#[from] InstallError),
    #[error("worker activation failed")]
    Activate(#[from] LifecycleError),
}

pub struct Registration {
    context: WorkerContext,
    active: RwLock<Option<Arc<OfflineCacheController>>>,
    update_available: AtomicBool,
    background: BackgroundTasks,
    /// Held for a whole install-and-activate so versions hand over in order.
    handover: Mutex<()>,
}

impl Registration {
    pub fn new(context: WorkerContext) -> Self {
        Self {
            context,
            active: RwLock::new(None),
            update_available: AtomicBool::new(false),
            background: BackgroundTasks::new(),
            handover: Mutex::new(()),
        }
    }

    pub fn context(&self) -> &WorkerContext {
        &self.context
    }

    /// The version currently controlling clients, if any.
    pub fn active(&self) -> Option<Arc<OfflineCacheController>> {
        rw_read(&self.active, SOURCE, "active").clone()
    }

    /// True once a new version installed while an older one was in control.
    pub fn update_available(&self) -> bool {
        self.update_available.load(Ordering::SeqCst)
    }

    /// Install `config` as a new version and hand control over to it.
    pub async fn register(
        &self,
        config: Arc<ControllerConfig>,
    ) -> Result<(Arc<OfflineCacheController>, ActivationReport), RegistrationError> {
        let _handover = self.handover.lock().await;
        let candidate = Arc::new(OfflineCacheController::new(
            config,
            self.context.clone(),
        ));

        if let Err(err) = candidate.install().await {
            if self.active().is_some() {
                warn!(worker = %candidate.id(), "New worker version failed to install; previous version keeps serving");
            }
            return Err(err.into());
        }

        if self.active().is_some() {
            self.update_available.store(true, Ordering::SeqCst);
            info!(worker = %candidate.id(), "New worker version installed; update available");
        }

        let report = candidate.activate().await?;
        let previous = rw_write(&self.active, SOURCE, "register").replace(Arc::clone(&candidate));

        if let Some(previous) = previous {
            if let Err(err) = previous.retire() {
                warn!(worker = %previous.id(), error = %err, "Failed to retire superseded worker");
            }
            info!(previous = %previous.id(), current = %candidate.id(), "Worker version superseded");
        }

        Ok((candidate, report))
    }

    /// Drop the active version; requests pass through afterwards and the
    /// next registration counts as a first install.
    pub fn unregister(&self) -> bool {
        let previous = rw_write(&self.active, SOURCE, "unregister").take();
        self.update_available.store(false, Ordering::SeqCst);
        match previous {
            Some(controller) => {
                if let Err(err) = controller.retire() {
                    warn!(worker = %controller.id(), error = %err, "Failed to retire unregistered worker");
                }
                info!(worker = %controller.id(), "Worker unregistered");
                true
            }
            None => false,
        }
    }

    /// Fetch events whose cache writes are still in flight.
    pub fn background_events(&self) -> usize {
        self.background.len()
    }

    /// Keep a fetch event's pending writes alive past the response.
    pub fn keep_alive(&self, lifetime: EventLifetime) {
        self.background.adopt(lifetime);
    }

    /// Wait for all kept-alive writes. Called on shutdown.
    pub async fn shutdown(&self) -> usize {
        self.background.drain().await
    }
}
