//! Offline cache controller.
//!
//! One controller is one worker version. It precaches the app shell at
//! install, prunes stale partitions at activation, then answers intercepted
//! fetches with the strategy bound to each request's classification.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Instant;

use axum::response::Response;
use futures::future::{join_all, try_join_all};
use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::cache::{CacheStorage, CachedResponse, RequestKey, StorageError};

use super::classify::{FetchRequest, Strategy, classify};
use super::clients::{ClientError, Clients};
use super::config::ControllerConfig;
use super::lifecycle::{Lifecycle, LifecycleError, WorkerState};
use super::lifetime::EventLifetime;
use super::network::{Network, NetworkError, snapshot_response, tee_response};
use super::push::{ClickOutcome, EXPLORE_ACTION, Notification, Notifier, NotifyError};
use super::sync::{ActionReplayer, OfflineActionQueue, SyncOutcome, drain_offline_actions};

/// Collaborators shared by every worker version.
#[derive(Clone)]
pub struct WorkerContext {
    pub storage: Arc<dyn CacheStorage>,
    pub network: Arc<dyn Network>,
    pub clients: Arc<dyn Clients>,
    pub notifier: Arc<dyn Notifier>,
    pub actions: Arc<dyn OfflineActionQueue>,
    pub replayer: Arc<dyn ActionReplayer>,
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("precache request for `{url}` failed")]
    Request {
        url: String,
        #[source]
        source: NetworkError,
    },
    #[error("precache request for `{url}` returned status {status}")]
    Status { url: String, status: u16 },
    #[error("precache path `{path}` is not a valid URL: {reason}")]
    InvalidPath { path: String, reason: String },
    #[error("failed to write precached entries")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network request for `{key}` failed")]
    Network {
        key: RequestKey,
        #[source]
        source: NetworkError,
    },
    #[error("network request for `{key}` failed and no cached copy exists")]
    Unavailable {
        key: RequestKey,
        #[source]
        source: NetworkError,
    },
}

/// Result of dispatching an intercepted request.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The controller stays out of the way; the request goes to the network as-is.
    Passthrough,
    Response(Response),
}

/// Partition cleanup performed at activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
    pub claimed: usize,
}

pub struct OfflineCacheController {
    id: Uuid,
    config: Arc<ControllerConfig>,
    lifecycle: Lifecycle,
    context: WorkerContext,
}

impl OfflineCacheController {
    pub fn new(config: Arc<ControllerConfig>, context: WorkerContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            lifecycle: Lifecycle::new(),
            context,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn state(&self) -> WorkerState {
        self.lifecycle.state()
    }

    /// Precache the app shell, all or nothing.
    ///
    /// Every manifest URL must come back with a 2xx status before anything is
    /// written; the batch then lands in the static partition in one write. On
    /// failure the version is redundant and must be discarded.
    #[instrument(skip_all, fields(worker = %self.id, partition = %self.config.static_partition))]
    pub async fn install(&self) -> Result<(), InstallError> {
        self.lifecycle.advance(WorkerState::Installing)?;
        let started = Instant::now();

        match self.precache().await {
            Ok(entries) => {
                histogram!("storefront_offline_install_ms")
                    .record(started.elapsed().as_secs_f64() * 1000.0);
                self.lifecycle.advance(WorkerState::Installed)?;
                info!(entries, "Precached app shell");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Install failed; discarding worker version");
                self.lifecycle.advance(WorkerState::Redundant)?;
                Err(err)
            }
        }
    }

    async fn precache(&self) -> Result<usize, InstallError> {
        let requests = self
            .config
            .precache
            .iter()
            .map(|path| {
                self.config
                    .resolve(path)
                    .map(FetchRequest::get)
                    .map_err(|err| InstallError::InvalidPath {
                        path: path.clone(),
                        reason: err.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let entries = try_join_all(requests.iter().map(|request| self.precache_one(request))).await?;
        let count = entries.len();

        self.context
            .storage
            .put_all(&self.config.static_partition, entries)
            .await?;
        Ok(count)
    }

    async fn precache_one(
        &self,
        request: &FetchRequest,
    ) -> Result<(RequestKey, CachedResponse), InstallError> {
        let url = request.url.to_string();
        let response =
            self.context
                .network
                .fetch(request)
                .await
                .map_err(|source| InstallError::Request {
                    url: url.clone(),
                    source,
                })?;

        let status = response.status();
        if !status.is_success() {
            return Err(InstallError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let stored = snapshot_response(response)
            .await
            .map_err(|source| InstallError::Request { url, source })?;
        Ok((request.key(), stored))
    }

    /// Delete stale partitions, claim clients and become active.
    ///
    /// Cleanup is best-effort: a partition that cannot be deleted is logged
    /// and skipped, and never blocks promotion.
    #[instrument(skip_all, fields(worker = %self.id))]
    pub async fn activate(&self) -> Result<ActivationReport, LifecycleError> {
        self.lifecycle.advance(WorkerState::Activating)?;
        let mut report = ActivationReport::default();

        match self.context.storage.keys().await {
            Ok(names) => {
                let stale: Vec<String> = names
                    .into_iter()
                    .filter(|name| !self.config.is_current(name))
                    .collect();
                let results = join_all(stale.iter().map(|name| self.context.storage.delete(name))).await;

                for (name, result) in stale.into_iter().zip(results) {
                    match result {
                        Ok(_) => {
                            info!(partition = %name, "Deleted stale cache partition");
                            report.deleted.push(name);
                        }
                        Err(err) => {
                            warn!(partition = %name, error = %err, "Failed to delete stale cache partition");
                            report.failed.push(name);
                        }
                    }
                }
            }
            Err(err) => warn!(error = %err, "Failed to enumerate cache partitions"),
        }

        match self.context.clients.claim().await {
            Ok(claimed) => report.claimed = claimed,
            Err(err) => warn!(error = %err, "Failed to claim clients"),
        }

        self.lifecycle.advance(WorkerState::Active)?;
        info!(
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            claimed = report.claimed,
            "Worker activated"
        );
        Ok(report)
    }

    /// Mark this version as superseded.
    pub fn retire(&self) -> Result<(), LifecycleError> {
        self.lifecycle.advance(WorkerState::Redundant).map(|_| ())
    }

    /// Answer an intercepted request.
    ///
    /// Cache writes are registered with `lifetime`; the caller must settle it
    /// (or hand it to a background tracker) for the writes to land.
    #[instrument(skip_all, fields(method = %request.method, path = %request.url.path()))]
    pub async fn handle_fetch(
        &self,
        request: &FetchRequest,
        lifetime: &EventLifetime,
    ) -> Result<FetchOutcome, FetchError> {
        if self.state() != WorkerState::Active {
            return Ok(FetchOutcome::Passthrough);
        }

        let classification = classify(&self.config, request);
        let Some(strategy) = classification.strategy() else {
            return Ok(FetchOutcome::Passthrough);
        };
        debug!(?classification, strategy = strategy.as_str(), "Dispatching fetch");

        let response = match strategy {
            Strategy::CacheFirst | Strategy::CacheFirstPopulate => {
                self.cache_first(request, strategy, lifetime).await?
            }
            Strategy::NetworkFirst | Strategy::NetworkFirstOk => {
                self.network_first(request, strategy, lifetime).await?
            }
        };
        Ok(FetchOutcome::Response(response))
    }

    async fn cache_first(
        &self,
        request: &FetchRequest,
        strategy: Strategy,
        lifetime: &EventLifetime,
    ) -> Result<Response, FetchError> {
        let key = request.key();

        if let Some(cached) = self.lookup(&key).await {
            counter!("storefront_offline_cache_hit_total", "strategy" => strategy.as_str())
                .increment(1);
            return Ok(cached.to_response());
        }
        counter!("storefront_offline_cache_miss_total", "strategy" => strategy.as_str())
            .increment(1);

        let network_error = |source: NetworkError| {
            counter!("storefront_offline_network_failure_total", "strategy" => strategy.as_str())
                .increment(1);
            FetchError::Network {
                key: key.clone(),
                source,
            }
        };

        let response = self
            .context
            .network
            .fetch(&outbound(request, strategy))
            .await
            .map_err(network_error)?;

        if !strategy.stores(response.status()) {
            return Ok(response);
        }

        let (live, stored) = tee_response(response).await.map_err(network_error)?;
        self.store_dynamic(key, stored, strategy, lifetime);
        Ok(live)
    }

    async fn network_first(
        &self,
        request: &FetchRequest,
        strategy: Strategy,
        lifetime: &EventLifetime,
    ) -> Result<Response, FetchError> {
        let key = request.key();

        let fetched = match self.context.network.fetch(&outbound(request, strategy)).await {
            Ok(response) if strategy.stores(response.status()) => tee_response(response)
                .await
                .map(|(live, stored)| (live, Some(stored))),
            Ok(response) => Ok((response, None)),
            Err(err) => Err(err),
        };

        match fetched {
            Ok((live, stored)) => {
                if let Some(stored) = stored {
                    self.store_dynamic(key, stored, strategy, lifetime);
                }
                Ok(live)
            }
            Err(source) => {
                counter!("storefront_offline_network_failure_total", "strategy" => strategy.as_str())
                    .increment(1);
                match self.lookup(&key).await {
                    Some(cached) => {
                        debug!(error = %source, "Network failed; serving cached copy");
                        counter!("storefront_offline_fallback_total", "strategy" => strategy.as_str())
                            .increment(1);
                        Ok(cached.to_response())
                    }
                    None => Err(FetchError::Unavailable { key, source }),
                }
            }
        }
    }

    async fn lookup(&self, key: &RequestKey) -> Option<CachedResponse> {
        match self.context.storage.match_request(key).await {
            Ok(found) => found,
            Err(err) => {
                warn!(key = %key, error = %err, "Cache lookup failed; treating as miss");
                None
            }
        }
    }

    fn store_dynamic(
        &self,
        key: RequestKey,
        stored: CachedResponse,
        strategy: Strategy,
        lifetime: &EventLifetime,
    ) {
        let storage = Arc::clone(&self.context.storage);
        let partition = self.config.dynamic_partition.clone();
        let label = strategy.as_str();

        lifetime.wait_until(async move {
            match storage.put(&partition, key.clone(), stored).await {
                Ok(()) => {
                    counter!("storefront_offline_cache_write_total", "strategy" => label)
                        .increment(1);
                    debug!(partition = %partition, key = %key, "Stored response copy");
                }
                Err(err) => {
                    warn!(partition = %partition, key = %key, error = %err, "Failed to store response copy");
                }
            }
        });
    }

    /// Drain the offline action queue when `tag` is the configured sync tag.
    ///
    /// Never fails: errors are logged and reported, and the queue is left
    /// for the next sync.
    #[instrument(skip_all, fields(tag = %tag))]
    pub async fn handle_sync(&self, tag: &str) -> SyncOutcome {
        if tag != self.config.sync_tag {
            debug!("Ignoring sync event with foreign tag");
            return SyncOutcome::Ignored;
        }

        let result =
            drain_offline_actions(self.context.actions.as_ref(), self.context.replayer.as_ref())
                .await;

        match result {
            Ok(replayed) => {
                counter!("storefront_offline_sync_total", "outcome" => "completed").increment(1);
                info!(replayed, "Background sync completed");
                SyncOutcome::Completed { replayed }
            }
            Err(err) => {
                counter!("storefront_offline_sync_total", "outcome" => "failed").increment(1);
                error!(error = %err, "Background sync failed");
                SyncOutcome::Failed {
                    error: err.to_string(),
                }
            }
        }
    }

    /// Show the notification for a push message.
    #[instrument(skip_all)]
    pub async fn handle_push(&self, payload: Option<&[u8]>) -> Result<Notification, NotifyError> {
        let notification = Notification::from_push(&self.config.notification, payload);
        self.context.notifier.show(notification.clone()).await?;
        info!(notification = %notification.id, "Push notification shown");
        Ok(notification)
    }

    /// Close the clicked notification; `explore` also opens the storefront.
    #[instrument(skip_all, fields(notification = %id, action = action.unwrap_or("")))]
    pub async fn handle_notification_click(
        &self,
        id: Uuid,
        action: Option<&str>,
    ) -> Result<ClickOutcome, NotificationClickError> {
        self.context.notifier.close(id).await?;

        if action != Some(EXPLORE_ACTION) {
            return Ok(ClickOutcome::Dismissed);
        }

        let url = self
            .config
            .resolve(&self.config.notification.open_url)
            .map(String::from)
            .unwrap_or_else(|_| self.config.notification.open_url.clone());
        self.context.clients.open_window(&url).await?;
        Ok(ClickOutcome::Opened { url })
    }
}

/// The request sent upstream. Conditional and range headers are dropped when
/// the response may be stored, so the partition only holds full bodies.
fn outbound(request: &FetchRequest, strategy: Strategy) -> Cow<'_, FetchRequest> {
    if strategy.may_store() {
        Cow::Owned(request.unconditional())
    } else {
        Cow::Borrowed(request)
    }
}

#[derive(Debug, Error)]
pub enum NotificationClickError {
    #[error(transparent)]
    Notify(#[from] NotifyError),
    #[error(transparent)]
    Clients(#[from] ClientError),
}
