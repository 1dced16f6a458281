//! The offline cache worker.
//!
//! Lifecycle hooks (install, activate, fetch, sync, push, notification
//! click) are methods on [`OfflineCacheController`]; browser facilities are
//! reached through the traits collected in [`WorkerContext`].

mod classify;
mod clients;
mod config;
mod controller;
mod lifecycle;
mod lifetime;
mod network;
mod push;
mod registration;
mod sync;

pub use classify::{Classification, Destination, FetchRequest, Strategy, classify};
pub use clients::{ClientError, Clients};
pub use config::{
    ControllerConfig, DEFAULT_API_PATTERNS, DEFAULT_DYNAMIC_PARTITION, DEFAULT_PRECACHE,
    DEFAULT_SCOPE, DEFAULT_STATIC_PARTITION, DEFAULT_SYNC_TAG, NotificationConfig,
};
pub use controller::{
    ActivationReport, FetchError, FetchOutcome, InstallError, NotificationClickError,
    OfflineCacheController, WorkerContext,
};
pub use lifecycle::{Lifecycle, LifecycleError, WorkerState};
pub use lifetime::{BackgroundTasks, EventLifetime};
pub use network::{Network, NetworkError, snapshot_response, tee_response};
pub use push::{
    CLOSE_ACTION, ClickOutcome, EXPLORE_ACTION, Notification, NotificationAction,
    NotificationData, Notifier, NotifyError, payload_text,
};
pub use registration::{Registration, RegistrationError};
pub use sync::{
    ActionReplayer, MemoryActionQueue, OfflineAction, OfflineActionQueue, SyncError, SyncOutcome,
    drain_offline_actions,
};
