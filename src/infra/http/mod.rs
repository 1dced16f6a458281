//! HTTP surfaces of the gateway.
//!
//! The public listener plays the page: every request it receives is an
//! intercepted fetch. The admin listener drives lifecycle events.

mod admin;
mod middleware;
mod public;

pub use admin::build_admin_router;
pub use public::build_public_router;

use std::error::Error as StdError;
use std::sync::Arc;

use axum::http::StatusCode;
use url::Url;

use crate::error::HttpError;
use crate::worker::{ControllerConfig, Registration};

use super::{clients::ClientRegistry, notifications::NotificationCenter};

/// Shared state of both listeners.
#[derive(Clone)]
pub struct GatewayState {
    pub registration: Arc<Registration>,
    /// Configuration installed by `POST /update`.
    pub worker_config: Arc<ControllerConfig>,
    pub clients: Arc<ClientRegistry>,
    pub notifications: Arc<NotificationCenter>,
    pub max_body_bytes: usize,
}

impl GatewayState {
    pub fn scope(&self) -> &Url {
        &self.worker_config.scope
    }
}

/// Failed intercepted or passed-through fetches surface as `502 Bad Gateway`.
fn upstream_error_to_http(source: &'static str, err: &dyn StdError) -> HttpError {
    HttpError::from_error(source, StatusCode::BAD_GATEWAY, "Upstream unavailable", err)
}
