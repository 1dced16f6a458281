//! HTTP client for the storefront backend.
//!
//! Intercepted requests carry URLs in the worker's scope; the client keeps
//! the path and query and sends them to the configured upstream origin.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, Method, header},
    response::Response,
};
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use crate::config::UpstreamSettings;
use crate::worker::{ActionReplayer, FetchRequest, Network, NetworkError, OfflineAction, SyncError};

use super::error::InfraError;

const HOP_BY_HOP: &[HeaderName] = &[
    header::CONNECTION,
    header::HOST,
    header::CONTENT_LENGTH,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[derive(Clone, Debug)]
pub struct UpstreamClient {
    client: Client,
    base: Url,
}

impl UpstreamClient {
    pub fn new(settings: &UpstreamSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(settings.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| InfraError::upstream(format!("failed to build client: {err}")))?;

        Ok(Self {
            client,
            base: settings.base_url.clone(),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("storefront-offline/", env!("CARGO_PKG_VERSION"))
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Rebase `url` onto the upstream origin, keeping path and query.
    pub fn target(&self, url: &Url) -> Result<Url, NetworkError> {
        let mut target = self.base.join(url.path()).map_err(|err| {
            NetworkError::Unreachable(format!("cannot rebase `{url}` onto upstream: {err}"))
        })?;
        target.set_query(url.query());
        Ok(target)
    }
}

fn forwardable(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = headers.clone();
    for name in HOP_BY_HOP {
        forwarded.remove(name);
    }
    forwarded
}

fn map_send_error(err: reqwest::Error) -> NetworkError {
    if err.is_timeout() {
        NetworkError::Timeout
    } else {
        NetworkError::Unreachable(err.to_string())
    }
}

#[async_trait]
impl Network for UpstreamClient {
    #[instrument(skip_all, fields(method = %request.method, path = %request.url.path()))]
    async fn fetch(&self, request: &FetchRequest) -> Result<Response, NetworkError> {
        let target = self.target(&request.url)?;

        let upstream = self
            .client
            .request(request.method.clone(), target)
            .headers(forwardable(&request.headers))
            .body(request.body.clone())
            .send()
            .await
            .map_err(map_send_error)?;

        let status = upstream.status();
        let headers = forwardable(upstream.headers());
        let body = upstream.bytes().await.map_err(|err| {
            if err.is_timeout() {
                NetworkError::Timeout
            } else {
                NetworkError::Body(err.to_string())
            }
        })?;
        debug!(status = status.as_u16(), bytes = body.len(), "Upstream responded");

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

#[async_trait]
impl ActionReplayer for UpstreamClient {
    #[instrument(skip_all, fields(action = %action.id, method = %action.method, path = %action.path))]
    async fn replay(&self, action: &OfflineAction) -> Result<(), SyncError> {
        let replay_error = |reason: String| SyncError::Replay {
            id: action.id,
            reason,
        };

        let method = Method::from_bytes(action.method.as_bytes())
            .map_err(|err| replay_error(format!("invalid method: {err}")))?;
        let url = self
            .base
            .join(&action.path)
            .map_err(|err| replay_error(format!("invalid path: {err}")))?;

        let response = self
            .client
            .request(method, url)
            .json(&action.body)
            .send()
            .await
            .map_err(|err| replay_error(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(replay_error(format!("upstream returned status {status}")));
        }
        Ok(())
    }
}
