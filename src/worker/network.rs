//! Network seam and response duplication.

use async_trait::async_trait;
use axum::{body::Body, response::Response};
use http_body_util::BodyExt;
use thiserror::Error;

use crate::cache::CachedResponse;

use super::classify::FetchRequest;

#[derive(Debug, Clone, Error)]
pub enum NetworkError {
    #[error("network unreachable: {0}")]
    Unreachable(String),
    #[error("request timed out")]
    Timeout,
    #[error("failed to read response body: {0}")]
    Body(String),
}

/// Outbound HTTP used by the controller.
#[async_trait]
pub trait Network: Send + Sync {
    /// Resolves with any HTTP status; only transport failures are errors.
    async fn fetch(&self, request: &FetchRequest) -> Result<Response, NetworkError>;
}

/// Buffer `response` once and return a live copy plus a stored copy.
///
/// A body can be consumed only once, so any path that both returns and
/// stores a response must go through here before either copy is read.
pub async fn tee_response(response: Response) -> Result<(Response, CachedResponse), NetworkError> {
    let (parts, body) = response.into_parts();
    let bytes = body
        .collect()
        .await
        .map_err(|err| NetworkError::Body(err.to_string()))?
        .to_bytes();

    let stored = CachedResponse::new(parts.status, &parts.headers, bytes.clone());
    let live = Response::from_parts(parts, Body::from(bytes));
    Ok((live, stored))
}

/// Buffer `response` into a snapshot when only the stored copy is needed.
pub async fn snapshot_response(response: Response) -> Result<CachedResponse, NetworkError> {
    let (parts, body) = response.into_parts();
    let bytes = body
        .collect()
        .await
        .map_err(|err| NetworkError::Body(err.to_string()))?
        .to_bytes();
    Ok(CachedResponse::new(parts.status, &parts.headers, bytes))
}
