use std::net::SocketAddr;

use axum::{
    Router,
    body::{self, Body},
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::error::HttpError;
use crate::worker::{Destination, EventLifetime, FetchOutcome, FetchRequest};

use super::{
    GatewayState,
    middleware::{log_responses, set_request_context},
    upstream_error_to_http,
};

const SOURCE: &str = "infra::http::public";
const FETCH_DEST_HEADER: &str = "sec-fetch-dest";

/// Every path is intercepted; there are no routes of our own on this listener.
pub fn build_public_router(state: GatewayState) -> Router {
    Router::new()
        .fallback(intercept)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn intercept(State(state): State<GatewayState>, request: Request<Body>) -> Response {
    let active = state.registration.active();

    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        state.clients.observe(addr.ip().to_string(), active.is_some());
    }

    let fetch = match into_fetch_request(&state, request).await {
        Ok(fetch) => fetch,
        Err(err) => return err.into_response(),
    };

    let lifetime = EventLifetime::new("fetch");
    let outcome = match active {
        Some(controller) => controller.handle_fetch(&fetch, &lifetime).await,
        None => Ok(FetchOutcome::Passthrough),
    };
    state.registration.keep_alive(lifetime);

    match outcome {
        Ok(FetchOutcome::Response(response)) => response,
        Ok(FetchOutcome::Passthrough) => {
            debug!(method = %fetch.method, path = %fetch.url.path(), "Passing request through");
            match state.registration.context().network.fetch(&fetch).await {
                Ok(response) => response,
                Err(err) => upstream_error_to_http(SOURCE, &err).into_response(),
            }
        }
        Err(err) => upstream_error_to_http(SOURCE, &err).into_response(),
    }
}

async fn into_fetch_request(
    state: &GatewayState,
    request: Request<Body>,
) -> Result<FetchRequest, HttpError> {
    let (parts, body) = request.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = state.scope().join(path_and_query).map_err(|err| {
        HttpError::from_error(SOURCE, StatusCode::BAD_REQUEST, "Invalid request URL", &err)
    })?;

    let body = body::to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|err| {
            HttpError::new(
                SOURCE,
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large",
                err.to_string(),
            )
        })?;

    let destination = parts
        .headers
        .get(FETCH_DEST_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(Destination::from_fetch_dest)
        .unwrap_or_default();

    let mut fetch = FetchRequest::new(parts.method, url).with_destination(destination);
    fetch.headers = parts.headers;
    fetch.body = body;
    Ok(fetch)
}
