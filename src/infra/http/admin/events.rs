use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::{Method, StatusCode},
};
use bytes::Bytes;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::HttpError;
use crate::worker::{
    ClickOutcome, Notification, NotificationClickError, NotifyError, OfflineAction,
    OfflineCacheController, SyncOutcome,
};

use super::super::GatewayState;

const SOURCE: &str = "infra::http::admin::events";

#[derive(Debug, Deserialize)]
pub(super) struct SyncRequest {
    tag: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct ClickRequest {
    action: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct NewOfflineAction {
    method: String,
    path: String,
    #[serde(default)]
    body: serde_json::Value,
}

fn active_controller(state: &GatewayState) -> Result<Arc<OfflineCacheController>, HttpError> {
    state.registration.active().ok_or_else(|| {
        HttpError::new(
            SOURCE,
            StatusCode::CONFLICT,
            "No worker is active",
            "event dispatched while no worker version is registered",
        )
    })
}

fn notify_error_to_http(err: &NotifyError) -> HttpError {
    match err {
        NotifyError::UnknownNotification(_) => HttpError::from_error(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Notification not found",
            err,
        ),
        NotifyError::Display(_) => HttpError::from_error(
            SOURCE,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Notification could not be displayed",
            err,
        ),
    }
}

/// Dispatch a push event; the raw request body is the push payload.
pub(super) async fn push(
    State(state): State<GatewayState>,
    payload: Bytes,
) -> Result<Json<Notification>, HttpError> {
    let controller = active_controller(&state)?;
    let payload = (!payload.is_empty()).then_some(payload.as_ref());

    controller
        .handle_push(payload)
        .await
        .map(Json)
        .map_err(|err| notify_error_to_http(&err))
}

pub(super) async fn sync(
    State(state): State<GatewayState>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncOutcome>, HttpError> {
    let controller = active_controller(&state)?;
    Ok(Json(controller.handle_sync(&request.tag).await))
}

pub(super) async fn list_notifications(
    State(state): State<GatewayState>,
) -> Json<Vec<Notification>> {
    Json(state.notifications.list())
}

pub(super) async fn click_notification(
    State(state): State<GatewayState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ClickRequest>,
) -> Result<Json<ClickOutcome>, HttpError> {
    let controller = active_controller(&state)?;

    match controller
        .handle_notification_click(id, request.action.as_deref())
        .await
    {
        Ok(outcome) => Ok(Json(outcome)),
        Err(NotificationClickError::Notify(err)) => Err(notify_error_to_http(&err)),
        Err(err @ NotificationClickError::Clients(_)) => Err(HttpError::from_error(
            SOURCE,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Window could not be opened",
            &err,
        )),
    }
}

pub(super) async fn list_offline_actions(
    State(state): State<GatewayState>,
) -> Result<Json<Vec<OfflineAction>>, HttpError> {
    state
        .registration
        .context()
        .actions
        .pending()
        .await
        .map(Json)
        .map_err(|err| {
            HttpError::from_error(
                SOURCE,
                StatusCode::SERVICE_UNAVAILABLE,
                "Offline action queue unavailable",
                &err,
            )
        })
}

/// Queue a write made while offline, for replay at the next sync.
pub(super) async fn enqueue_offline_action(
    State(state): State<GatewayState>,
    Json(request): Json<NewOfflineAction>,
) -> Result<(StatusCode, Json<OfflineAction>), HttpError> {
    let method = Method::from_bytes(request.method.trim().to_ascii_uppercase().as_bytes())
        .map_err(|err| {
            HttpError::from_error(SOURCE, StatusCode::BAD_REQUEST, "Invalid method", &err)
        })?;
    if !request.path.starts_with('/') {
        return Err(HttpError::new(
            SOURCE,
            StatusCode::BAD_REQUEST,
            "Invalid path",
            format!("path `{}` must start with `/`", request.path),
        ));
    }

    let action = OfflineAction::new(method.as_str(), request.path, request.body);
    state
        .registration
        .context()
        .actions
        .enqueue(action.clone())
        .await
        .map_err(|err| {
            HttpError::from_error(
                SOURCE,
                StatusCode::SERVICE_UNAVAILABLE,
                "Offline action queue unavailable",
                &err,
            )
        })?;

    Ok((StatusCode::CREATED, Json(action)))
}
