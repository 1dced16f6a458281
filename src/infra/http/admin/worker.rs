use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::infra::clients::OpenedWindow;

use super::super::GatewayState;

#[derive(Debug, Serialize)]
pub(super) struct WorkerStatus {
    worker_id: Option<Uuid>,
    state: &'static str,
    scope: String,
    static_partition: String,
    dynamic_partition: String,
    update_available: bool,
    background_events: usize,
    controlled_clients: usize,
    opened_windows: Vec<OpenedWindow>,
}

#[derive(Debug, Serialize)]
pub(super) struct PartitionView {
    name: String,
    entries: usize,
    current: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct UpdateView {
    worker_id: Uuid,
    state: &'static str,
    deleted: Vec<String>,
    failed: Vec<String>,
    claimed: usize,
    update_available: bool,
}

pub(super) async fn worker_status(State(state): State<GatewayState>) -> Json<WorkerStatus> {
    let active = state.registration.active();
    let config = active
        .as_ref()
        .map(|controller| controller.config().clone())
        .unwrap_or_else(|| state.worker_config.as_ref().clone());

    Json(WorkerStatus {
        worker_id: active.as_ref().map(|controller| controller.id()),
        state: active
            .as_ref()
            .map_or("unregistered", |controller| controller.state().as_str()),
        scope: config.scope.to_string(),
        static_partition: config.static_partition,
        dynamic_partition: config.dynamic_partition,
        update_available: state.registration.update_available(),
        background_events: state.registration.background_events(),
        controlled_clients: state.clients.controlled(),
        opened_windows: state.clients.opened_windows(),
    })
}

pub(super) async fn list_partitions(
    State(state): State<GatewayState>,
) -> Result<Json<Vec<PartitionView>>, AppError> {
    let storage = &state.registration.context().storage;
    let active = state.registration.active();

    let mut partitions = Vec::new();
    for name in storage.keys().await? {
        let entries = storage.len(&name).await?;
        let current = active
            .as_ref()
            .is_some_and(|controller| controller.config().is_current(&name));
        partitions.push(PartitionView {
            name,
            entries,
            current,
        });
    }
    Ok(Json(partitions))
}

pub(super) async fn update_worker(
    State(state): State<GatewayState>,
) -> Result<Json<UpdateView>, AppError> {
    let (controller, report) = state
        .registration
        .register(Arc::clone(&state.worker_config))
        .await?;

    Ok(Json(UpdateView {
        worker_id: controller.id(),
        state: controller.state().as_str(),
        deleted: report.deleted,
        failed: report.failed,
        claimed: report.claimed,
        update_available: state.registration.update_available(),
    }))
}

pub(super) async fn unregister_worker(
    State(state): State<GatewayState>,
) -> Result<StatusCode, AppError> {
    if state.registration.unregister() {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NoActiveWorker)
    }
}
