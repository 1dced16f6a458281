mod events;
mod health;
mod worker;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};

use super::{
    GatewayState,
    middleware::{log_responses, set_request_context},
};

pub fn build_admin_router(state: GatewayState) -> Router {
    let body_limit = state.max_body_bytes;

    Router::new()
        .route("/health", get(health::admin_health))
        .route(
            "/worker",
            get(worker::worker_status).delete(worker::unregister_worker),
        )
        .route("/partitions", get(worker::list_partitions))
        .route("/update", post(worker::update_worker))
        .route("/push", post(events::push))
        .route("/sync", post(events::sync))
        .route("/notifications", get(events::list_notifications))
        .route(
            "/notifications/{id}/click",
            post(events::click_notification),
        )
        .route(
            "/offline-actions",
            get(events::list_offline_actions).post(events::enqueue_offline_action),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}
