use axum::Json;
use serde_json::{Value, json};

pub(super) async fn admin_health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
