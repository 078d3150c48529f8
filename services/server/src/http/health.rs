use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

pub async fn root() -> impl IntoResponse {
    "Running"
}

pub async fn ping() -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}
