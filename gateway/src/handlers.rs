use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

pub async fn live() -> impl IntoResponse {
    Json(json!({"status": "live"}))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

pub async fn ready() -> impl IntoResponse {
    Json(json!({"status": "ready"}))
}

pub async fn ping() -> impl IntoResponse {
    Json(json!({}))
}

pub async fn server_time() -> impl IntoResponse {
    Json(json!({"serverTime": chrono::Utc::now().timestamp_millis()}))
}

pub async fn metrics() -> impl IntoResponse {
    // Prometheus histogram/collector definitions are an external collaborator
    // this endpoint only needs to exist on the surface.
    "# metrics collection is wired in by the deployment's Prometheus exporter\n"
}
