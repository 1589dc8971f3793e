//! Minimal health surface: `/live` always 200, `/ready` and
//! `/health` reflect the consumer loop's staleness per
//! `xcore::health::EVENT_LOOP_STALENESS_THRESHOLD_MS`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use xcore::health::{LoopHealth, EVENT_LOOP_STALENESS_THRESHOLD_MS};

pub async fn live() -> impl IntoResponse {
    Json(json!({"status": "live"}))
}

pub async fn health(State(health): State<LoopHealth>) -> impl IntoResponse {
    render(&health)
}

pub async fn ready(State(health): State<LoopHealth>) -> impl IntoResponse {
    render(&health)
}

fn render(health: &LoopHealth) -> impl IntoResponse {
    let healthy = health.is_healthy(EVENT_LOOP_STALENESS_THRESHOLD_MS);
    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    let body = json!({
            "status": if healthy { "ok" } else { "unhealthy" },
            "stalenessMs": health.staleness_ms(),
            "tickCount": health.tick_count(),
            "lastError": health.last_error(),
    });
    (status, Json(body))
}
