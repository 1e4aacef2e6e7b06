/*
 * Responsibility
 * - GET /health (liveness only; does not touch Postgres or Valkey)
 */
use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}
