use crate::session::SessionManager;
use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};
use std::sync::Arc;

pub async fn health_check(State(manager): State<Arc<SessionManager>>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "pmp-session",
            "provider": manager.provider().name(),
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}
