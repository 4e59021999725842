// Demo session endpoints

use crate::middleware::Session;
use crate::session::{SessionManager, SessionValue};
use axum::{
    Extension, Json,
    extract::State,
    http::{HeaderMap, StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::sync::Arc;
use tracing::error;

const COUNTER_KEY: &str = "count";

/// Increment and return the per-session visit counter
pub async fn counter(Extension(session): Extension<Session>) -> Response {
    let next = match session.get(COUNTER_KEY) {
        Ok(value) => value.and_then(|v| v.as_i64()).unwrap_or(0) + 1,
        Err(e) => return internal_error(e),
    };

    if let Err(e) = session.set(COUNTER_KEY, SessionValue::Int(next)) {
        return internal_error(e);
    }

    Json(json!({
        "session_id": session.session_id(),
        "count": next,
    }))
    .into_response()
}

/// Issue a new id for the caller's session, keeping its values
pub async fn regenerate(
    State(manager): State<Arc<SessionManager>>,
    mut parts: Parts,
) -> Response {
    let mut headers = HeaderMap::new();

    match manager.regenerate_id(&mut parts, &mut headers).await {
        Ok(store) => {
            let body = Json(json!({ "session_id": store.session_id() }));
            store.release().await;
            (headers, body).into_response()
        }
        Err(e) => internal_error(e),
    }
}

/// Destroy the caller's session
pub async fn logout(State(manager): State<Arc<SessionManager>>, mut parts: Parts) -> Response {
    let mut headers = HeaderMap::new();
    manager.destroy(&mut parts, &mut headers).await;

    (headers, StatusCode::NO_CONTENT).into_response()
}

/// Ids of the sessions currently held by the provider
pub async fn list_sessions(State(manager): State<Arc<SessionManager>>) -> Response {
    match manager.active_sessions().await {
        Ok(ids) => Json(json!({ "count": ids.len(), "sessions": ids })).into_response(),
        Err(e) => internal_error(e),
    }
}

fn internal_error(e: impl std::fmt::Display) -> Response {
    error!("Session handler failed: {}", e);

    let body = Json(json!({
        "error": "session_error",
        "error_description": e.to_string(),
    }));

    (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
}
