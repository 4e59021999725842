// Session middleware
// Resolves the request's session before the handler and persists it afterwards

use crate::error::SessionError;
use crate::session::{SessionManager, SessionStore};
use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Handle to the current request's session, available as a request extension
#[derive(Clone)]
pub struct Session(pub Arc<dyn SessionStore>);

impl std::ops::Deref for Session {
    type Target = dyn SessionStore;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

/// Start (or resume) a session for every request passing through.
///
/// The session is released once the handler returns, whatever the response.
/// Handlers that destroy or regenerate the session should use the manager
/// directly instead of sitting behind this layer, otherwise the release
/// would write the old record back.
pub async fn session_middleware(
    State(manager): State<Arc<SessionManager>>,
    req: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = req.into_parts();
    let mut session_headers = HeaderMap::new();

    let store = match manager.start(&mut parts, &mut session_headers).await {
        Ok(store) => store,
        Err(e) => return session_error(e),
    };

    debug!("Request bound to session {}", store.session_id());
    parts.extensions.insert(Session(store.clone()));

    let mut response = next.run(Request::from_parts(parts, body)).await;
    store.release().await;

    let headers = response.headers_mut();
    for (name, value) in session_headers.iter() {
        headers.append(name, value.clone());
    }

    response
}

fn session_error(e: SessionError) -> Response {
    let (status, code) = match &e {
        SessionError::Transport(_) | SessionError::InvalidId(_) => {
            warn!("Rejected session transport: {}", e);
            (StatusCode::BAD_REQUEST, "invalid_session")
        }
        _ => {
            error!("Failed to start session: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "session_unavailable")
        }
    };

    let body = Json(json!({
        "error": code,
        "error_description": e.to_string(),
    }));

    (status, body).into_response()
}
