pub mod health;
pub mod session;

use crate::middleware::session_middleware;
use crate::session::SessionManager;
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

/// Demo application: a session-backed counter plus regenerate/logout endpoints
pub fn app(manager: Arc<SessionManager>) -> Router {
    let session_routes = Router::new()
        .route("/counter", get(session::counter))
        .layer(axum::middleware::from_fn_with_state(
            manager.clone(),
            session_middleware,
        ));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/regenerate", post(session::regenerate))
        .route("/logout", post(session::logout))
        .route("/sessions", get(session::list_sessions))
        .merge(session_routes)
        .with_state(manager)
}
