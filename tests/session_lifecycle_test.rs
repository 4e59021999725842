use axum::body::{Body, to_bytes};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{Request, Response, StatusCode};
use pmp_session::config::ManagerConfig;
use pmp_session::handlers;
use pmp_session::session::{SessionManager, SessionValue};
use pmp_session::storage::ProviderKind;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

async fn memory_manager() -> Arc<SessionManager> {
    Arc::new(SessionManager::new(ManagerConfig::default()).await.unwrap())
}

fn cookie_id(response: &Response<Body>) -> String {
    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .expect("missing Set-Cookie")
        .to_str()
        .unwrap();
    let pair = cookie.split(';').next().unwrap();
    pair.split_once('=').unwrap().1.to_string()
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(id) = cookie {
        builder = builder.header(COOKIE, format!("sessionid={}", id));
    }
    builder.body(Body::empty()).unwrap()
}

fn post(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(COOKIE, format!("sessionid={}", cookie))
        .body(Body::empty())
        .unwrap()
}

/// First request gets a fresh cookie; the second resumes the same session
#[tokio::test]
async fn test_cookie_session_round_trip() {
    let app = handlers::app(memory_manager().await);

    let first = app.clone().oneshot(get("/counter", None)).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers().get_all(SET_COOKIE).iter().count(), 1);

    let id = cookie_id(&first);
    assert_eq!(hex::decode(&id).unwrap().len(), 16);
    assert_eq!(json_body(first).await["count"], 1);

    let second = app.oneshot(get("/counter", Some(&id))).await.unwrap();
    assert!(second.headers().get(SET_COOKIE).is_none());

    let body = json_body(second).await;
    assert_eq!(body["session_id"], id.as_str());
    assert_eq!(body["count"], 2);
}

#[tokio::test]
async fn test_unknown_cookie_gets_new_session() {
    let app = handlers::app(memory_manager().await);

    let response = app
        .oneshot(get("/counter", Some("not-a-session")))
        .await
        .unwrap();

    assert_ne!(cookie_id(&response), "not-a-session");
    assert_eq!(json_body(response).await["count"], 1);
}

#[tokio::test]
async fn test_malformed_cookie_is_rejected() {
    let app = handlers::app(memory_manager().await);

    let response = app
        .oneshot(get("/counter", Some("%FF%FE")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_session");
}

#[tokio::test]
async fn test_regenerate_keeps_values_under_new_id() {
    let manager = memory_manager().await;
    let app = handlers::app(manager.clone());

    let first = app.clone().oneshot(get("/counter", None)).await.unwrap();
    let old_id = cookie_id(&first);

    let regenerated = app.clone().oneshot(post("/regenerate", &old_id)).await.unwrap();
    assert_eq!(regenerated.status(), StatusCode::OK);
    let new_id = cookie_id(&regenerated);
    assert_ne!(new_id, old_id);

    let resumed = app.oneshot(get("/counter", Some(&new_id))).await.unwrap();
    assert_eq!(json_body(resumed).await["count"], 2);
    assert!(!manager.provider().exists(&old_id).await);
}

#[tokio::test]
async fn test_logout_destroys_session() {
    let manager = memory_manager().await;
    let app = handlers::app(manager.clone());

    let first = app.clone().oneshot(get("/counter", None)).await.unwrap();
    let id = cookie_id(&first);

    let logout = app.clone().oneshot(post("/logout", &id)).await.unwrap();
    assert_eq!(logout.status(), StatusCode::NO_CONTENT);
    let expired = logout.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
    assert!(expired.contains("Max-Age=0"));
    assert!(!manager.provider().exists(&id).await);

    let after = app.oneshot(get("/counter", Some(&id))).await.unwrap();
    assert_ne!(cookie_id(&after), id);
}

#[tokio::test]
async fn test_sessions_listing_counts_active_sessions() {
    let app = handlers::app(memory_manager().await);

    for _ in 0..3 {
        app.clone().oneshot(get("/counter", None)).await.unwrap();
    }

    let listing = app.oneshot(get("/sessions", None)).await.unwrap();
    assert_eq!(json_body(listing).await["count"], 3);
}

/// File-backed sessions survive a provider restart
#[tokio::test]
async fn test_file_provider_persists_across_managers() {
    let dir = tempfile::tempdir().unwrap();
    let config = ManagerConfig {
        provider: ProviderKind::File,
        provider_config: dir.path().to_string_lossy().into_owned(),
        ..Default::default()
    };

    let id = {
        let manager = Arc::new(SessionManager::new(config.clone()).await.unwrap());
        let response = handlers::app(manager)
            .oneshot(get("/counter", None))
            .await
            .unwrap();
        cookie_id(&response)
    };

    let manager = SessionManager::new(config).await.unwrap();
    let store = manager.get_session_store(&id).await.unwrap();
    assert_eq!(store.get("count").unwrap(), Some(SessionValue::Int(1)));
}

#[tokio::test]
async fn test_token_sessions_and_principal_mapping() {
    let manager = SessionManager::new(ManagerConfig {
        provider_config_secondary: Some("principals".to_string()),
        ..Default::default()
    })
    .await
    .unwrap();

    let token = manager
        .token_start_expired(Duration::from_secs(30))
        .await
        .unwrap();
    manager
        .link_principal("alice", &token.session_id())
        .await
        .unwrap();

    manager.destroy_principal_token("alice").await.unwrap();
    assert!(!manager.provider().exists(&token.session_id()).await);
}
