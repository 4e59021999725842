use pmp_session::config::{self, ManagerConfig};
use pmp_session::handlers;
use pmp_session::session::SessionManager;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pmp_session=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let session_config = match config::load_config_with_fallback() {
        Ok(config) => {
            tracing::info!("✓ Session configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::warn!("⚠ Failed to load session configuration: {}. Using defaults.", e);
            ManagerConfig::default()
        }
    };

    let manager = match SessionManager::new(session_config).await {
        Ok(manager) => Arc::new(manager),
        Err(e) => {
            tracing::error!("Failed to initialize session provider: {}", e);
            std::process::exit(1);
        }
    };

    let gc = manager.start_gc();

    let app = handlers::app(manager.clone())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    tracing::info!(
        "🚀 Starting session demo on {} with {} provider",
        addr,
        manager.provider().name()
    );

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .unwrap();

    gc.shutdown().await;
}
