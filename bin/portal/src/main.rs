use carebridge_portal::{AppState, PortalConfig, router};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = PortalConfig::from_env().expect("failed to load configuration");
    tracing::info!(environment = ?config.environment, "Loaded configuration");

    let app_state = Arc::new(AppState::from_config(&config).expect("failed to build application state"));

    // Spawn periodic browser session cleanup task
    let cleanup_state = Arc::clone(&app_state);
    let cleanup_interval = config.session.cleanup_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        loop {
            interval.tick().await;
            let pruned = cleanup_state.sessions.prune();
            if pruned > 0 {
                tracing::debug!(pruned_sessions = pruned, "Periodic session cleanup");
            }
        }
    });

    let app = router(app_state, &config.assets_dir);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.listen_addr);

    axum::serve(listener, app.into_make_service())
        .await
        .expect("server error");
}
