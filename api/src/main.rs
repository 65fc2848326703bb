use chrono::Duration;
use snapgram::{
    backend::{Backend, MemoryBackend},
    config::Config,
    gateway::Gateway,
    query::Queries,
    routes,
    session::SessionContext,
    states::AppState,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let config = Config::from_env()?;

    let memory = Arc::new(
        MemoryBackend::new(config.jwt_secret.clone())
            .with_session_ttl(Duration::hours(config.session_ttl_hours)),
    );
    let gateway = Gateway::new(Backend::in_memory(memory), config.gateway.clone());
    let session = Arc::new(SessionContext::new(Arc::new(Queries::new(Arc::new(gateway)))));

    let restored = session.restore().await;
    info!(?restored, "Session state");

    let state = AppState::new(session, config.requests_per_second)?;
    let app = routes::router(state, config.max_concurrent_requests);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    info!("Server running on http://{}", config.bind_addr);
    info!("Endpoints:");
    info!("  GET    /health             - Health check");
    info!("  GET    /sign-in, /sign-up  - Auth forms");
    info!("  POST   /sign-in, /sign-up  - Sign in / create account");
    info!("  POST   /sign-out           - Sign out");
    info!("  GET    /                   - Recent posts (auth)");
    info!("  GET    /explore?q=         - Search or paginated feed (auth)");
    info!("  POST   /explore/next       - Next feed page (auth)");
    info!("  GET    /saved              - Saved posts (auth)");
    info!("  GET    /all-users          - People (auth)");
    info!("  POST   /create-post        - Create post (auth)");
    info!("  GET    /update-post/:id    - Edit form (auth, creator only)");
    info!("  POST   /update-post/:id    - Update post (auth, creator only)");
    info!("  GET    /posts/:id          - Post details (auth)");
    info!("  DELETE /posts/:id          - Delete post (auth, creator only)");
    info!("  POST   /posts/:id/like     - Toggle like (auth)");
    info!("  POST   /posts/:id/save     - Save post (auth)");
    info!("  DELETE /posts/:id/save     - Unsave post (auth)");

    axum::serve(listener, app).await?;

    Ok(())
}
