use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mostlikely::{api, catalog, config::ServerConfig, state::AppState, store::MemoryStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mostlikely=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Most Likely...");

    let config = ServerConfig::from_env();

    let prompts = match &config.prompts_file {
        Some(path) => match catalog::load(path) {
            Ok(prompts) => {
                tracing::info!("Loaded {} prompts from {}", prompts.len(), path.display());
                prompts
            }
            Err(e) => {
                tracing::warn!("Failed to load prompts: {}. Using built-in catalog.", e);
                catalog::builtin()
            }
        },
        None => catalog::builtin(),
    };

    let addr = config.addr;
    tracing::info!(
        "Phase policy {:?}, poll interval {:?}",
        config.phase_policy,
        config.poll_interval
    );

    let state = Arc::new(AppState::new(Arc::new(MemoryStore::new(prompts)), config));

    let app = api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
