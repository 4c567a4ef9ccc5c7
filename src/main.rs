use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use livekit_rooms::api;
use livekit_rooms::auth::AuthService;
use livekit_rooms::config::Config;
use livekit_rooms::db::{self, Store};
use livekit_rooms::livekit::{LiveKitClient, TokenIssuer};
use livekit_rooms::rooms::RoomManager;
use livekit_rooms::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let default_level = if config.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    if config.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    tracing::info!("Starting LiveKit Rooms Backend...");
    tracing::info!(
        host = %config.server_host,
        port = %config.server_port,
        livekit_url = %config.livekit_url,
        "Configuration loaded"
    );

    // Open database and apply migrations
    let pool = db::create_pool(&config.database_url).await?;
    db::migrate(&pool).await?;
    let store = Store::new(pool);
    tracing::info!("Database ready");

    // Create auth service
    let auth = AuthService::new(&config);

    // Create LiveKit token issuer and room service client
    let issuer = TokenIssuer::new(&config);
    let provider = LiveKitClient::new(&config, issuer.clone())?;
    let rooms = RoomManager::new(&config, store.clone(), Arc::new(provider), issuer);

    let state = AppState::new(config.clone(), auth, store, rooms);

    // Build router
    let app = Router::new()
        .merge(api::create_router(state))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr: SocketAddr = config.server_addr().parse()?;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(address = %addr, "Server listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Handle shutdown signals
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, shutting down...");
        },
    }
}
