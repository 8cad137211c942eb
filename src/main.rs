use anyhow::{Context, Result};
use diary_movie::server::{self, AppState};
use diary_movie::{Config, ConnectionRegistry, Orchestrator, Services, init};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "diary_movie=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    init::report_services(&config);
    init::ensure_directories(&config).await?;

    let registry = Arc::new(ConnectionRegistry::new());
    let services = Services::from_config(&config, registry)?;
    let orchestrator = Orchestrator::new(services);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.host, config.port))?;

    let app = server::router(AppState::new(orchestrator, config));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, "Starting server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("Server error")?;

    Ok(())
}
