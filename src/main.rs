use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use syncd::config::ServerConfig;
use syncd::engine::SyncServer;

/// Differential synchronization server for shared text documents.
#[derive(Parser, Debug)]
#[command(name = "syncd", version, about)]
struct Cli {
    /// Path to a flat key=value configuration file.
    #[arg(long, env = "MOBWRITE_CONFIG", default_value = "./mobwrite.cfg")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::load(Some(&cli.config))
        .map_err(|e| anyhow::anyhow!("failed to load configuration: {e}"))?;

    tracing::info!(port = config.local_port, "starting syncd");

    let server = Arc::new(SyncServer::new(config));
    let port = server.config.local_port;

    let _janitor = syncd::janitor::spawn(server.clone());

    let router = syncd::http::build_router(server);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(%addr, "listening");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
