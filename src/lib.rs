pub mod api;
pub mod auth;
pub mod config;
pub mod core_state;
pub mod db;
pub mod extract;
pub mod models;
pub mod pipeline;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::core_state::CoreState;

pub fn run() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = AppConfig::from_env();
    if config.jwt_secret_is_default {
        tracing::warn!("JWT_SECRET_KEY is not set; using the development secret");
    }
    if config.api_key.is_empty() {
        tracing::warn!("API_KEY is not set; AI requests will be rejected upstream");
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start async runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(serve(config)) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

/// Serve until Ctrl-C, then drain in-flight requests.
async fn serve(config: AppConfig) -> Result<(), String> {
    let addr = resolve_bind_addr(&config.host, config.port).await?;

    let core = Arc::new(CoreState::new(config));
    core.bootstrap()
        .map_err(|e| format!("Startup failed: {e}"))?;

    let mut server = api::start_server_on(core, addr).await?;
    tracing::info!(addr = %server.session.server_addr, "Listening");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl-C: {e}");
    }
    server.shutdown();
    server.stopped().await;
    Ok(())
}

async fn resolve_bind_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| format!("Invalid HOST {host}: {e}"))?
        .next()
        .ok_or_else(|| format!("HOST {host} resolved to no address"))
}
