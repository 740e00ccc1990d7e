//! HTTP server command (`relay serve`).

use std::sync::Arc;

use anyhow::{Context, Result};

use relay::config::RelayConfig;
use relay::server::{ServerConfig, serve};
use relay::service::AgentService;

pub async fn cmd_serve(config: RelayConfig, port: Option<u16>, dev: bool) -> Result<()> {
    let service = AgentService::connect(&config)
        .await
        .with_context(|| format!("Failed to connect to backend at {}", config.backend.url))?;

    serve(
        Arc::new(service),
        ServerConfig {
            host: config.server.host.clone(),
            port: port.unwrap_or(config.server.port),
            dev_mode: dev,
        },
    )
    .await
}
