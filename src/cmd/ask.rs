//! Single-task command (`relay ask`).

use anyhow::{Context, Result};

use relay::config::RelayConfig;
use relay::service::AgentService;

pub async fn cmd_ask(config: &RelayConfig, task: &str, task_id: Option<&str>) -> Result<()> {
    let service = AgentService::connect(config)
        .await
        .with_context(|| format!("Failed to connect to backend at {}", config.backend.url))?;

    let result = service.submit(task, task_id).await;
    service.shutdown();

    let answer = result.context("Task failed")?;
    println!("{}", answer.render());
    Ok(())
}
