//! Repository migration command (`relay migrate`).

use std::path::Path;

use anyhow::{Context, Result, bail};

use relay::config::RelayConfig;
use relay::service::AgentService;

pub async fn cmd_migrate(
    config: &RelayConfig,
    repo: &Path,
    task_id: Option<&str>,
    prompt: Option<&str>,
) -> Result<()> {
    let service = AgentService::connect(config)
        .await
        .with_context(|| format!("Failed to connect to backend at {}", config.backend.url))?;

    let result = service.submit_repository(repo, task_id, prompt).await;
    service.shutdown();

    let outcome = result.with_context(|| format!("Cannot migrate {}", repo.display()))?;
    println!("{}", outcome.render());

    if let Some(failure) = &outcome.failure {
        bail!(
            "Pipeline {} stopped at {} after {} of {} stages",
            outcome.task_id,
            failure.stage,
            outcome.stages_completed,
            outcome.stage_count
        );
    }
    Ok(())
}
