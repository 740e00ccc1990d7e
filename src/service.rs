//! Agent service: the single entry point used by the HTTP layer and the CLI.
//!
//! Owns one duplex channel, the correlation registry behind it, the
//! round-trip client shared by every caller, and the task log.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::channel::{ChannelState, Demultiplexer, DuplexChannel};
use crate::chunk::{collect_sources, split};
use crate::client::RoundTripClient;
use crate::config::{PipelineSection, RelayConfig};
use crate::correlation::CorrelationRegistry;
use crate::errors::{RelayError, ServiceError};
use crate::pipeline::{Intent, PipelineOutcome, PipelineRunner, classify_intent, prompts};
use crate::task_log::TaskLog;

/// Answer to a single task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAnswer {
    pub task_id: String,
    pub intent: Intent,
    pub answer: String,
}

impl TaskAnswer {
    /// Plain-text rendering used by `/agent/message` and `relay ask`.
    pub fn render(&self) -> String {
        format!("Intent detected: {}\nResponse:\n{}", self.intent, self.answer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceHealth {
    /// `None` when the service runs without a network channel
    pub channel: Option<ChannelState>,
    pub pending: usize,
    pub unrouted: u64,
    pub round_trips: u64,
}

pub struct AgentService {
    channel: Option<Arc<DuplexChannel>>,
    client: Arc<RoundTripClient>,
    runner: PipelineRunner,
    pipeline: PipelineSection,
    log: TaskLog,
}

impl AgentService {
    /// Open the backend channel described by `config` and wire the layers together.
    pub async fn connect(config: &RelayConfig) -> Result<Self, RelayError> {
        let registry = Arc::new(CorrelationRegistry::new());
        let demux = Arc::new(Demultiplexer::new(registry.clone()));
        let channel = Arc::new(
            DuplexChannel::new(config.backend.url.clone(), demux)
                .with_connect_timeout(config.connect_timeout()),
        );
        channel.connect().await?;

        let client = Arc::new(RoundTripClient::new(
            registry,
            channel.clone(),
            config.request_timeout(),
        ));
        let mut service = Self::with_client(client, config.pipeline.clone());
        service.channel = Some(channel);
        Ok(service)
    }

    /// Build a service over an existing client (any `FrameSink`).
    pub fn with_client(client: Arc<RoundTripClient>, pipeline: PipelineSection) -> Self {
        Self {
            channel: None,
            runner: PipelineRunner::new(client.clone()),
            client,
            pipeline,
            log: TaskLog::new(),
        }
    }

    pub fn channel_state(&self) -> Option<ChannelState> {
        self.channel.as_ref().map(|channel| channel.state())
    }

    pub fn pending(&self) -> usize {
        self.client.registry().len()
    }

    pub fn log(&self) -> &TaskLog {
        &self.log
    }

    pub fn health(&self) -> ServiceHealth {
        ServiceHealth {
            channel: self.channel_state(),
            pending: self.pending(),
            unrouted: self.client.registry().unrouted_count(),
            round_trips: self.client.round_trips(),
        }
    }

    /// Classify `task`, send it as one round trip and log both sides.
    ///
    /// `task_id` becomes the correlation id; a UUID is generated when absent.
    pub async fn submit(&self, task: &str, task_id: Option<&str>) -> Result<TaskAnswer, ServiceError> {
        let task = task.trim();
        if task.is_empty() {
            return Err(ServiceError::EmptyTask);
        }
        let task_id = task_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let intent = classify_intent(task);
        tracing::info!(task_id = %task_id, %intent, "task submitted");
        self.log.task(&task_id, task);

        let prompt = prompts::task_prompt(intent, task);
        match self.client.request_with_id(&task_id, &prompt, None).await {
            Ok(answer) => {
                self.log.response(&task_id, &answer);
                Ok(TaskAnswer {
                    task_id,
                    intent,
                    answer,
                })
            }
            Err(e) => {
                tracing::warn!(task_id = %task_id, error = %e, "task failed");
                self.log.failure(&task_id, e.to_string());
                Err(e.into())
            }
        }
    }

    /// Run the full migration pipeline over the sources under `repo`.
    ///
    /// A failed stage is not an error here: the outcome carries the partial
    /// text and the failure. Errors are reserved for unusable input.
    pub async fn submit_repository(
        &self,
        repo: &Path,
        task_id: Option<&str>,
        custom_prompt: Option<&str>,
    ) -> Result<PipelineOutcome, ServiceError> {
        let extension = self.pipeline.source_extension.as_str();
        // The walk and file reads are synchronous; keep them off the async workers.
        let documents = {
            let root = repo.to_path_buf();
            let ext = extension.to_string();
            tokio::task::spawn_blocking(move || collect_sources(&root, &ext)).await??
        };
        if documents.is_empty() {
            return Err(ServiceError::NoSourceFiles {
                path: repo.to_path_buf(),
                extension: extension.trim_start_matches('.').to_string(),
            });
        }

        let task_id = task_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let chunks = split(&documents, self.pipeline.max_chunk_bytes);
        tracing::info!(
            task_id = %task_id,
            repo = %repo.display(),
            files = documents.len(),
            chunks = chunks.len(),
            "repository submitted"
        );
        self.log.task(
            &task_id,
            &format!("Repository migration: {} ({} files)", repo.display(), documents.len()),
        );

        let outcome = self.runner.run(&task_id, &chunks, custom_prompt).await;
        match &outcome.failure {
            None => self.log.response(&task_id, &outcome.text),
            Some(failure) => self.log.failure(&task_id, failure.annotation()),
        }
        Ok(outcome)
    }

    /// Close the backend channel, failing anything still pending.
    pub fn shutdown(&self) {
        if let Some(channel) = &self.channel
            && channel.close()
        {
            tracing::info!("agent service shut down");
        }
    }
}
