//! Sequential execution of a repository pipeline run.
//!
//! A run walks `PipelineStage::sequence(n)` strictly forward. Each stage is
//! one correlated round trip; its answer is appended to the run's text. The
//! first failed round trip makes the run terminal: later stages are never
//! issued and the caller gets the text accumulated so far plus the failure.

use std::sync::Arc;

use serde::Serialize;

use crate::chunk::Chunk;
use crate::client::RoundTripClient;
use crate::errors::RelayError;

use super::prompts;
use super::stage::PipelineStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// The stage a run stopped at and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: PipelineStage,
    /// 0-based position in the stage sequence
    pub position: usize,
    pub stage_count: usize,
    pub error: RelayError,
}

impl StageFailure {
    pub fn annotation(&self) -> String {
        format!(
            "[pipeline failed at {} (stage {} of {}): {}: {}]",
            self.stage,
            self.position + 1,
            self.stage_count,
            self.error.kind(),
            self.error
        )
    }
}

/// State of one run. Text only ever grows; status only moves forward.
#[derive(Debug)]
pub struct PipelineRun {
    task_id: String,
    stages: Vec<PipelineStage>,
    position: usize,
    outputs: Vec<(PipelineStage, String)>,
    accumulated: String,
    status: RunStatus,
    failure: Option<StageFailure>,
}

impl PipelineRun {
    pub fn new(task_id: impl Into<String>, chunk_count: usize) -> Self {
        Self {
            task_id: task_id.into(),
            stages: PipelineStage::sequence(chunk_count),
            position: 0,
            outputs: Vec::new(),
            accumulated: String::new(),
            status: RunStatus::Running,
            failure: None,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// The next stage to execute, or `None` once the run is terminal.
    pub fn current_stage(&self) -> Option<PipelineStage> {
        match self.status {
            RunStatus::Running => self.stages.get(self.position).copied(),
            RunStatus::Completed | RunStatus::Failed => None,
        }
    }

    fn record_success(&mut self, output: String) {
        let Some(stage) = self.current_stage() else {
            return;
        };
        self.accumulated
            .push_str(&format!("## {}\n\n{}\n\n", stage, output.trim_end()));
        self.outputs.push((stage, output));
        self.position += 1;
        if self.position == self.stages.len() {
            self.status = RunStatus::Completed;
        }
    }

    fn record_failure(&mut self, error: RelayError) {
        let Some(stage) = self.current_stage() else {
            return;
        };
        self.failure = Some(StageFailure {
            stage,
            position: self.position,
            stage_count: self.stages.len(),
            error,
        });
        self.status = RunStatus::Failed;
    }

    fn output_of(&self, wanted: PipelineStage) -> &str {
        self.outputs
            .iter()
            .find(|(stage, _)| *stage == wanted)
            .map(|(_, output)| output.as_str())
            .unwrap_or_default()
    }

    fn analyses(&self) -> String {
        self.outputs
            .iter()
            .filter(|(stage, _)| matches!(stage, PipelineStage::Analysis { .. }))
            .map(|(stage, output)| format!("### {}\n{}", stage, output.trim_end()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn into_outcome(self, round_trips: usize) -> PipelineOutcome {
        PipelineOutcome {
            task_id: self.task_id,
            status: self.status,
            stages_completed: self.outputs.len(),
            stage_count: self.stages.len(),
            text: self.accumulated,
            failure: self.failure,
            round_trips,
        }
    }
}

/// Result of a run: the accumulated text, complete or partial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub task_id: String,
    pub status: RunStatus,
    pub text: String,
    pub failure: Option<StageFailure>,
    pub stages_completed: usize,
    pub stage_count: usize,
    pub round_trips: usize,
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Accumulated text followed by the failure annotation, if any.
    pub fn render(&self) -> String {
        match &self.failure {
            Some(failure) => format!("{}{}", self.text, failure.annotation()),
            None => self.text.trim_end().to_string(),
        }
    }
}

pub struct PipelineRunner {
    client: Arc<RoundTripClient>,
}

impl PipelineRunner {
    pub fn new(client: Arc<RoundTripClient>) -> Self {
        Self { client }
    }

    fn prompt_for(
        &self,
        run: &PipelineRun,
        stage: PipelineStage,
        chunks: &[Chunk],
        custom: Option<&str>,
    ) -> String {
        match stage {
            PipelineStage::Role => prompts::role_prompt(custom),
            PipelineStage::Analysis { index, .. } => prompts::analysis_prompt(&chunks[index], custom),
            PipelineStage::Planning => prompts::planning_prompt(&run.analyses(), custom),
            PipelineStage::Refactor => {
                prompts::refactor_prompt(run.output_of(PipelineStage::Planning), custom)
            }
            PipelineStage::Review => {
                prompts::review_prompt(run.output_of(PipelineStage::Refactor), custom)
            }
        }
    }

    /// Execute every stage for `chunks`, stopping at the first failure.
    ///
    /// Each round trip gets a fresh correlation id; `task_id` is attached as
    /// the session id of every request in the run.
    pub async fn run(
        &self,
        task_id: &str,
        chunks: &[Chunk],
        custom_prompt: Option<&str>,
    ) -> PipelineOutcome {
        let mut run = PipelineRun::new(task_id, chunks.len());
        let mut round_trips = 0;
        tracing::info!(task_id, stages = run.stage_count(), chunks = chunks.len(), "pipeline run started");

        while let Some(stage) = run.current_stage() {
            let prompt = self.prompt_for(&run, stage, chunks, custom_prompt);
            tracing::debug!(task_id, %stage, prompt_bytes = prompt.len(), "issuing stage");
            round_trips += 1;

            match self.client.request(&prompt, Some(task_id)).await {
                Ok(output) => run.record_success(output),
                Err(error) => {
                    tracing::warn!(task_id, %stage, error = %error, "pipeline stage failed");
                    run.record_failure(error);
                }
            }
        }

        let outcome = run.into_outcome(round_trips);
        tracing::info!(
            task_id,
            status = outcome.status.as_str(),
            round_trips,
            "pipeline run finished"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{SourceDocument, split};
    use crate::testing::ScriptedBackend;
    use std::time::Duration;

    fn chunks(n: usize) -> Vec<Chunk> {
        let documents: Vec<SourceDocument> = (0..n)
            .map(|i| SourceDocument::new(format!("F{}.java", i), format!("class F{} {{}}", i)))
            .collect();
        // Every document exceeds the bound, so each becomes its own chunk.
        split(&documents, 1)
    }

    fn runner(backend: &Arc<ScriptedBackend>, timeout: Duration) -> (PipelineRunner, Arc<RoundTripClient>) {
        let client = Arc::new(RoundTripClient::new(
            backend.registry().clone(),
            backend.clone(),
            timeout,
        ));
        (PipelineRunner::new(client.clone()), client)
    }

    #[tokio::test]
    async fn test_successful_run_issues_one_round_trip_per_stage() {
        let backend = ScriptedBackend::tagged(|_, n| format!("answer {}", n));
        let (runner, client) = runner(&backend, Duration::from_secs(1));

        let outcome = runner.run("task-1", &chunks(3), None).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.round_trips, 3 + 4);
        assert_eq!(client.round_trips(), 7);
        assert_eq!(backend.sent().len(), 7);
        assert_eq!(outcome.stages_completed, 7);
        assert!(outcome.failure.is_none());
        assert!(client.registry().is_empty());
    }

    #[tokio::test]
    async fn test_stage_order_and_accumulation() {
        let backend = ScriptedBackend::tagged(|_, n| format!("answer {}", n));
        let (runner, _) = runner(&backend, Duration::from_secs(1));

        let outcome = runner.run("task-1", &chunks(2), None).await;

        assert_eq!(
            outcome.text,
            "## Role\n\nanswer 1\n\n\
             ## Analysis 1/2\n\nanswer 2\n\n\
             ## Analysis 2/2\n\nanswer 3\n\n\
             ## Planning\n\nanswer 4\n\n\
             ## Refactor\n\nanswer 5\n\n\
             ## Review\n\nanswer 6\n\n"
        );

        let sent = backend.sent();
        assert!(sent[0].task.starts_with(prompts::ROLE_PROMPT));
        assert!(sent[1].task.starts_with("Repository chunk 1 of 2 (files: F0.java)"));
        assert!(sent[2].task.starts_with("Repository chunk 2 of 2 (files: F1.java)"));
        assert!(sent[3].task.contains("answer 2") && sent[3].task.contains("answer 3"));
        assert!(sent[4].task.contains("answer 4"));
        assert!(sent[5].task.contains("answer 5"));
    }

    #[tokio::test]
    async fn test_each_stage_uses_fresh_correlation_id() {
        let backend = ScriptedBackend::tagged(|_, _| "ok".to_string());
        let (runner, _) = runner(&backend, Duration::from_secs(1));

        runner.run("task-1", &chunks(2), None).await;

        let mut ids: Vec<String> = backend.sent().into_iter().map(|f| f.task_id).collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
        assert!(!ids.contains(&"task-1".to_string()));
    }

    #[tokio::test]
    async fn test_failure_on_second_of_five_stages() {
        let backend = ScriptedBackend::tagged(|_, n| format!("answer {}", n)).failing_on(2);
        let (runner, _) = runner(&backend, Duration::from_secs(1));

        let outcome = runner.run("task-1", &chunks(1), None).await;

        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.stage_count, 5);
        assert_eq!(outcome.text, "## Role\n\nanswer 1\n\n");
        assert_eq!(outcome.round_trips, 2);
        assert_eq!(backend.sent().len(), 2);

        let failure = outcome.failure.clone().unwrap();
        assert_eq!(failure.stage, PipelineStage::Analysis { index: 0, total: 1 });
        assert_eq!(failure.position, 1);
        assert!(matches!(failure.error, RelayError::SendFailure(_)));

        let rendered = outcome.render();
        assert!(rendered.starts_with("## Role\n\nanswer 1\n\n"));
        assert!(rendered.ends_with(
            "[pipeline failed at Analysis 1/1 (stage 2 of 5): send_failure: Failed to send frame: scripted send failure]"
        ));
    }

    #[tokio::test]
    async fn test_timeout_stops_the_run() {
        let backend = ScriptedBackend::raw(|frame, n| {
            (n != 3).then(|| serde_json::json!({"taskId": frame.task_id, "response": "ok"}).to_string())
        });
        let (runner, client) = runner(&backend, Duration::from_millis(40));

        let outcome = runner.run("task-1", &chunks(2), None).await;

        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.stages_completed, 2);
        assert_eq!(backend.sent().len(), 3);
        assert!(matches!(
            outcome.failure.unwrap().error,
            RelayError::Timeout { .. }
        ));
        assert!(client.registry().is_empty());
    }

    #[tokio::test]
    async fn test_custom_prompt_suffixes_every_stage() {
        let backend = ScriptedBackend::tagged(|_, _| "ok".to_string());
        let (runner, _) = runner(&backend, Duration::from_secs(1));

        runner.run("task-1", &chunks(1), Some("Target Spring Boot 3")).await;

        for frame in backend.sent() {
            assert!(frame.task.ends_with("Additional instructions:\nTarget Spring Boot 3"));
        }
    }

    #[tokio::test]
    async fn test_session_id_is_task_id() {
        let backend = ScriptedBackend::silent();
        let (runner, client) = runner(&backend, Duration::from_millis(200));

        let registry = client.registry().clone();
        let handle = tokio::spawn(async move { runner.run("session-7", &chunks(1), None).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let pending = registry.pending_ids();
        assert_eq!(pending.len(), 1);
        assert_eq!(registry.session_of(&pending[0]), Some("session-7".to_string()));

        // dropping the run mid-stage withdraws its pending request
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_runs_share_one_client() {
        let backend = ScriptedBackend::tagged(|frame, _| format!("re: {}", &frame.task[..10]));
        let (runner, client) = runner(&backend, Duration::from_secs(1));
        let runner = Arc::new(runner);

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let runner = runner.clone();
                tokio::spawn(async move { runner.run(&format!("run-{}", i), &chunks(2), None).await })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_success());
        }
        assert_eq!(client.round_trips(), 4 * 6);
        assert!(client.registry().is_empty());
    }

    #[test]
    fn test_run_state_is_terminal_after_failure() {
        let mut run = PipelineRun::new("t", 1);
        run.record_success("first".to_string());
        run.record_failure(RelayError::ChannelClosed);

        assert_eq!(run.status(), RunStatus::Failed);
        assert_eq!(run.current_stage(), None);

        let before = run.accumulated().to_string();
        run.record_success("ignored".to_string());
        assert_eq!(run.accumulated(), before);
    }

    #[test]
    fn test_render_completed_run_has_no_annotation() {
        let mut run = PipelineRun::new("t", 0);
        for answer in ["a", "b", "c", "d"] {
            run.record_success(answer.to_string());
        }
        assert_eq!(run.status(), RunStatus::Completed);
        let outcome = run.into_outcome(4);
        assert_eq!(
            outcome.render(),
            "## Role\n\na\n\n## Planning\n\nb\n\n## Refactor\n\nc\n\n## Review\n\nd"
        );
    }
}
