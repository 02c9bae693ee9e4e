//! Execution of one claimed QA task.
//!
//! Stages run in order: balance check, prompt construction, model call,
//! answer parsing, chunk persistence, task retirement and billing. Every
//! failure is turned into a [`TaskOutcome`] so the drain loop never sees an
//! error directly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::config::WorkerConfig;
use crate::error::{BalanceError, LlmError, PipelineError};
use crate::llm::{GenerationRequest, LlmProvider, Usage};
use crate::metrics;
use crate::qa::{build_qa_messages, parse_qa_answer, IndexKind, TextSplitter, TrainingChunk};
use crate::queue::{TrainingMode, TrainingQueue, TrainingTask};
use crate::services::{
    BalanceAuthority, BillingSink, ChunkSink, Inform, Notifier, PushChunksRequest, QaBill,
};

use super::classify::{classify, FailureClass};

/// Characters of source text included in failure logs.
const SNIPPET_CHARS: usize = 120;

/// External services a pipeline run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub queue: Arc<dyn TrainingQueue>,
    pub llm: Arc<dyn LlmProvider>,
    pub balance: Arc<dyn BalanceAuthority>,
    pub chunks: Arc<dyn ChunkSink>,
    pub billing: Arc<dyn BillingSink>,
    pub notifier: Arc<dyn Notifier>,
    pub splitter: Arc<dyn TextSplitter>,
}

/// Result of running one task.
#[derive(Debug)]
pub enum TaskOutcome {
    /// Chunks were stored and the task deleted.
    Completed { chunks: usize, total_tokens: u32 },
    /// The team is out of balance; its tasks were suspended.
    TeamSuspended { team_id: String },
    /// The task cannot succeed and was parked.
    Parked { error: PipelineError },
    /// The task keeps its lease and is retried once the lease goes stale.
    Retry { error: PipelineError },
}

/// What the drain loop does after a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    Continue,
    RetryAfter(Duration),
}

impl TaskOutcome {
    pub fn next_step(&self, retry_delay: Duration) -> NextStep {
        match self {
            TaskOutcome::Retry { .. } => NextStep::RetryAfter(retry_delay),
            _ => NextStep::Continue,
        }
    }

    /// Metric label for the outcome.
    pub fn label(&self) -> &'static str {
        match self {
            TaskOutcome::Completed { .. } => "completed",
            TaskOutcome::TeamSuspended { .. } => "team_suspended",
            TaskOutcome::Parked { .. } => "parked",
            TaskOutcome::Retry { .. } => "retry",
        }
    }
}

/// Data from a successful run, before it becomes an outcome.
struct Generated {
    model: String,
    usage: Usage,
    chunks: usize,
}

/// Runs claimed tasks to an outcome.
#[derive(Clone)]
pub struct QaPipeline {
    config: WorkerConfig,
    collab: Collaborators,
}

impl QaPipeline {
    pub fn new(config: WorkerConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collab: collaborators,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collab
    }

    /// Runs one leased task to completion or recovery.
    pub async fn execute(&self, task: &TrainingTask) -> TaskOutcome {
        let started = Instant::now();

        let outcome = match self.generate(task).await {
            Ok(generated) => {
                let elapsed = started.elapsed();
                info!(
                    task_id = %task.id,
                    team_id = %task.team_id,
                    model = %generated.model,
                    chunks = generated.chunks,
                    prompt_tokens = generated.usage.prompt_tokens,
                    completion_tokens = generated.usage.completion_tokens,
                    total_tokens = generated.usage.total_tokens,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "QA task finished"
                );
                metrics::record_tokens(&generated.model, generated.usage.total_tokens);
                metrics::observe_task_duration(elapsed.as_secs_f64());
                TaskOutcome::Completed {
                    chunks: generated.chunks,
                    total_tokens: generated.usage.total_tokens,
                }
            }
            Err(PipelineError::Balance(BalanceError::Insufficient { team_id })) => {
                self.suspend_team(task, team_id).await
            }
            Err(error) => self.recover(task, error).await,
        };

        metrics::record_task_outcome(outcome.label());
        outcome
    }

    async fn generate(&self, task: &TrainingTask) -> Result<Generated, PipelineError> {
        self.collab
            .balance
            .check(&task.team_id)
            .await
            .map_err(PipelineError::Balance)?;

        let model = task
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .or_else(|| self.config.fallback_model())
            .ok_or(LlmError::MissingModel)?
            .to_string();

        let messages = build_qa_messages(task.prompt.as_deref(), &task.q);
        let request = GenerationRequest::new(model.clone(), messages)
            .with_temperature(self.config.temperature)
            .with_n(1)
            .with_timeout(self.config.model_timeout);

        let response = self.collab.llm.generate(request).await?;
        let answer = response.first_content().unwrap_or_default();

        let chunks = parse_qa_answer(
            answer,
            &task.q,
            self.collab.splitter.as_ref(),
            self.config.fallback_chunk_len,
        );
        record_chunk_kinds(&chunks);
        let chunk_count = chunks.len();

        self.collab
            .chunks
            .push_chunks(PushChunksRequest {
                team_id: task.team_id.clone(),
                tmb_id: task.tmb_id.clone(),
                dataset_id: task.dataset_id.clone(),
                collection_id: task.collection_id.clone(),
                bill_id: task.bill_id.clone(),
                mode: TrainingMode::Chunk,
                chunks,
            })
            .await
            .map_err(PipelineError::Ingest)?;

        self.collab
            .queue
            .delete(task.id)
            .await
            .map_err(PipelineError::Retire)?;

        if chunk_count > 0 {
            let bill = QaBill {
                team_id: task.team_id.clone(),
                tmb_id: task.tmb_id.clone(),
                total_tokens: response.usage.total_tokens,
                bill_id: task.bill_id.clone(),
                model: model.clone(),
            };
            if let Err(e) = self.collab.billing.push_qa_bill(bill).await {
                warn!(task_id = %task.id, error = %e, "Failed to record QA bill");
            }
        } else {
            info!(task_id = %task.id, answer = %answer, "QA result 0");
        }

        Ok(Generated {
            model,
            usage: response.usage,
            chunks: chunk_count,
        })
    }

    async fn suspend_team(&self, task: &TrainingTask, team_id: String) -> TaskOutcome {
        warn!(
            task_id = %task.id,
            team_id = %team_id,
            "Team balance insufficient, suspending QA training"
        );

        if let Err(e) = self
            .collab
            .notifier
            .send(Inform::training_suspended(task.tmb_id.clone()))
            .await
        {
            warn!(tmb_id = %task.tmb_id, error = %e, "Failed to send suspension notice");
        }

        match self.collab.queue.suspend_team(&team_id).await {
            Ok(suspended) => info!(team_id = %team_id, suspended, "Team tasks suspended"),
            Err(e) => warn!(team_id = %team_id, error = %e, "Failed to suspend team tasks"),
        }

        TaskOutcome::TeamSuspended { team_id }
    }

    async fn recover(&self, task: &TrainingTask, error: PipelineError) -> TaskOutcome {
        let snippet = task.text_snippet(SNIPPET_CHARS);
        let class = classify(&error);
        match &error {
            PipelineError::Llm(LlmError::ApiError {
                status,
                code,
                error_type,
                message,
            }) => info!(
                task_id = %task.id,
                text = %snippet,
                class = class.as_str(),
                status,
                code,
                error_type = error_type.as_deref().unwrap_or("unknown"),
                message = %message,
                "QA generation rejected by model API"
            ),
            PipelineError::Llm(llm) if llm.has_response() => {
                info!(task_id = %task.id, text = %snippet, class = class.as_str(), error = %llm, "QA generation rejected by model API")
            }
            _ => error!(task_id = %task.id, text = %snippet, class = class.as_str(), error = %error, "QA task failed"),
        }

        match class {
            FailureClass::Permanent => {
                info!(task_id = %task.id, text = %task.q, "Skipping QA task that cannot succeed");
                if let Err(e) = self.collab.queue.park(task.id).await {
                    warn!(task_id = %task.id, error = %e, "Failed to park QA task");
                }
                TaskOutcome::Parked { error }
            }
            FailureClass::Transient => TaskOutcome::Retry { error },
        }
    }
}

fn record_chunk_kinds(chunks: &[TrainingChunk]) {
    let qa = chunks
        .iter()
        .filter(|c| c.kind() == Some(IndexKind::Qa))
        .count();
    metrics::record_chunks("qa", qa);
    metrics::record_chunks("chunk", chunks.len() - qa);
}
