//! End-to-end tests for the QA worker.
//!
//! The worker runs against the in-memory queue and sinks with a scripted
//! model, so these tests need no network or database.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use qa_forge::config::WorkerConfig;
use qa_forge::error::{LlmError, StoreError};
use qa_forge::llm::{Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage};
use qa_forge::qa::{IndexKind, SentenceSplitter, TextSplitter};
use qa_forge::queue::{
    LeaseState, MemoryTrainingQueue, NewTrainingTask, QueueStats, TrainingMode, TrainingQueue,
    TrainingTask,
};
use qa_forge::services::{MemoryBalance, MemoryBilling, MemoryChunkSink, MemoryNotifier};
use qa_forge::worker::{Collaborators, QaWorker};

type Responder = dyn Fn(&GenerationRequest) -> Result<String, LlmError> + Send + Sync;

/// Model double: answers through a closure and records what it was asked.
struct ScriptedLlm {
    respond: Box<Responder>,
    delay: Duration,
    requests: Mutex<Vec<GenerationRequest>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedLlm {
    fn new(respond: impl Fn(&GenerationRequest) -> Result<String, LlmError> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn answering(answer: &'static str) -> Self {
        Self::new(move |_| Ok(answer.to_string()))
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    async fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let reply = (self.respond)(&request);
        let model = request.model.clone();
        self.requests.lock().await.push(request);
        self.active.fetch_sub(1, Ordering::SeqCst);

        Ok(GenerationResponse {
            id: "chatcmpl-test".to_string(),
            model,
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(reply?),
                finish_reason: "stop".to_string(),
            }],
            usage: Usage {
                prompt_tokens: 80,
                completion_tokens: 20,
                total_tokens: 100,
            },
        })
    }
}

/// Queue wrapper whose first `failures` claims fail.
struct FlakyQueue {
    inner: MemoryTrainingQueue,
    failures: AtomicUsize,
}

#[async_trait]
impl TrainingQueue for FlakyQueue {
    async fn claim_next(
        &self,
        mode: TrainingMode,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<TrainingTask>, StoreError> {
        let remaining = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if remaining.is_ok() {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        self.inner.claim_next(mode, stale_before).await
    }

    async fn suspend_team(&self, team_id: &str) -> Result<u64, StoreError> {
        self.inner.suspend_team(team_id).await
    }

    async fn park(&self, task_id: Uuid) -> Result<(), StoreError> {
        self.inner.park(task_id).await
    }

    async fn delete(&self, task_id: Uuid) -> Result<(), StoreError> {
        self.inner.delete(task_id).await
    }

    async fn enqueue(&self, task: NewTrainingTask) -> Result<Uuid, StoreError> {
        self.inner.enqueue(task).await
    }

    async fn resume_team(&self, team_id: &str) -> Result<u64, StoreError> {
        self.inner.resume_team(team_id).await
    }

    async fn unpark_task(&self, task_id: Uuid) -> Result<(), StoreError> {
        self.inner.unpark_task(task_id).await
    }

    async fn stats(&self, stale_before: DateTime<Utc>) -> Result<QueueStats, StoreError> {
        self.inner.stats(stale_before).await
    }
}

struct Fixture {
    queue: Arc<MemoryTrainingQueue>,
    llm: Arc<ScriptedLlm>,
    balance: Arc<MemoryBalance>,
    chunks: Arc<MemoryChunkSink>,
    billing: Arc<MemoryBilling>,
    notifier: Arc<MemoryNotifier>,
}

impl Fixture {
    fn new(llm: ScriptedLlm) -> Self {
        Self {
            queue: Arc::new(MemoryTrainingQueue::new()),
            llm: Arc::new(llm),
            balance: Arc::new(MemoryBalance::unlimited()),
            chunks: Arc::new(MemoryChunkSink::new()),
            billing: Arc::new(MemoryBilling::new()),
            notifier: Arc::new(MemoryNotifier::new()),
        }
    }

    fn collaborators(&self, queue: Arc<dyn TrainingQueue>) -> Collaborators {
        Collaborators {
            queue,
            llm: self.llm.clone(),
            balance: self.balance.clone(),
            chunks: self.chunks.clone(),
            billing: self.billing.clone(),
            notifier: self.notifier.clone(),
            splitter: Arc::new(SentenceSplitter::new()),
        }
    }

    fn worker(&self, max_concurrency: usize) -> QaWorker {
        QaWorker::new(
            test_config().with_max_concurrency(max_concurrency),
            self.collaborators(self.queue.clone()),
        )
    }

    async fn enqueue(&self, team: &str, text: &str) -> Uuid {
        self.queue
            .enqueue(NewTrainingTask::qa(team, format!("{team}-owner"), "ds-1", "col-1", text))
            .await
            .expect("enqueue should succeed")
    }
}

fn test_config() -> WorkerConfig {
    WorkerConfig::default()
        .with_retry_delay(Duration::from_millis(5))
        .with_idle_poll_interval(Duration::from_millis(20))
}

fn default_cutoff() -> DateTime<Utc> {
    Utc::now() - chrono::Duration::minutes(10)
}

fn prompt_of(request: &GenerationRequest) -> &str {
    request
        .messages
        .first()
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_unformatted_answer_falls_back_to_source_chunks() {
    let fx = Fixture::new(ScriptedLlm::answering("Sorry, I could not find any questions."));
    let source = "Rust is fast. ".repeat(86);
    assert!(source.chars().count() >= 1200);
    let id = fx.enqueue("team-a", &source).await;

    let summary = fx.worker(2).drain().await;
    assert_eq!(summary.completed, 1);

    let pushes = fx.chunks.pushes().await;
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].mode, TrainingMode::Chunk);
    let chunks = &pushes[0].chunks;
    assert!(chunks.len() >= 3, "got {} chunks", chunks.len());
    for chunk in chunks {
        assert!(chunk.a.is_empty());
        assert_eq!(chunk.kind(), Some(IndexKind::Chunk));
        assert!(chunk.q.chars().count() <= 500);
    }

    // Fallback boundaries are exactly the splitter's
    let expected = SentenceSplitter::new().split(&source, 500);
    let actual: Vec<String> = chunks.iter().map(|c| c.q.clone()).collect();
    assert_eq!(actual, expected);

    assert!(fx.queue.get(id).await.is_none());
    let bills = fx.billing.bills().await;
    assert_eq!(bills.len(), 1);
    assert_eq!(bills[0].total_tokens, 100);
}

#[tokio::test]
async fn test_formatted_answer_becomes_qa_chunks() {
    let fx = Fixture::new(ScriptedLlm::answering(
        "Q1: What is ownership?\nA1: Each value has one owner.\n\nQ2: What is borrowing?\nA2: Taking a reference.\n   \n  It never outlives the owner.",
    ));
    fx.enqueue("team-a", "Ownership and borrowing in Rust.").await;

    fx.worker(1).drain().await;

    let pushes = fx.chunks.pushes().await;
    let chunks = &pushes[0].chunks;
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].q, "What is ownership?");
    assert_eq!(chunks[0].a, "Each value has one owner.");
    assert_eq!(chunks[0].kind(), Some(IndexKind::Qa));
    assert_eq!(
        chunks[1].indexes[0].text,
        "What is borrowing?\nTaking a reference.\nIt never outlives the owner."
    );
}

#[tokio::test]
async fn test_balance_exhaustion_blocks_only_that_team() {
    let fx = Fixture::new(ScriptedLlm::answering("Q1: q A1: a"));
    fx.balance.set_balance("team-broke", 0).await;
    let broke_1 = fx.enqueue("team-broke", "first text").await;
    let broke_2 = fx.enqueue("team-broke", "second text").await;
    let ok_1 = fx.enqueue("team-ok", "third text").await;
    let ok_2 = fx.enqueue("team-ok", "fourth text").await;

    let summary = fx.worker(1).drain().await;
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.team_suspended, 1);

    for id in [broke_1, broke_2] {
        let task = fx.queue.get(id).await.expect("suspended task is kept");
        assert_eq!(task.lease_state, LeaseState::TeamSuspended);
    }
    assert!(fx.queue.get(ok_1).await.is_none());
    assert!(fx.queue.get(ok_2).await.is_none());

    let sent = fx.notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].tmb_id, "team-broke-owner");

    // The suspended team's tasks never reached the model
    let prompts: Vec<String> = fx
        .llm
        .requests()
        .await
        .iter()
        .map(|r| prompt_of(r).to_string())
        .collect();
    assert!(prompts.iter().all(|p| !p.contains("first text") && !p.contains("second text")));

    // Recharging and resuming makes them claimable again
    fx.balance.set_balance("team-broke", 100).await;
    assert_eq!(fx.queue.resume_team("team-broke").await.unwrap(), 2);
    let summary = fx.worker(1).drain().await;
    assert_eq!(summary.completed, 2);
    assert!(fx.queue.is_empty().await);
}

#[tokio::test]
async fn test_invalid_request_parks_task_and_loop_continues() {
    let fx = Fixture::new(ScriptedLlm::new(|request| {
        if prompt_of(request).contains("poison") {
            Err(LlmError::ApiError {
                status: 400,
                code: None,
                error_type: Some("invalid_request_error".to_string()),
                message: "This model's maximum context length is exceeded".to_string(),
            })
        } else {
            Ok("Q1: q A1: a".to_string())
        }
    }));
    let poison = fx.enqueue("team-a", "poison text").await;
    let healthy = fx.enqueue("team-a", "healthy text").await;

    let summary = fx.worker(1).drain().await;
    assert_eq!(summary.parked, 1);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.retried, 0);

    let parked = fx.queue.get(poison).await.expect("parked task is not deleted");
    assert_eq!(parked.lease_state, LeaseState::Parked);
    assert!(fx.queue.get(healthy).await.is_none());

    let far_future = Utc::now() + chrono::Duration::days(365);
    assert!(fx
        .queue
        .claim_next(TrainingMode::Qa, far_future)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_account_error_code_500_parks_task() {
    let fx = Fixture::new(ScriptedLlm::new(|_| {
        Err(LlmError::ApiError {
            status: 200,
            code: Some(500),
            error_type: None,
            message: "account balance exhausted".to_string(),
        })
    }));
    let id = fx.enqueue("team-a", "some text").await;

    let summary = fx.worker(1).drain().await;
    assert_eq!(summary.parked, 1);
    assert_eq!(fx.queue.get(id).await.unwrap().lease_state, LeaseState::Parked);
}

#[tokio::test]
async fn test_bare_gateway_500_is_retried_not_parked() {
    let fx = Fixture::new(ScriptedLlm::new(|_| {
        Err(LlmError::ApiError {
            status: 500,
            code: None,
            error_type: None,
            message: "<html>Internal Server Error</html>".to_string(),
        })
    }));
    let id = fx.enqueue("team-a", "some text").await;

    let summary = fx.worker(1).drain().await;
    assert_eq!(summary.parked, 0);
    assert_eq!(summary.retried, 1);
    assert_eq!(fx.queue.get(id).await.unwrap().lease_state, LeaseState::Active);
}

#[tokio::test]
async fn test_transient_failure_leaves_ordinary_lease() {
    let fx = Fixture::new(ScriptedLlm::new(|_| {
        Err(LlmError::RequestFailed("connection reset by peer".to_string()))
    }));
    let id = fx.enqueue("team-a", "some text").await;
    let before = Utc::now();

    let summary = fx.worker(1).drain().await;
    assert_eq!(summary.retried, 1);
    assert_eq!(summary.completed, 0);

    let task = fx.queue.get(id).await.expect("task is kept");
    assert_eq!(task.lease_state, LeaseState::Active);
    assert!(task.lock_time >= before);
    assert!(fx.chunks.pushes().await.is_empty());

    // Still leased now
    assert!(fx
        .queue
        .claim_next(TrainingMode::Qa, default_cutoff())
        .await
        .unwrap()
        .is_none());

    // Eleven minutes later the lease has expired
    let later = Utc::now() + chrono::Duration::minutes(11) - chrono::Duration::minutes(10);
    let reclaimed = fx.queue.claim_next(TrainingMode::Qa, later).await.unwrap();
    assert_eq!(reclaimed.map(|t| t.id), Some(id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_admission_cap_is_never_exceeded() {
    let fx = Fixture::new(ScriptedLlm::answering("Q1: q A1: a").with_delay(Duration::from_millis(10)));
    for i in 0..12 {
        fx.enqueue("team-a", &format!("text {i}")).await;
    }
    let worker = fx.worker(3);

    // Twice as many loops as slots: the extra ones must back off
    let mut handles = worker.start();
    handles.extend(worker.start());
    let mut completed = 0;
    for handle in handles {
        completed += handle.await.unwrap().completed;
    }

    assert_eq!(completed, 12);
    assert!(fx.llm.peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(worker.in_flight(), 0);
    assert!(fx.queue.is_empty().await);
}

#[tokio::test]
async fn test_claim_errors_are_retried_immediately() {
    let fx = Fixture::new(ScriptedLlm::answering("Q1: q A1: a"));
    let queue = Arc::new(FlakyQueue {
        inner: MemoryTrainingQueue::new(),
        failures: AtomicUsize::new(3),
    });
    queue
        .enqueue(NewTrainingTask::qa("team-a", "tmb", "ds", "col", "text"))
        .await
        .unwrap();
    let worker = QaWorker::new(test_config().with_max_concurrency(1), fx.collaborators(queue.clone()));

    let summary = worker.drain().await;
    assert_eq!(summary.claim_errors, 3);
    assert_eq!(summary.completed, 1);
    assert_eq!(worker.in_flight(), 0);
    assert!(queue.inner.is_empty().await);
}

#[tokio::test]
async fn test_billing_only_when_chunks_exist() {
    let fx = Fixture::new(ScriptedLlm::answering("nothing useful"));
    let empty = fx.enqueue("team-a", "   \n  ").await;

    let summary = fx.worker(1).drain().await;
    assert_eq!(summary.completed, 1);
    assert!(fx.queue.get(empty).await.is_none());
    assert!(fx.billing.bills().await.is_empty());

    fx.enqueue("team-a", "A real sentence.").await;
    fx.worker(1).drain().await;
    assert_eq!(fx.billing.bills().await.len(), 1);
}

#[tokio::test]
async fn test_task_model_or_default_model_is_used() {
    let fx = Fixture::new(ScriptedLlm::answering("Q1: q A1: a"));
    fx.queue
        .enqueue(NewTrainingTask::qa("team-a", "tmb", "ds", "col", "one").with_model("mistral-large"))
        .await
        .unwrap();
    fx.queue
        .enqueue(NewTrainingTask::qa("team-a", "tmb", "ds", "col", "two"))
        .await
        .unwrap();

    let config = test_config()
        .with_max_concurrency(1)
        .with_default_models(vec![" ".to_string(), "gpt-4o-mini".to_string()]);
    QaWorker::new(config, fx.collaborators(fx.queue.clone()))
        .drain()
        .await;

    let mut models: Vec<String> = fx
        .llm
        .requests()
        .await
        .into_iter()
        .map(|r| r.model)
        .collect();
    models.sort();
    assert_eq!(models, vec!["gpt-4o-mini".to_string(), "mistral-large".to_string()]);

    let bills = fx.billing.bills().await;
    assert!(bills.iter().any(|b| b.model == "gpt-4o-mini"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_workers_never_process_a_task_twice() {
    let fx = Fixture::new(ScriptedLlm::answering("Q1: q A1: a").with_delay(Duration::from_millis(2)));
    for i in 0..30 {
        fx.enqueue("team-a", &format!("unique text #{i}#")).await;
    }

    // Separate workers model separate processes sharing one queue
    let first = fx.worker(4);
    let second = fx.worker(4);
    let mut handles = first.start();
    handles.extend(second.start());
    for handle in handles {
        handle.await.unwrap();
    }

    let requests = fx.llm.requests().await;
    assert_eq!(requests.len(), 30);
    for i in 0..30 {
        let marker = format!("#{i}#");
        let hits = requests
            .iter()
            .filter(|r| prompt_of(r).contains(&marker))
            .count();
        assert_eq!(hits, 1, "task {i} ran {hits} times");
    }
    assert_eq!(first.stats().completed + second.stats().completed, 30);
}

#[tokio::test]
async fn test_run_stops_on_shutdown_after_in_flight_work() {
    let fx = Fixture::new(ScriptedLlm::answering("Q1: q A1: a"));
    for i in 0..5 {
        fx.enqueue("team-a", &format!("text {i}")).await;
    }
    let worker = fx.worker(2);

    let totals = worker
        .run(async {
            tokio::time::sleep(Duration::from_millis(200)).await;
        })
        .await;

    assert_eq!(totals.completed, 5);
    assert_eq!(worker.in_flight(), 0);
    assert!(fx.queue.is_empty().await);

    let stats = fx.queue.stats(default_cutoff()).await.unwrap();
    assert_eq!(stats.total(), 0);
}
