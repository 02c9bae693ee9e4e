//! CLI command definitions for qa-forge.
//!
//! `run` starts the QA worker; the remaining commands are operator helpers
//! around the shared queue.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ConfigError, WorkerConfig};
use crate::llm::{LiteLlmClient, LlmProvider};
use crate::metrics;
use crate::qa::{parse_qa_answer, SentenceSplitter, TrainingChunk};
use crate::queue::{MemoryTrainingQueue, NewTrainingTask, TrainingQueue};
use crate::services::{MemoryBalance, MemoryBilling, MemoryChunkSink, MemoryNotifier};
use crate::storage::Database;
use crate::worker::{Collaborators, DrainSummary, QaWorker};

/// QA-generation training worker.
#[derive(Parser)]
#[command(name = "qa-forge")]
#[command(about = "Turn queued dataset text into question/answer training chunks")]
#[command(version)]
#[command(
    long_about = "qa-forge leases QA training tasks from a shared PostgreSQL queue, asks an LLM to \
                  write question/answer pairs for each task's text, and stores the pairs as dataset \
                  chunks.\n\nExample usage:\n  qa-forge migrate\n  qa-forge enqueue --team t1 \
                  --member m1 --dataset d1 --collection c1 --file notes.txt\n  qa-forge run"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the QA worker until interrupted.
    Run(RunArgs),

    /// Create or update the database schema.
    Migrate(DbArgs),

    /// Queue one QA task from a text file.
    Enqueue(EnqueueArgs),

    /// Make a suspended team's tasks claimable again.
    #[command(name = "resume-team")]
    ResumeTeam(TeamArgs),

    /// Make a parked task claimable again.
    Unpark(UnparkArgs),

    /// Set a team's balance.
    #[command(name = "set-balance")]
    SetBalance(SetBalanceArgs),

    /// Print QA task counts per lease state as JSON.
    Stats(DbArgs),

    /// Parse a model answer file and print the chunks as JSON.
    Parse(ParseArgs),
}

/// Database connection arguments.
#[derive(Parser, Debug, Clone)]
pub struct DbArgs {
    /// PostgreSQL connection string.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,
}

/// Arguments for `qa-forge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub db: DbArgs,

    /// Run against in-memory stores loaded from --fixture instead of PostgreSQL.
    #[arg(long)]
    pub in_memory: bool,

    /// JSON file with an array of tasks to queue in --in-memory mode.
    #[arg(long, requires = "in_memory")]
    pub fixture: Option<PathBuf>,

    /// Drain the queue once and exit instead of running until Ctrl-C.
    #[arg(long)]
    pub once: bool,

    /// Override QA_MAX_CONCURRENCY.
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Override LITELLM_API_BASE.
    #[arg(long)]
    pub api_base: Option<String>,

    /// Print Prometheus metrics on exit.
    #[arg(long)]
    pub print_metrics: bool,
}

/// Arguments for `qa-forge enqueue`.
#[derive(Parser, Debug)]
pub struct EnqueueArgs {
    #[command(flatten)]
    pub db: DbArgs,

    #[arg(long)]
    pub team: String,

    /// Team member that owns the task.
    #[arg(long)]
    pub member: String,

    #[arg(long)]
    pub dataset: String,

    #[arg(long)]
    pub collection: String,

    /// File holding the source text.
    #[arg(short, long)]
    pub file: PathBuf,

    /// File holding a custom prompt template using {{text}}.
    #[arg(long)]
    pub prompt_file: Option<PathBuf>,

    #[arg(short, long)]
    pub model: Option<String>,

    #[arg(long)]
    pub bill_id: Option<String>,
}

/// Arguments naming one team.
#[derive(Parser, Debug)]
pub struct TeamArgs {
    #[command(flatten)]
    pub db: DbArgs,

    pub team_id: String,
}

#[derive(Parser, Debug)]
pub struct UnparkArgs {
    #[command(flatten)]
    pub db: DbArgs,

    pub task_id: Uuid,
}

#[derive(Parser, Debug)]
pub struct SetBalanceArgs {
    #[command(flatten)]
    pub db: DbArgs,

    pub team_id: String,

    #[arg(allow_negative_numbers = true)]
    pub balance: i64,
}

/// Arguments for `qa-forge parse`.
#[derive(Parser, Debug)]
pub struct ParseArgs {
    /// File holding the model answer.
    pub answer: PathBuf,

    /// Source text used when the answer has no Q/A blocks.
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    /// Maximum characters per fallback chunk.
    #[arg(long, default_value = "500")]
    pub chunk_len: usize,
}

/// Output of an in-memory run.
#[derive(Debug, Serialize)]
struct DryRunOutput {
    summary: DrainSummary,
    chunks: Vec<TrainingChunk>,
    total_tokens: u64,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_worker_command(args).await,
        Commands::Migrate(args) => run_migrate_command(args).await,
        Commands::Enqueue(args) => run_enqueue_command(args).await,
        Commands::ResumeTeam(args) => {
            let db = connect(&args.db).await?;
            let resumed = db.resume_team(&args.team_id).await?;
            info!(team_id = %args.team_id, resumed, "Team resumed");
            println!("{}", resumed);
            Ok(())
        }
        Commands::Unpark(args) => {
            let db = connect(&args.db).await?;
            db.unpark_task(args.task_id).await?;
            info!(task_id = %args.task_id, "Task unparked");
            Ok(())
        }
        Commands::SetBalance(args) => {
            let db = connect(&args.db).await?;
            db.set_team_balance(&args.team_id, args.balance).await?;
            info!(team_id = %args.team_id, balance = args.balance, "Team balance set");
            Ok(())
        }
        Commands::Stats(args) => {
            let db = connect(&args).await?;
            let config = WorkerConfig::from_env()?;
            let stats = db.stats(stale_cutoff(&config)).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Commands::Parse(args) => {
            println!("{}", render_parse_output(&args)?);
            Ok(())
        }
    }
}

async fn connect(args: &DbArgs) -> anyhow::Result<Database> {
    let url = args
        .database_url
        .as_deref()
        .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))
        .context("Pass --database-url or set the environment variable")?;
    Database::connect(url)
        .await
        .context("Failed to connect to PostgreSQL")
}

fn stale_cutoff(config: &WorkerConfig) -> chrono::DateTime<Utc> {
    Utc::now()
        - chrono::Duration::from_std(config.stale_lease_after)
            .unwrap_or_else(|_| chrono::Duration::minutes(10))
}

fn build_llm_client(api_base: Option<String>) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let client = match api_base {
        Some(base) => LiteLlmClient::new(base, std::env::var("LITELLM_API_KEY").ok()),
        None => LiteLlmClient::from_env().map_err(|e| {
            anyhow::anyhow!(
                "Failed to initialize LLM client: {}. Please provide --api-base or set LITELLM_API_BASE.",
                e
            )
        })?,
    };
    info!(
        api_base = %client.api_base(),
        has_api_key = client.has_api_key(),
        "Using OpenAI-compatible completion endpoint"
    );
    Ok(Arc::new(client))
}

async fn run_migrate_command(args: DbArgs) -> anyhow::Result<()> {
    let db = connect(&args).await?;
    let applied = db.run_migrations().await?;
    for migration in db.applied_migrations().await? {
        debug!(name = %migration.name, applied_at = %migration.applied_at, "Migration present");
    }
    info!(applied, "Schema is up to date");
    Ok(())
}

async fn run_enqueue_command(args: EnqueueArgs) -> anyhow::Result<()> {
    let text = fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let mut task = NewTrainingTask::qa(args.team, args.member, args.dataset, args.collection, text);
    if let Some(path) = &args.prompt_file {
        let prompt = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        task = task.with_prompt(prompt);
    }
    if let Some(model) = args.model {
        task = task.with_model(model);
    }
    if let Some(bill_id) = args.bill_id {
        task = task.with_bill_id(bill_id);
    }

    let db = connect(&args.db).await?;
    let id = db.enqueue(task).await?;
    info!(task_id = %id, "QA task queued");
    println!("{}", id);
    Ok(())
}

async fn run_worker_command(args: RunArgs) -> anyhow::Result<()> {
    let mut config = WorkerConfig::from_env()?;
    if let Some(max) = args.max_concurrency {
        config = config.with_max_concurrency(max);
    }
    config.validate()?;

    let llm = build_llm_client(args.api_base.clone())?;

    if args.in_memory {
        run_in_memory(config, llm, args.fixture.as_deref()).await?;
    } else {
        let db = Arc::new(connect(&args.db).await?);
        db.run_migrations().await?;

        let worker = QaWorker::new(
            config,
            Collaborators {
                queue: db.clone(),
                llm,
                balance: db.clone(),
                chunks: db.clone(),
                billing: db.clone(),
                notifier: db,
                splitter: Arc::new(SentenceSplitter::new()),
            },
        );

        let totals = if args.once {
            drain_all(&worker).await
        } else {
            worker
                .run(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!(error = %e, "Failed to listen for Ctrl-C");
                        std::future::pending::<()>().await;
                    }
                    info!("Ctrl-C received");
                })
                .await
        };
        info!(completed = totals.completed, parked = totals.parked, "Worker finished");
    }

    if args.print_metrics {
        print!("{}", metrics::export_metrics());
    }
    Ok(())
}

/// Starts a full set of drain loops and waits for all of them.
async fn drain_all(worker: &QaWorker) -> DrainSummary {
    for joined in futures::future::join_all(worker.start()).await {
        if let Err(e) = joined {
            warn!(error = %e, "Drain loop failed");
        }
    }
    worker.stats()
}

async fn run_in_memory(
    config: WorkerConfig,
    llm: Arc<dyn LlmProvider>,
    fixture: Option<&Path>,
) -> anyhow::Result<()> {
    let queue = Arc::new(MemoryTrainingQueue::new());
    let chunks = Arc::new(MemoryChunkSink::new());
    let billing = Arc::new(MemoryBilling::new());

    let tasks = match fixture {
        Some(path) => load_fixture(path)?,
        None => Vec::new(),
    };
    for task in tasks {
        queue.enqueue(task).await?;
    }
    info!(tasks = queue.len().await, "In-memory queue loaded");

    let worker = QaWorker::new(
        config,
        Collaborators {
            queue: queue.clone(),
            llm,
            balance: Arc::new(MemoryBalance::unlimited()),
            chunks: chunks.clone(),
            billing: billing.clone(),
            notifier: Arc::new(MemoryNotifier::new()),
            splitter: Arc::new(SentenceSplitter::new()),
        },
    );
    let summary = drain_all(&worker).await;

    let output = DryRunOutput {
        summary,
        chunks: chunks
            .pushes()
            .await
            .into_iter()
            .flat_map(|push| push.chunks)
            .collect(),
        total_tokens: billing
            .bills()
            .await
            .iter()
            .map(|b| u64::from(b.total_tokens))
            .sum(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Reads a JSON array of tasks.
fn load_fixture(path: &Path) -> anyhow::Result<Vec<NewTrainingTask>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixture {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid fixture {}", path.display()))
}

fn render_parse_output(args: &ParseArgs) -> anyhow::Result<String> {
    let answer = fs::read_to_string(&args.answer)
        .with_context(|| format!("Failed to read {}", args.answer.display()))?;
    let source = match &args.source {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => String::new(),
    };

    let chunks = parse_qa_answer(&answer, &source, &SentenceSplitter::new(), args.chunk_len);
    Ok(serde_json::to_string_pretty(&chunks)?)
}
