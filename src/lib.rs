//! qa-forge: QA-generation training worker.
//!
//! Leases QA training tasks from a shared queue, asks a language model to
//! turn each task's text into question/answer pairs, stores the pairs as
//! dataset chunks and bills the owning team.

pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod qa;
pub mod queue;
pub mod services;
pub mod storage;
pub mod worker;

// Re-export commonly used types
pub use config::{ConfigError, WorkerConfig};
pub use error::{BalanceError, LlmError, PipelineError, StoreError};
pub use worker::{Collaborators, QaWorker};
