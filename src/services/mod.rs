//! Collaborators the QA pipeline depends on.
//!
//! Each collaborator is a trait so the worker can run against PostgreSQL
//! ([`crate::storage::Database`] implements all of them) or against the
//! in-memory implementations in [`memory`].

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{BalanceError, StoreError};
use crate::qa::TrainingChunk;
use crate::queue::TrainingMode;

pub use memory::{MemoryBalance, MemoryBilling, MemoryChunkSink, MemoryNotifier};

/// Decides whether a team may consume more model usage.
#[async_trait]
pub trait BalanceAuthority: Send + Sync {
    /// Returns `Err(BalanceError::Insufficient)` when the team is out of funds.
    async fn check(&self, team_id: &str) -> Result<(), BalanceError>;
}

/// Chunks to be written into a dataset collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushChunksRequest {
    pub team_id: String,
    pub tmb_id: String,
    pub dataset_id: String,
    pub collection_id: String,
    pub bill_id: Option<String>,
    /// Training mode the chunks are queued under.
    pub mode: TrainingMode,
    pub chunks: Vec<TrainingChunk>,
}

/// Persists training chunks as dataset entries.
#[async_trait]
pub trait ChunkSink: Send + Sync {
    /// Returns the number of chunks stored.
    async fn push_chunks(&self, request: PushChunksRequest) -> Result<usize, StoreError>;
}

/// Usage of one QA generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaBill {
    pub team_id: String,
    pub tmb_id: String,
    pub total_tokens: u32,
    pub bill_id: Option<String>,
    pub model: String,
}

/// Records chargeable usage.
#[async_trait]
pub trait BillingSink: Send + Sync {
    async fn push_qa_bill(&self, bill: QaBill) -> Result<(), StoreError>;
}

/// Category of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InformKind {
    System,
}

impl InformKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InformKind::System => "system",
        }
    }
}

/// A notification addressed to one team member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inform {
    pub kind: InformKind,
    pub title: String,
    pub content: String,
    pub tmb_id: String,
}

impl Inform {
    /// Notice sent when a team's QA training is suspended for lack of balance.
    pub fn training_suspended(tmb_id: impl Into<String>) -> Self {
        Self {
            kind: InformKind::System,
            title: "Text training task suspended".to_string(),
            content: "The team account balance is insufficient, so text training has been \
                      suspended. It will resume once the account is recharged."
                .to_string(),
            tmb_id: tmb_id.into(),
        }
    }
}

/// Delivers notifications. Callers treat delivery as best effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, inform: Inform) -> Result<(), StoreError>;
}
