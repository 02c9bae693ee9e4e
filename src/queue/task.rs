//! Training task definitions and lease state.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// What a training task asks the workers to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingMode {
    /// Embed ready-made chunks.
    Chunk,
    /// Generate question/answer pairs with a model first.
    Qa,
}

impl TrainingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingMode::Chunk => "chunk",
            TrainingMode::Qa => "qa",
        }
    }
}

impl fmt::Display for TrainingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrainingMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chunk" => Ok(TrainingMode::Chunk),
            "qa" => Ok(TrainingMode::Qa),
            other => Err(StoreError::InvalidValue {
                field: "mode".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Claimability of a task, kept next to its lease timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseState {
    /// Claimable once `lock_time` is older than the staleness threshold.
    Active,
    /// The owning team ran out of balance; waits for `resume_team`.
    TeamSuspended,
    /// Failed with a non-retryable error; waits for `unpark_task`.
    Parked,
}

impl LeaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseState::Active => "active",
            LeaseState::TeamSuspended => "team_suspended",
            LeaseState::Parked => "parked",
        }
    }
}

impl fmt::Display for LeaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeaseState {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(LeaseState::Active),
            "team_suspended" => Ok(LeaseState::TeamSuspended),
            "parked" => Ok(LeaseState::Parked),
            other => Err(StoreError::InvalidValue {
                field: "lease_state".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// A pending training task as stored in the shared queue table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingTask {
    pub id: Uuid,
    pub team_id: String,
    /// Team member who owns the task; receives notifications.
    pub tmb_id: String,
    pub dataset_id: String,
    pub collection_id: String,
    pub mode: TrainingMode,
    /// Source text.
    pub q: String,
    /// Custom prompt template with a `{{text}}` placeholder.
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub bill_id: Option<String>,
    /// Time of the last claim; the epoch for never-claimed tasks.
    pub lock_time: DateTime<Utc>,
    pub lease_state: LeaseState,
    pub created_at: DateTime<Utc>,
}

impl TrainingTask {
    /// Whether a claim with the given staleness cutoff may take this task.
    pub fn is_claimable(&self, mode: TrainingMode, stale_before: DateTime<Utc>) -> bool {
        self.mode == mode
            && self.lease_state == LeaseState::Active
            && self.lock_time <= stale_before
    }

    /// First characters of the source text, for log lines.
    pub fn text_snippet(&self, max_chars: usize) -> String {
        let mut snippet: String = self.q.chars().take(max_chars).collect();
        if self.q.chars().count() > max_chars {
            snippet.push('…');
        }
        snippet
    }
}

/// A task to be inserted into the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTrainingTask {
    pub team_id: String,
    pub tmb_id: String,
    pub dataset_id: String,
    pub collection_id: String,
    pub mode: TrainingMode,
    pub q: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub bill_id: Option<String>,
}

impl NewTrainingTask {
    /// Creates a QA task for the given owner and source text.
    pub fn qa(
        team_id: impl Into<String>,
        tmb_id: impl Into<String>,
        dataset_id: impl Into<String>,
        collection_id: impl Into<String>,
        q: impl Into<String>,
    ) -> Self {
        Self {
            team_id: team_id.into(),
            tmb_id: tmb_id.into(),
            dataset_id: dataset_id.into(),
            collection_id: collection_id.into(),
            mode: TrainingMode::Qa,
            q: q.into(),
            prompt: None,
            model: None,
            bill_id: None,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_bill_id(mut self, bill_id: impl Into<String>) -> Self {
        self.bill_id = Some(bill_id.into());
        self
    }

    /// Materializes the task as a never-claimed active row.
    pub fn into_task(self, id: Uuid, now: DateTime<Utc>) -> TrainingTask {
        TrainingTask {
            id,
            team_id: self.team_id,
            tmb_id: self.tmb_id,
            dataset_id: self.dataset_id,
            collection_id: self.collection_id,
            mode: self.mode,
            q: self.q,
            prompt: self.prompt,
            model: self.model,
            bill_id: self.bill_id,
            lock_time: DateTime::<Utc>::UNIX_EPOCH,
            lease_state: LeaseState::Active,
            created_at: now,
        }
    }
}

/// Queue counts at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Active tasks whose lease is stale or absent.
    pub pending: u64,
    /// Active tasks currently leased by some worker.
    pub leased: u64,
    pub team_suspended: u64,
    pub parked: u64,
}

impl QueueStats {
    /// Returns the total number of tasks.
    pub fn total(&self) -> u64 {
        self.pending + self.leased + self.team_suspended + self.parked
    }
}
