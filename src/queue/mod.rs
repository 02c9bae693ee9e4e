//! Shared training queue with lease-based claiming.
//!
//! Workers in any number of processes pull tasks from one queue table. A
//! task is taken with a single atomic claim that bumps its `lock_time`; a
//! lease older than the staleness threshold is considered abandoned and the
//! task becomes claimable again. The store's atomic claim is the only thing
//! preventing double processing.
//!
//! # Lease lifecycle
//!
//! ```text
//!   enqueue ──► Active(lock_time = epoch)
//!                 │ claim_next: lock_time = now
//!                 ▼
//!               Active(leased) ──► delete            (success)
//!                 │   │
//!                 │   └─────────► Parked             (non-retryable error)
//!                 └─────────────► TeamSuspended      (team out of balance)
//! ```
//!
//! Implementations:
//!
//! - [`MemoryTrainingQueue`]: in-process store for tests and dry runs
//! - [`crate::storage::Database`]: PostgreSQL store shared across processes

pub mod memory;
pub mod task;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;

pub use memory::MemoryTrainingQueue;
pub use task::{LeaseState, NewTrainingTask, QueueStats, TrainingMode, TrainingTask};

/// Operations the worker needs from the shared queue table.
#[async_trait]
pub trait TrainingQueue: Send + Sync {
    /// Atomically leases one active task of `mode` whose lease is older than
    /// `stale_before`, setting its `lock_time` to now.
    ///
    /// Returns `Ok(None)` when no task is eligible.
    async fn claim_next(
        &self,
        mode: TrainingMode,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<TrainingTask>, StoreError>;

    /// Moves every active task of the team to `TeamSuspended`.
    ///
    /// Returns the number of tasks suspended.
    async fn suspend_team(&self, team_id: &str) -> Result<u64, StoreError>;

    /// Moves the task to `Parked`.
    async fn park(&self, task_id: Uuid) -> Result<(), StoreError>;

    /// Removes the task. Deleting an absent task is not an error.
    async fn delete(&self, task_id: Uuid) -> Result<(), StoreError>;

    /// Inserts a new, immediately claimable task.
    async fn enqueue(&self, task: NewTrainingTask) -> Result<Uuid, StoreError>;

    /// Makes the team's suspended tasks claimable again.
    async fn resume_team(&self, team_id: &str) -> Result<u64, StoreError>;

    /// Makes a parked task claimable again.
    async fn unpark_task(&self, task_id: Uuid) -> Result<(), StoreError>;

    /// Counts tasks per lease state.
    async fn stats(&self, stale_before: DateTime<Utc>) -> Result<QueueStats, StoreError>;
}
