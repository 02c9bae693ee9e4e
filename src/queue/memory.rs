//! In-memory training queue.
//!
//! Every operation runs under one store-wide mutex, which gives
//! `claim_next` the same all-or-nothing semantics as the database claim.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::task::{LeaseState, NewTrainingTask, QueueStats, TrainingMode, TrainingTask};
use super::TrainingQueue;
use crate::error::StoreError;

/// Training queue held in process memory.
#[derive(Debug, Default)]
pub struct MemoryTrainingQueue {
    tasks: Mutex<HashMap<Uuid, TrainingTask>>,
}

impl MemoryTrainingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the task, if present.
    pub async fn get(&self, task_id: Uuid) -> Option<TrainingTask> {
        self.tasks.lock().await.get(&task_id).cloned()
    }

    /// Number of tasks in the store, in any state.
    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl TrainingQueue for MemoryTrainingQueue {
    async fn claim_next(
        &self,
        mode: TrainingMode,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<TrainingTask>, StoreError> {
        let mut tasks = self.tasks.lock().await;

        let Some(task) = tasks
            .values_mut()
            .filter(|t| t.is_claimable(mode, stale_before))
            .min_by_key(|t| (t.lock_time, t.created_at))
        else {
            return Ok(None);
        };

        task.lock_time = Utc::now();
        Ok(Some(task.clone()))
    }

    async fn suspend_team(&self, team_id: &str) -> Result<u64, StoreError> {
        let mut tasks = self.tasks.lock().await;
        let mut suspended = 0;
        for task in tasks
            .values_mut()
            .filter(|t| t.team_id == team_id && t.lease_state == LeaseState::Active)
        {
            task.lease_state = LeaseState::TeamSuspended;
            suspended += 1;
        }
        Ok(suspended)
    }

    async fn park(&self, task_id: Uuid) -> Result<(), StoreError> {
        let mut tasks = self.tasks.lock().await;
        let task = tasks
            .get_mut(&task_id)
            .ok_or_else(|| StoreError::NotFound(format!("training task {}", task_id)))?;
        task.lease_state = LeaseState::Parked;
        Ok(())
    }

    async fn delete(&self, task_id: Uuid) -> Result<(), StoreError> {
        self.tasks.lock().await.remove(&task_id);
        Ok(())
    }

    async fn enqueue(&self, task: NewTrainingTask) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        self.tasks
            .lock()
            .await
            .insert(id, task.into_task(id, Utc::now()));
        Ok(id)
    }

    async fn resume_team(&self, team_id: &str) -> Result<u64, StoreError> {
        let mut tasks = self.tasks.lock().await;
        let mut resumed = 0;
        for task in tasks
            .values_mut()
            .filter(|t| t.team_id == team_id && t.lease_state == LeaseState::TeamSuspended)
        {
            task.lease_state = LeaseState::Active;
            task.lock_time = DateTime::<Utc>::UNIX_EPOCH;
            resumed += 1;
        }
        Ok(resumed)
    }

    async fn unpark_task(&self, task_id: Uuid) -> Result<(), StoreError> {
        let mut tasks = self.tasks.lock().await;
        match tasks.get_mut(&task_id) {
            Some(task) if task.lease_state == LeaseState::Parked => {
                task.lease_state = LeaseState::Active;
                task.lock_time = DateTime::<Utc>::UNIX_EPOCH;
                Ok(())
            }
            _ => Err(StoreError::NotFound(format!("parked task {}", task_id))),
        }
    }

    async fn stats(&self, stale_before: DateTime<Utc>) -> Result<QueueStats, StoreError> {
        let tasks = self.tasks.lock().await;
        let mut stats = QueueStats::default();
        for task in tasks.values() {
            match task.lease_state {
                LeaseState::Active if task.lock_time <= stale_before => stats.pending += 1,
                LeaseState::Active => stats.leased += 1,
                LeaseState::TeamSuspended => stats.team_suspended += 1,
                LeaseState::Parked => stats.parked += 1,
            }
        }
        Ok(stats)
    }
}
