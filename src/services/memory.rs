//! In-memory collaborators for tests and dry runs.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{
    BalanceAuthority, BillingSink, ChunkSink, Inform, Notifier, PushChunksRequest, QaBill,
};
use crate::error::{BalanceError, StoreError};

/// Balance ledger keyed by team id.
///
/// Teams without an entry get `default_balance`.
#[derive(Debug)]
pub struct MemoryBalance {
    balances: Mutex<HashMap<String, i64>>,
    default_balance: i64,
}

impl MemoryBalance {
    /// Every team has funds unless set otherwise.
    pub fn unlimited() -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            default_balance: i64::MAX,
        }
    }

    pub async fn set_balance(&self, team_id: impl Into<String>, balance: i64) {
        self.balances.lock().await.insert(team_id.into(), balance);
    }
}

#[async_trait]
impl BalanceAuthority for MemoryBalance {
    async fn check(&self, team_id: &str) -> Result<(), BalanceError> {
        let balance = self
            .balances
            .lock()
            .await
            .get(team_id)
            .copied()
            .unwrap_or(self.default_balance);
        if balance > 0 {
            Ok(())
        } else {
            Err(BalanceError::Insufficient {
                team_id: team_id.to_string(),
            })
        }
    }
}

/// Records every push it receives.
#[derive(Debug, Default)]
pub struct MemoryChunkSink {
    pushes: Mutex<Vec<PushChunksRequest>>,
}

impl MemoryChunkSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn pushes(&self) -> Vec<PushChunksRequest> {
        self.pushes.lock().await.clone()
    }
}

#[async_trait]
impl ChunkSink for MemoryChunkSink {
    async fn push_chunks(&self, request: PushChunksRequest) -> Result<usize, StoreError> {
        if request.chunks.iter().any(|c| c.q.trim().is_empty()) {
            return Err(StoreError::InvalidMessageFormat);
        }
        let count = request.chunks.len();
        self.pushes.lock().await.push(request);
        Ok(count)
    }
}

/// Records every bill it receives.
#[derive(Debug, Default)]
pub struct MemoryBilling {
    bills: Mutex<Vec<QaBill>>,
}

impl MemoryBilling {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn bills(&self) -> Vec<QaBill> {
        self.bills.lock().await.clone()
    }
}

#[async_trait]
impl BillingSink for MemoryBilling {
    async fn push_qa_bill(&self, bill: QaBill) -> Result<(), StoreError> {
        self.bills.lock().await.push(bill);
        Ok(())
    }
}

/// Records every notification it receives.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<Inform>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<Inform> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send(&self, inform: Inform) -> Result<(), StoreError> {
        tracing::debug!(tmb_id = %inform.tmb_id, title = %inform.title, "Inform recorded");
        self.sent.lock().await.push(inform);
        Ok(())
    }
}
