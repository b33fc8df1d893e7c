//! InMemoryBranchTracker - branch 完了通知を記録するだけの BranchService

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::Execution;
use crate::ports::{BranchService, CollaboratorError};

#[derive(Debug, Default)]
pub struct InMemoryBranchTracker {
    calls: Mutex<Vec<Vec<Execution>>>,
}

impl InMemoryBranchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// One entry per `end_branch` call.
    pub async fn calls(&self) -> Vec<Vec<Execution>> {
        self.calls.lock().await.clone()
    }

    pub async fn ended(&self) -> usize {
        self.calls.lock().await.iter().map(Vec::len).sum()
    }
}

#[async_trait]
impl BranchService for InMemoryBranchTracker {
    async fn end_branch(&self, executions: Vec<Execution>) -> Result<(), CollaboratorError> {
        tracing::debug!(count = executions.len(), "branches ended");
        self.calls.lock().await.push(executions);
        Ok(())
    }
}
