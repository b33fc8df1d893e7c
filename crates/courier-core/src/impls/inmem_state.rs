//! InMemoryExecutionStates - 実行状態サービスのインメモリ版
//!
//! 削除呼び出しを記録するので、terminal router のテストで
//! 「どの実行の状態が消されたか」を検証できます。

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{BranchMarker, ExecutionId};
use crate::ports::{CollaboratorError, ExecutionStateService};

#[derive(Debug, Default)]
pub struct InMemoryExecutionStates {
    deletions: Mutex<Vec<(ExecutionId, BranchMarker)>>,
    fail_on: Mutex<Option<ExecutionId>>,
}

impl InMemoryExecutionStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delete call, in call order.
    pub async fn deletions(&self) -> Vec<(ExecutionId, BranchMarker)> {
        self.deletions.lock().await.clone()
    }

    /// Make the next delete of `execution_id` fail.
    pub async fn fail_on(&self, execution_id: ExecutionId) {
        *self.fail_on.lock().await = Some(execution_id);
    }
}

#[async_trait]
impl ExecutionStateService for InMemoryExecutionStates {
    async fn delete_execution_state(
        &self,
        execution_id: ExecutionId,
        branch: &BranchMarker,
    ) -> Result<(), CollaboratorError> {
        {
            let mut fail_on = self.fail_on.lock().await;
            if *fail_on == Some(execution_id) {
                *fail_on = None;
                return Err(CollaboratorError::new(
                    "execution-state",
                    format!("cannot delete state of {execution_id}"),
                ));
            }
        }

        // deleting a missing state is not an error
        self.deletions.lock().await.push((execution_id, *branch));
        Ok(())
    }
}
