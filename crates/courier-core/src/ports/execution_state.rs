//! ExecutionStateService port - 実行状態（正本側）の削除
//!
//! 終端に達した実行の永続状態を消すための外部サービスです。

use async_trait::async_trait;

use super::CollaboratorError;
use crate::domain::{BranchMarker, ExecutionId};

#[async_trait]
pub trait ExecutionStateService: Send + Sync {
    async fn delete_execution_state(
        &self,
        execution_id: ExecutionId,
        branch: &BranchMarker,
    ) -> Result<(), CollaboratorError>;
}
