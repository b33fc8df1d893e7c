//! BranchService port - split/join の branch 完了通知
//!
//! merge の中身は外部サービスの責務。queue 側は完了した branch の実行参照を
//! 1 回の呼び出しにまとめて渡すだけです。

use async_trait::async_trait;

use super::CollaboratorError;
use crate::domain::Execution;

#[async_trait]
pub trait BranchService: Send + Sync {
    async fn end_branch(&self, executions: Vec<Execution>) -> Result<(), CollaboratorError>;
}
