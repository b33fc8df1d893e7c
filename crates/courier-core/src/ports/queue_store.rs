//! QueueStore port - 実行メッセージの永続キュー（正本）
//!
//! dispatcher は store に対して「トランザクション単位」でしか触りません。
//! `begin()` で得たハンドルの上で enqueue / poll を行い、`commit()` で確定します。
//! commit せずにハンドルを drop した場合はロールバックです。
//!
//! # 契約
//! - enqueue: バッチ全体が commit 時に一括で反映される（all-or-nothing）
//! - enqueue: `exec_state_id` が EMPTY のメッセージには行 ID と作成時刻を採番する
//! - poll: 返した行はトランザクションが終わるまで他のトランザクションから
//!   claim できない（行ロック or トランザクションの直列化）
//! - 終端ステータス（TERMINATED / FAILED）の行の物理削除は store の責務

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{ExecStatus, ExecutionMessage, WorkerId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("transaction conflict: {0}")]
    Conflict(String),

    #[error("store operation failed: {0}")]
    OperationFailed(String),
}

/// QueueStore はトランザクションを開くだけの入口
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn QueueTransaction>, StoreError>;
}

/// One atomic unit of work against the queue.
#[async_trait]
pub trait QueueTransaction: Send {
    /// Insert new rows or update existing ones (by `exec_state_id`).
    async fn enqueue(&mut self, messages: &[ExecutionMessage]) -> Result<(), StoreError>;

    /// Read up to `max_size` rows in `status` for `worker_id` created at or after
    /// `created_since`. Selection order is store-defined.
    async fn poll(
        &mut self,
        created_since: DateTime<Utc>,
        worker_id: &WorkerId,
        max_size: usize,
        status: ExecStatus,
    ) -> Result<Vec<ExecutionMessage>, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
