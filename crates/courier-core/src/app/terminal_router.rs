//! TerminalRouter - 終端メッセージの後始末
//!
//! TERMINATED / FAILED に達したメッセージについて、
//! 実行状態の削除・ライフサイクルイベントの publish・branch 完了通知を行います。
//!
//! # 流れ
//! 1. バッチ全体の実行参照を取り出す（1 件でも失敗したら副作用なしで中断）
//! 2. branch かどうかで振り分ける（純粋関数 `partition_by_branch`）
//! 3. イベントを 1 回で emit → 状態削除 → branch を 1 回で end_branch
//!
//! 外部サービスの呼び出し回数はグループが空かどうかだけで決まります。
//!
//! # 失敗時
//! - emit が失敗したら状態は 1 件も削除しない
//! - 状態削除はバッチ全件を試し、失敗した実行 id を
//!   `CourierError::StateCleanup` にまとめて返す（呼び出し側で削除を再試行できる）
//!
//! どちらの場合も「状態だけ消えてイベントが出ていない」実行は残りません。

use std::sync::Arc;

use crate::domain::{
    BranchMarker, CourierError, DomainEvent, Execution, ExecutionMessage, Result,
};
use crate::ports::{BranchService, EventFactory, EventSink, ExecutionCodec, ExecutionStateService};

/// Executions split by whether they run inside a split branch.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BranchPartition {
    pub plain: Vec<Execution>,
    pub branched: Vec<Execution>,
}

/// Split `executions` by `Execution::is_branch`, keeping input order in both halves.
pub fn partition_by_branch(executions: Vec<Execution>) -> BranchPartition {
    let (branched, plain): (Vec<_>, Vec<_>) =
        executions.into_iter().partition(Execution::is_branch);
    BranchPartition { plain, branched }
}

pub struct TerminalRouter {
    codec: Arc<dyn ExecutionCodec>,
    states: Arc<dyn ExecutionStateService>,
    branches: Arc<dyn BranchService>,
    events: Arc<dyn EventSink>,
    factory: Arc<dyn EventFactory>,
}

impl TerminalRouter {
    pub fn new(
        codec: Arc<dyn ExecutionCodec>,
        states: Arc<dyn ExecutionStateService>,
        branches: Arc<dyn BranchService>,
        events: Arc<dyn EventSink>,
        factory: Arc<dyn EventFactory>,
    ) -> Self {
        Self {
            codec,
            states,
            branches,
            events,
            factory,
        }
    }

    /// Clean up after successfully finished executions.
    ///
    /// Plain executions lose their persisted state and get one finished event each;
    /// branch executions are handed to the branch service in one call.
    pub async fn on_terminated(&self, messages: &[ExecutionMessage]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let BranchPartition { plain, branched } = partition_by_branch(self.executions_of(messages)?);
        let events: Vec<DomainEvent> = plain
            .iter()
            .map(|execution| self.factory.finished_event(execution))
            .collect();

        self.publish(events).await?;
        let cleanup = self.delete_states(&plain).await;
        self.end_branches(branched).await?;
        cleanup?;

        tracing::debug!(count = messages.len(), "terminated batch routed");
        Ok(())
    }

    /// Clean up after failed executions.
    ///
    /// Every execution loses its persisted state. Plain executions get a failure
    /// event; branch executions get a failed-branch event and are also handed to
    /// the branch service.
    pub async fn on_failed(&self, messages: &[ExecutionMessage]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let executions = self.executions_of(messages)?;
        let events: Vec<DomainEvent> = executions
            .iter()
            .map(|execution| {
                if execution.is_branch() {
                    self.factory.failed_branch_event(execution)
                } else {
                    self.factory.failure_event(execution)
                }
            })
            .collect();

        self.publish(events).await?;
        let cleanup = self.delete_states(&executions).await;
        let BranchPartition { branched, .. } = partition_by_branch(executions);
        self.end_branches(branched).await?;
        cleanup?;

        tracing::debug!(count = messages.len(), "failed batch routed");
        Ok(())
    }

    /// Decode the whole batch up front so a bad payload aborts before any side effect.
    fn executions_of(&self, messages: &[ExecutionMessage]) -> Result<Vec<Execution>> {
        messages
            .iter()
            .map(|message| -> Result<Execution> {
                if let Some(execution) = message.execution() {
                    return Ok(execution.clone());
                }
                let payload = message
                    .payload()
                    .ok_or_else(|| CourierError::MissingPayload(message.msg_id().clone()))?;
                Ok(self.codec.decode(payload)?)
            })
            .collect()
    }

    /// Attempt every deletion; failures are collected rather than cutting the batch short.
    async fn delete_states(&self, executions: &[Execution]) -> Result<()> {
        let mut pending = Vec::new();
        let mut first_err = None;
        for execution in executions {
            let deleted = self
                .states
                .delete_execution_state(execution.execution_id, &BranchMarker::Empty)
                .await;
            if let Err(e) = deleted {
                tracing::warn!(execution_id = %execution.execution_id, error = %e, "state cleanup failed");
                pending.push(execution.execution_id);
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(source) => Err(CourierError::StateCleanup { pending, source }),
            None => Ok(()),
        }
    }

    async fn publish(&self, events: Vec<DomainEvent>) -> Result<()> {
        if !events.is_empty() {
            self.events.emit(events).await?;
        }
        Ok(())
    }

    async fn end_branches(&self, branched: Vec<Execution>) -> Result<()> {
        if !branched.is_empty() {
            self.branches.end_branch(branched).await?;
        }
        Ok(())
    }
}
