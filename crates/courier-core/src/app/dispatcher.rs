//! QueueDispatcher - 実行メッセージの投入と取り出し
//!
//! # 配送プロトコル
//! - dispatch: バッチを 1 トランザクションで enqueue → commit（all-or-nothing）
//! - poll: ASSIGNED を読む → SENT + seq+1 → 再 enqueue → commit を 1 トランザクションで
//!
//! poll が返すのは commit に成功したバッチだけです。
//! 同じメッセージが再配送されると `msg_seq_id` が進むので、
//! `unique_id()` で配送ごとの冪等性キーが取れます。

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use super::terminal_router::TerminalRouter;
use crate::domain::{
    CourierError, ExecStateId, ExecStatus, ExecutionMessage, MessageId, Payload, Result, WorkerId,
};
use crate::ports::QueueStore;

pub struct QueueDispatcher {
    store: Arc<dyn QueueStore>,
    default_group: String,
    router: Option<Arc<TerminalRouter>>,
}

impl QueueDispatcher {
    pub fn new(store: Arc<dyn QueueStore>, default_group: impl Into<String>) -> Self {
        Self {
            store,
            default_group: default_group.into(),
            router: None,
        }
    }

    /// commit 後に終端メッセージを router に回す
    pub fn with_router(mut self, router: Arc<TerminalRouter>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn default_group(&self) -> &str {
        &self.default_group
    }

    /// Persist `messages` in one transaction.
    ///
    /// An empty batch touches nothing. On any store error the transaction is
    /// rolled back and nothing from the batch is visible.
    pub async fn dispatch(&self, messages: Vec<ExecutionMessage>) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let started = Instant::now();
        let mut tx = self.store.begin().await?;
        tx.enqueue(&messages).await?;
        tx.commit().await?;
        tracing::debug!(
            count = messages.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "messages dispatched"
        );

        if let Some(router) = &self.router {
            self.route_terminal(router, &messages).await?;
        }
        Ok(())
    }

    /// Build and dispatch a single fresh message.
    ///
    /// `status` is mandatory; an empty `group` falls back to the default group.
    pub async fn dispatch_one(
        &self,
        message_id: &str,
        group: &str,
        status: Option<ExecStatus>,
        payload: Payload,
    ) -> Result<()> {
        if message_id.is_empty() {
            return Err(CourierError::Validation("message id is empty".into()));
        }
        let Some(status) = status else {
            return Err(CourierError::Validation(format!(
                "status is missing for message {message_id}"
            )));
        };
        if status == ExecStatus::Init {
            return Err(CourierError::Validation(format!(
                "message {message_id} cannot be dispatched as {status}"
            )));
        }
        let group = if group.is_empty() {
            self.default_group.as_str()
        } else {
            group
        };

        let message = ExecutionMessage::with_parts(
            ExecStateId::EMPTY,
            WorkerId::empty(),
            group,
            MessageId::new(message_id),
            status,
            Some(payload),
            0,
        );
        self.dispatch(vec![message]).await
    }

    /// Claim up to `max_size` ASSIGNED messages of `worker_id` created at or after
    /// `created_since`.
    ///
    /// Returned messages are SENT and carry a bumped sequence. Nothing is returned
    /// unless the claim was committed.
    pub async fn poll(
        &self,
        worker_id: &WorkerId,
        max_size: usize,
        created_since: DateTime<Utc>,
    ) -> Result<Vec<ExecutionMessage>> {
        if max_size == 0 {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let mut tx = self.store.begin().await?;
        let mut batch = tx
            .poll(created_since, worker_id, max_size, ExecStatus::Assigned)
            .await?;
        if batch.is_empty() {
            return Ok(batch);
        }
        batch.truncate(max_size);

        for message in &mut batch {
            message.transition_to(ExecStatus::Sent)?;
            message.increment_sequence();
        }
        tx.enqueue(&batch).await?;
        tx.commit().await?;

        tracing::debug!(
            worker_id = %worker_id,
            count = batch.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "messages polled"
        );
        Ok(batch)
    }

    async fn route_terminal(
        &self,
        router: &TerminalRouter,
        messages: &[ExecutionMessage],
    ) -> Result<()> {
        let (terminated, failed): (Vec<_>, Vec<_>) = messages
            .iter()
            .filter(|m| m.status().is_terminal())
            .cloned()
            .partition(|m| m.status() == ExecStatus::Terminated);

        router.on_terminated(&terminated).await?;
        router.on_failed(&failed).await?;
        Ok(())
    }
}
