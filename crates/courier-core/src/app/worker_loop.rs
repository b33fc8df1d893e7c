//! WorkerLoop - ワーカー側の実行ループ
//!
//! # フロー
//! 1. QueueDispatcher::poll() で自分宛ての ASSIGNED を claim（→ SENT）
//! 2. IN_PROGRESS を報告（OutboundBuffer 経由で dispatch）
//! 3. payload から Execution を取り出して ExecutionHandler を実行
//! 4. 結果を TERMINATED / FAILED として報告
//!
//! 報告は OutboundBuffer に溜め、重みが上限に達したときとバッチの最後に flush します。
//! 終端メッセージの後始末は dispatcher に紐づいた TerminalRouter が行います。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::dispatcher::QueueDispatcher;
use super::outbound_buffer::OutboundBuffer;
use crate::config::PollConfig;
use crate::domain::{
    CourierError, ErrorKind, ExecStatus, Execution, ExecutionMessage, Result, WorkerId,
};
use crate::ports::{Clock, ExecutionCodec};

/// 1 つの実行を処理するユーザーコード
#[async_trait]
pub trait ExecutionHandler: Send + Sync {
    /// `Err` の理由はログに出され、メッセージは FAILED になる
    async fn handle(&self, execution: &Execution) -> std::result::Result<(), String>;
}

pub struct WorkerLoop {
    worker_id: WorkerId,
    dispatcher: Arc<QueueDispatcher>,
    codec: Arc<dyn ExecutionCodec>,
    handler: Arc<dyn ExecutionHandler>,
    clock: Arc<dyn Clock>,
    poll: PollConfig,
    buffer: OutboundBuffer<ExecutionMessage>,
}

impl WorkerLoop {
    pub fn new(
        worker_id: WorkerId,
        dispatcher: Arc<QueueDispatcher>,
        codec: Arc<dyn ExecutionCodec>,
        handler: Arc<dyn ExecutionHandler>,
        clock: Arc<dyn Clock>,
        poll: PollConfig,
        max_weight: u32,
    ) -> Self {
        Self {
            worker_id,
            dispatcher,
            codec,
            handler,
            clock,
            poll,
            buffer: OutboundBuffer::new(max_weight),
        }
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    /// Poll once and process the batch. Returns the number of messages handled.
    pub async fn run_once(&self) -> Result<usize> {
        let created_since = self.poll.created_since(self.clock.now());
        let batch = self
            .dispatcher
            .poll(&self.worker_id, self.poll.max_batch_size, created_since)
            .await?;
        if batch.is_empty() {
            return Ok(0);
        }

        let started = batch
            .into_iter()
            .map(|mut message| -> Result<ExecutionMessage> {
                message.transition_to(ExecStatus::InProgress)?;
                Ok(message)
            })
            .collect::<Result<Vec<_>>>()?;
        let count = started.len();

        // IN_PROGRESS にしたメッセージは途中で失敗しても全て報告まで進める
        let mut first_err = None;
        self.buffer.put(started.clone()).await;
        if let Err(e) = self.flush().await {
            self.keep_first(&mut first_err, e);
        }
        for message in started {
            match self.execute(message).await {
                Ok(report) => {
                    if self.buffer.put(vec![report]).await
                        && let Err(e) = self.flush().await
                    {
                        self.keep_first(&mut first_err, e);
                    }
                }
                Err(e) => self.keep_first(&mut first_err, e),
            }
        }
        if let Err(e) = self.flush().await {
            self.keep_first(&mut first_err, e);
        }

        if let Some(e) = first_err {
            return Err(e);
        }
        tracing::debug!(worker_id = %self.worker_id, count, "batch processed");
        Ok(count)
    }

    /// The first error of a batch is returned; later ones are only logged.
    fn keep_first(&self, first_err: &mut Option<CourierError>, err: CourierError) {
        if first_err.is_none() {
            *first_err = Some(err);
        } else {
            tracing::warn!(worker_id = %self.worker_id, error = %err, "batch step failed");
        }
    }

    /// Run until `shutdown_rx` turns `true` or its sender goes away.
    pub async fn run(&self, shutdown_rx: &mut watch::Receiver<bool>) {
        tracing::info!(worker_id = %self.worker_id, "worker started");
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let idle = match self.run_once().await {
                Ok(handled) => handled == 0,
                Err(e) => {
                    let kind = e.kind();
                    tracing::warn!(worker_id = %self.worker_id, error = %e, ?kind, "worker iteration failed");
                    // conflicts clear up on their own, retry without waiting
                    kind != ErrorKind::Transient
                }
            };
            if !idle {
                continue;
            }

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.poll.interval()) => {}
            }
        }
        tracing::info!(worker_id = %self.worker_id, "worker stopped");
    }

    /// Run the handler for one IN_PROGRESS message and return its terminal report.
    async fn execute(&self, message: ExecutionMessage) -> Result<ExecutionMessage> {
        let (mut report, outcome) = match self.decode(&message) {
            Ok(execution) => {
                let outcome = self.handler.handle(&execution).await;
                (message.with_execution(execution), outcome)
            }
            Err(e) => {
                let reason = e.to_string();
                (message, Err(reason))
            }
        };

        let next = match outcome {
            Ok(()) => ExecStatus::Terminated,
            Err(reason) => {
                tracing::warn!(
                    worker_id = %self.worker_id,
                    msg_id = %report.msg_id(),
                    reason = %reason,
                    "execution failed"
                );
                ExecStatus::Failed
            }
        };
        report.transition_to(next)?;
        Ok(report)
    }

    fn decode(&self, message: &ExecutionMessage) -> Result<Execution> {
        let payload = message
            .payload()
            .ok_or_else(|| CourierError::MissingPayload(message.msg_id().clone()))?;
        Ok(self.codec.decode(payload)?)
    }

    async fn flush(&self) -> Result<()> {
        let entries = self.buffer.drain().await;
        self.dispatcher.dispatch(entries).await
    }
}

/// Worker group handle.
/// - `request_shutdown()` で全ワーカーに停止を通知（処理中のバッチは最後まで実行）
/// - `shutdown_and_join()` で全ワーカーの終了を待てる
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    pub fn spawn(loops: Vec<Arc<WorkerLoop>>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let joins = loops
            .into_iter()
            .map(|worker| {
                let mut rx = shutdown_rx.clone();
                tokio::spawn(async move { worker.run(&mut rx).await })
            })
            .collect();

        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(e) = join.await {
                tracing::error!(error = %e, "worker task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::terminal_router::TerminalRouter;
    use crate::domain::{EventType, ExecutionId, MessageId, Payload};
    use crate::impls::{
        DefaultEventFactory, InMemoryBranchTracker, InMemoryExecutionStates, InMemoryQueueStore,
        JsonExecutionCodec, RecordingEventSink, WorkerAssigner,
    };
    use crate::ports::SystemClock;
    use std::time::Duration;

    /// context に "fail" を持つ実行だけ失敗させる
    struct FlakyHandler;

    #[async_trait]
    impl ExecutionHandler for FlakyHandler {
        async fn handle(&self, execution: &Execution) -> std::result::Result<(), String> {
            if execution.context.contains_key("fail") {
                Err("told to fail".into())
            } else {
                Ok(())
            }
        }
    }

    struct Harness {
        store: Arc<InMemoryQueueStore>,
        dispatcher: Arc<QueueDispatcher>,
        events: Arc<RecordingEventSink>,
        states: Arc<InMemoryExecutionStates>,
    }

    fn harness(workers: &[&str]) -> Harness {
        let mut assigner = WorkerAssigner::new();
        for worker in workers {
            assigner.register("g", WorkerId::new(*worker));
        }
        let store = Arc::new(InMemoryQueueStore::default().with_assigner(Arc::new(assigner)));
        let states = Arc::new(InMemoryExecutionStates::new());
        let events = Arc::new(RecordingEventSink::new());
        let router = Arc::new(TerminalRouter::new(
            Arc::new(JsonExecutionCodec),
            states.clone(),
            Arc::new(InMemoryBranchTracker::new()),
            events.clone(),
            Arc::new(DefaultEventFactory),
        ));
        let dispatcher = Arc::new(QueueDispatcher::new(store.clone(), "g").with_router(router));
        Harness {
            store,
            dispatcher,
            events,
            states,
        }
    }

    fn worker(h: &Harness, id: &str, max_weight: u32) -> WorkerLoop {
        WorkerLoop::new(
            WorkerId::new(id),
            Arc::clone(&h.dispatcher),
            Arc::new(JsonExecutionCodec),
            Arc::new(FlakyHandler),
            Arc::new(SystemClock),
            PollConfig {
                interval_ms: 10,
                ..PollConfig::default()
            },
            max_weight,
        )
    }

    async fn submit(h: &Harness, execution: &Execution) {
        let payload = JsonExecutionCodec.encode(execution).unwrap();
        h.dispatcher
            .dispatch_one(
                &MessageId::from(execution.execution_id).to_string(),
                "g",
                Some(ExecStatus::Pending),
                payload,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn run_once_drives_messages_to_terminal_states() {
        let h = harness(&["w1"]);
        let ok = Execution::new(ExecutionId::generate(), 1);
        let bad = Execution::new(ExecutionId::generate(), 1).with_context("fail", "yes");
        submit(&h, &ok).await;
        submit(&h, &bad).await;

        let handled = worker(&h, "w1", 100).run_once().await.unwrap();
        assert_eq!(handled, 2);

        let counts = h.store.counts_by_status().await;
        assert_eq!(counts.live(), 0);
        assert_eq!(counts.terminated, 1);
        assert_eq!(counts.failed, 1);

        let types: Vec<_> = h.events.events().await.iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec![EventType::Finished, EventType::Failure]);
        assert_eq!(h.states.deletions().await.len(), 2);
    }

    #[tokio::test]
    async fn run_once_with_nothing_assigned_is_idle() {
        let h = harness(&["w1"]);
        assert_eq!(worker(&h, "w1", 100).run_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn undecodable_payload_is_reported_as_failed() {
        let h = harness(&["w1"]);
        h.dispatcher
            .dispatch_one("junk", "g", Some(ExecStatus::Pending), Payload::new(b"?".to_vec()))
            .await
            .unwrap();

        let err = worker(&h, "w1", 100).run_once().await.unwrap_err();
        // the FAILED report is committed, routing then cannot decode it either
        assert!(matches!(err, CourierError::Codec(_)));
        assert_eq!(h.store.counts_by_status().await.failed, 1);
    }

    #[tokio::test]
    async fn failed_flush_does_not_strand_the_rest_of_the_batch() {
        let h = harness(&["w1"]);
        h.dispatcher
            .dispatch_one("junk", "g", Some(ExecStatus::Pending), Payload::new(b"?".to_vec()))
            .await
            .unwrap();
        submit(&h, &Execution::new(ExecutionId::generate(), 1)).await;

        // every report flushes on its own, the junk one fails in routing
        let w = worker(&h, "w1", 1);
        let err = w.run_once().await.unwrap_err();
        assert!(matches!(err, CourierError::Codec(_)));

        let counts = h.store.counts_by_status().await;
        assert_eq!(counts.live(), 0);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.terminated, 1);
        let types: Vec<_> = h.events.events().await.iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec![EventType::Finished]);

        assert_eq!(w.run_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn small_buffer_flushes_mid_batch() {
        let h = harness(&["w1"]);
        for _ in 0..5 {
            submit(&h, &Execution::new(ExecutionId::generate(), 1)).await;
        }
        assert_eq!(worker(&h, "w1", 1).run_once().await.unwrap(), 5);
        assert_eq!(h.store.counts_by_status().await.terminated, 5);
    }

    #[tokio::test]
    async fn worker_group_drains_queue_and_stops() {
        let h = harness(&["w1", "w2"]);
        for _ in 0..20 {
            submit(&h, &Execution::new(ExecutionId::generate(), 1)).await;
        }

        let group = WorkerGroup::spawn(vec![
            Arc::new(worker(&h, "w1", 4)),
            Arc::new(worker(&h, "w2", 4)),
        ]);
        assert_eq!(group.len(), 2);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while h.store.counts_by_status().await.live() > 0 {
            assert!(tokio::time::Instant::now() < deadline, "queue not drained");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        group.shutdown_and_join().await;

        assert_eq!(h.store.counts_by_status().await.terminated, 20);
        assert_eq!(h.events.events().await.len(), 20);
    }
}
