//! InMemoryQueueStore - 開発・テスト用のキューストア
//!
//! # 学習ポイント
//! - `tokio::sync::Mutex::lock_owned` でトランザクションの間ロックを保持する
//! - 書き込みは差分（StagedWrites）に積み、commit で反映する（drop = rollback）
//! - fault injection で all-or-nothing をテストする
//!
//! トランザクションは直列化されるので、poll が返した行を他のトランザクションが
//! 同時に claim することはありません。
//!
//! # 退役した行
//! id は単調に採番されるので、`next_id` 未満で live でない id は退役済みとみなす。
//! tombstone を持たないため、処理量が増えてもメモリは live 行の数にしか比例しない。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::assigner::WorkerAssigner;
use crate::domain::{ExecStateId, ExecStatus, ExecutionMessage, WorkerId};
use crate::observability::QueueCounts;
use crate::ports::{Clock, QueueStore, QueueTransaction, StoreError, SystemClock};

/// テスト用の障害注入。次に開かれるトランザクションに 1 回だけ適用される。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFault {
    /// `begin` fails with `Unavailable`.
    Begin,
    /// `enqueue` fails after staging this many messages.
    EnqueueAfter(usize),
    /// `commit` fails with `Conflict`.
    Commit,
}

#[derive(Debug)]
struct StoreState {
    rows: BTreeMap<ExecStateId, ExecutionMessage>,
    next_id: i64,
    terminated: usize,
    failed: usize,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
            terminated: 0,
            failed: 0,
        }
    }
}

/// 1 行分の未コミットの書き込み
#[derive(Debug)]
enum StagedWrite {
    Put(ExecutionMessage),
    Retire(ExecStatus),
}

/// トランザクション中の差分。commit までベースの状態には触れない。
#[derive(Debug)]
struct StagedWrites {
    writes: BTreeMap<ExecStateId, StagedWrite>,
    next_id: i64,
}

impl StagedWrites {
    fn new(base: &StoreState) -> Self {
        Self {
            writes: BTreeMap::new(),
            next_id: base.next_id,
        }
    }

    fn allocate_id(&mut self) -> ExecStateId {
        let id = ExecStateId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// Staged view of a row: the pending write if any, otherwise the committed row.
    fn live_row<'a>(&'a self, base: &'a StoreState, id: ExecStateId) -> Option<&'a ExecutionMessage> {
        match self.writes.get(&id) {
            Some(StagedWrite::Put(row)) => Some(row),
            Some(StagedWrite::Retire(_)) => None,
            None => base.rows.get(&id),
        }
    }

    fn is_retired(&self, base: &StoreState, id: ExecStateId) -> bool {
        id.value() < self.next_id && self.live_row(base, id).is_none()
    }

    fn apply(self, state: &mut StoreState) {
        for (id, write) in self.writes {
            match write {
                StagedWrite::Put(row) => {
                    state.rows.insert(id, row);
                }
                StagedWrite::Retire(status) => {
                    state.rows.remove(&id);
                    match status {
                        ExecStatus::Terminated => state.terminated += 1,
                        ExecStatus::Failed => state.failed += 1,
                        _ => {}
                    }
                }
            }
        }
        state.next_id = self.next_id;
    }
}

pub struct InMemoryQueueStore {
    state: Arc<Mutex<StoreState>>,
    clock: Arc<dyn Clock>,
    assigner: Option<Arc<WorkerAssigner>>,
    fault: Mutex<Option<InjectedFault>>,
    transactions_started: AtomicUsize,
}

impl InMemoryQueueStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            clock,
            assigner: None,
            fault: Mutex::new(None),
            transactions_started: AtomicUsize::new(0),
        }
    }

    /// PENDING メッセージを enqueue 時に割り当てる
    pub fn with_assigner(mut self, assigner: Arc<WorkerAssigner>) -> Self {
        self.assigner = Some(assigner);
        self
    }

    pub async fn inject_fault(&self, fault: InjectedFault) {
        *self.fault.lock().await = Some(fault);
    }

    pub fn transactions_started(&self) -> usize {
        self.transactions_started.load(Ordering::SeqCst)
    }

    pub async fn counts_by_status(&self) -> QueueCounts {
        let state = self.state.lock().await;
        let mut counts = QueueCounts {
            terminated: state.terminated,
            failed: state.failed,
            ..QueueCounts::default()
        };
        for row in state.rows.values() {
            match row.status() {
                ExecStatus::Pending => counts.pending += 1,
                ExecStatus::Assigned => counts.assigned += 1,
                ExecStatus::Sent => counts.sent += 1,
                ExecStatus::InProgress => counts.in_progress += 1,
                // INIT is rejected and terminal rows are retired on enqueue
                ExecStatus::Init | ExecStatus::Terminated | ExecStatus::Failed => {}
            }
        }
        counts
    }

    /// Live rows ordered by `exec_state_id`.
    pub async fn snapshot(&self) -> Vec<ExecutionMessage> {
        self.state.lock().await.rows.values().cloned().collect()
    }

    pub async fn get(&self, id: ExecStateId) -> Option<ExecutionMessage> {
        self.state.lock().await.rows.get(&id).cloned()
    }
}

impl Default for InMemoryQueueStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn begin(&self) -> Result<Box<dyn QueueTransaction>, StoreError> {
        let fault = self.fault.lock().await.take();
        if fault == Some(InjectedFault::Begin) {
            return Err(StoreError::Unavailable("injected begin fault".into()));
        }

        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = StagedWrites::new(&guard);
        self.transactions_started.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(InMemoryTransaction {
            guard,
            staged,
            now: self.clock.now(),
            assigner: self.assigner.clone(),
            fault,
        }))
    }
}

/// ロックを握ったまま差分に書き込み、commit で反映する
struct InMemoryTransaction {
    guard: OwnedMutexGuard<StoreState>,
    staged: StagedWrites,
    now: DateTime<Utc>,
    assigner: Option<Arc<WorkerAssigner>>,
    fault: Option<InjectedFault>,
}

#[async_trait]
impl QueueTransaction for InMemoryTransaction {
    async fn enqueue(&mut self, messages: &[ExecutionMessage]) -> Result<(), StoreError> {
        for (staged_count, message) in messages.iter().enumerate() {
            if self.fault == Some(InjectedFault::EnqueueAfter(staged_count)) {
                return Err(StoreError::OperationFailed(format!(
                    "injected enqueue fault after {staged_count} messages"
                )));
            }
            if message.status() == ExecStatus::Init {
                return Err(StoreError::OperationFailed(format!(
                    "message {} has not been initialized",
                    message.msg_id()
                )));
            }

            let mut row = message.clone();
            if row.exec_state_id().is_empty() {
                let id = self.staged.allocate_id();
                row.mark_persisted(id, self.now);
            } else {
                let id = row.exec_state_id();
                if self.staged.is_retired(&self.guard, id) {
                    tracing::debug!(%id, msg_id = %row.msg_id(), "ignoring update of retired row");
                    continue;
                }
                let created_at = self
                    .staged
                    .live_row(&self.guard, id)
                    .and_then(ExecutionMessage::created_at)
                    .unwrap_or(self.now);
                row.mark_persisted(id, created_at);
                self.staged.next_id = self.staged.next_id.max(id.value() + 1);
            }

            if let Some(assigner) = &self.assigner {
                assigner.assign(&mut row);
            }

            let id = row.exec_state_id();
            let write = if row.status().is_terminal() {
                StagedWrite::Retire(row.status())
            } else {
                StagedWrite::Put(row)
            };
            self.staged.writes.insert(id, write);
        }
        Ok(())
    }

    async fn poll(
        &mut self,
        created_since: DateTime<Utc>,
        worker_id: &WorkerId,
        max_size: usize,
        status: ExecStatus,
    ) -> Result<Vec<ExecutionMessage>, StoreError> {
        let matches = |row: &&ExecutionMessage| {
            row.status() == status
                && row.worker_id() == worker_id
                && row.created_at().is_none_or(|at| at >= created_since)
        };

        // committed rows not shadowed by a staged write, plus staged puts
        let committed = self
            .guard
            .rows
            .iter()
            .filter(|(id, _)| !self.staged.writes.contains_key(*id));
        let staged = self.staged.writes.iter().filter_map(|(id, write)| match write {
            StagedWrite::Put(row) => Some((id, row)),
            StagedWrite::Retire(_) => None,
        });
        let mut rows: Vec<(&ExecStateId, &ExecutionMessage)> =
            committed.chain(staged).filter(|(_, row)| matches(row)).collect();
        rows.sort_by_key(|(id, _)| **id);

        Ok(rows
            .into_iter()
            .take(max_size)
            .map(|(_, row)| row.clone())
            .collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let Self {
            mut guard,
            staged,
            fault,
            ..
        } = *self;
        if fault == Some(InjectedFault::Commit) {
            return Err(StoreError::Conflict("injected commit fault".into()));
        }
        staged.apply(&mut guard);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MessageId, Payload};
    use crate::ports::FixedClock;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn assigned(msg_id: &str, worker: &str) -> ExecutionMessage {
        ExecutionMessage::with_parts(
            ExecStateId::EMPTY,
            WorkerId::new(worker),
            "g",
            MessageId::new(msg_id),
            ExecStatus::Assigned,
            Some(Payload::new(msg_id.as_bytes().to_vec())),
            0,
        )
    }

    async fn insert(store: &InMemoryQueueStore, messages: &[ExecutionMessage]) {
        let mut tx = store.begin().await.unwrap();
        tx.enqueue(messages).await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn enqueue_stamps_id_and_created_at() {
        let clock = Arc::new(FixedClock::new(start()));
        let store = InMemoryQueueStore::new(clock.clone());
        insert(&store, &[assigned("a", "w1"), assigned("b", "w1")]).await;

        let rows = store.snapshot().await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].exec_state_id(), ExecStateId::new(1));
        assert_eq!(rows[1].exec_state_id(), ExecStateId::new(2));
        assert!(rows.iter().all(|r| r.created_at() == Some(start())));
    }

    #[tokio::test]
    async fn update_keeps_original_created_at() {
        let clock = Arc::new(FixedClock::new(start()));
        let store = InMemoryQueueStore::new(clock.clone());
        insert(&store, &[assigned("a", "w1")]).await;

        clock.advance(chrono::Duration::minutes(5));
        let mut row = store.get(ExecStateId::new(1)).await.unwrap();
        row.transition_to(ExecStatus::Sent).unwrap();
        insert(&store, &[row]).await;

        let stored = store.get(ExecStateId::new(1)).await.unwrap();
        assert_eq!(stored.status(), ExecStatus::Sent);
        assert_eq!(stored.created_at(), Some(start()));
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = InMemoryQueueStore::default();
        {
            let mut tx = store.begin().await.unwrap();
            tx.enqueue(&[assigned("a", "w1")]).await.unwrap();
        }
        assert!(store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn enqueue_fault_leaves_store_untouched() {
        let store = InMemoryQueueStore::default();
        store.inject_fault(InjectedFault::EnqueueAfter(1)).await;

        let mut tx = store.begin().await.unwrap();
        let err = tx
            .enqueue(&[assigned("a", "w1"), assigned("b", "w1")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::OperationFailed(_)));
        drop(tx);

        assert!(store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn commit_fault_leaves_store_untouched() {
        let store = InMemoryQueueStore::default();
        store.inject_fault(InjectedFault::Commit).await;

        let mut tx = store.begin().await.unwrap();
        tx.enqueue(&[assigned("a", "w1")]).await.unwrap();
        let err = tx.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn fault_applies_once() {
        let store = InMemoryQueueStore::default();
        store.inject_fault(InjectedFault::Begin).await;
        assert!(store.begin().await.is_err());
        assert!(store.begin().await.is_ok());
    }

    #[tokio::test]
    async fn init_messages_are_rejected() {
        let store = InMemoryQueueStore::default();
        let mut tx = store.begin().await.unwrap();
        let err = tx.enqueue(&[ExecutionMessage::default()]).await.unwrap_err();
        assert!(matches!(err, StoreError::OperationFailed(_)));
    }

    #[tokio::test]
    async fn terminal_rows_are_retired() {
        let store = InMemoryQueueStore::default();
        insert(&store, &[assigned("a", "w1"), assigned("b", "w1")]).await;

        let mut done = store.get(ExecStateId::new(1)).await.unwrap();
        done.set_status(ExecStatus::Terminated);
        let mut failed = store.get(ExecStateId::new(2)).await.unwrap();
        failed.set_status(ExecStatus::Failed);
        insert(&store, &[done.clone(), failed]).await;

        // stale update of a retired row does not bring it back
        done.set_status(ExecStatus::InProgress);
        insert(&store, &[done]).await;

        let counts = store.counts_by_status().await;
        assert_eq!(counts.live(), 0);
        assert_eq!(counts.terminated, 1);
        assert_eq!(counts.failed, 1);
    }

    #[tokio::test]
    async fn retired_rows_leave_nothing_behind() {
        let store = InMemoryQueueStore::default();
        for round in 0..50 {
            insert(&store, &[assigned(&format!("m{round}"), "w1")]).await;
            let mut row = store.snapshot().await.remove(0);
            row.set_status(ExecStatus::Terminated);
            insert(&store, &[row]).await;
        }

        let state = store.state.lock().await;
        assert!(state.rows.is_empty());
        assert_eq!(state.next_id, 51);
        assert_eq!(state.terminated, 50);
        drop(state);

        // a late write for an id below the watermark is still treated as retired
        let mut stale = assigned("m0", "w1");
        stale.mark_persisted(ExecStateId::new(1), start());
        insert(&store, &[stale]).await;
        assert!(store.snapshot().await.is_empty());

        // ids at or above the watermark are new rows
        let mut fresh = assigned("ext", "w1");
        fresh.mark_persisted(ExecStateId::new(80), start());
        insert(&store, &[fresh]).await;
        assert!(store.get(ExecStateId::new(80)).await.is_some());
        assert_eq!(store.state.lock().await.next_id, 81);
    }

    #[tokio::test]
    async fn poll_sees_writes_staged_in_the_same_transaction() {
        let store = InMemoryQueueStore::default();
        insert(&store, &[assigned("a", "w1"), assigned("b", "w1")]).await;

        let mut tx = store.begin().await.unwrap();
        let mut a = store_row(&mut tx, "a").await;
        a.transition_to(ExecStatus::Sent).unwrap();
        tx.enqueue(&[a, assigned("c", "w1")]).await.unwrap();

        let rows = tx
            .poll(DateTime::<Utc>::MIN_UTC, &WorkerId::new("w1"), 10, ExecStatus::Assigned)
            .await
            .unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.msg_id().as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        drop(tx);

        // nothing of the dropped transaction reached the store
        assert_eq!(store.snapshot().await.len(), 2);
        assert_eq!(store.state.lock().await.next_id, 3);
    }

    async fn store_row(tx: &mut Box<dyn QueueTransaction>, msg_id: &str) -> ExecutionMessage {
        tx.poll(DateTime::<Utc>::MIN_UTC, &WorkerId::new("w1"), 10, ExecStatus::Assigned)
            .await
            .unwrap()
            .into_iter()
            .find(|r| r.msg_id().as_str() == msg_id)
            .unwrap()
    }

    #[tokio::test]
    async fn poll_filters_by_worker_status_and_age() {
        let clock = Arc::new(FixedClock::new(start()));
        let store = InMemoryQueueStore::new(clock.clone());
        insert(&store, &[assigned("old", "w1")]).await;
        clock.advance(chrono::Duration::minutes(10));
        insert(&store, &[assigned("new", "w1"), assigned("other", "w2")]).await;

        let mut tx = store.begin().await.unwrap();
        let since = start() + chrono::Duration::minutes(1);
        let rows = tx
            .poll(since, &WorkerId::new("w1"), 10, ExecStatus::Assigned)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].msg_id().as_str(), "new");

        let none = tx
            .poll(since, &WorkerId::new("w1"), 10, ExecStatus::Sent)
            .await
            .unwrap();
        assert!(none.is_empty());

        let capped = tx
            .poll(start(), &WorkerId::new("w1"), 1, ExecStatus::Assigned)
            .await
            .unwrap();
        assert_eq!(capped.len(), 1);
    }

    #[tokio::test]
    async fn assigner_runs_on_enqueue() {
        let mut assigner = WorkerAssigner::new();
        assigner.register("g", WorkerId::new("w1"));
        let store = InMemoryQueueStore::default().with_assigner(Arc::new(assigner));

        let pending = ExecutionMessage::new(MessageId::new("a"), Payload::default()).with_group("g");
        let orphan = ExecutionMessage::new(MessageId::new("b"), Payload::default()).with_group("none");
        insert(&store, &[pending, orphan]).await;

        let counts = store.counts_by_status().await;
        assert_eq!(counts.assigned, 1);
        assert_eq!(counts.pending, 1);
    }

    #[tokio::test]
    async fn transactions_are_serialized() {
        let store = Arc::new(InMemoryQueueStore::default());
        let tx = store.begin().await.unwrap();

        let contender = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.begin().await.map(|_| ()) }
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        tx.commit().await.unwrap();
        contender.await.unwrap().unwrap();
        assert_eq!(store.transactions_started(), 2);
    }
}
