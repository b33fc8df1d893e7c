//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 外部サービスは差し替え可能、未指定ならインメモリ実装
//!
//! # Fail-fast 設計
//! - expect_groups() で「ワーカーがいなければならない group」を宣言
//! - build() 時に各 group に設定上のワーカーがいるかをチェック
//! - 不足があれば BuildError を返す（PENDING のまま滞留するのを起動時に防ぐ）

use std::sync::Arc;

use super::dispatcher::QueueDispatcher;
use super::terminal_router::TerminalRouter;
use super::worker_loop::{ExecutionHandler, WorkerGroup, WorkerLoop};
use crate::config::CourierConfig;
use crate::domain::WorkerId;
use crate::impls::{
    DefaultEventFactory, InMemoryBranchTracker, InMemoryExecutionStates, InMemoryQueueStore,
    JsonExecutionCodec, TracingEventSink, WorkerAssigner,
};
use crate::ports::{
    BranchService, Clock, EventFactory, EventSink, ExecutionCodec, ExecutionStateService,
    SystemClock,
};

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing worker groups: {0:?}. These groups were expected but no worker serves them.")]
    MissingWorkerGroups(Vec<String>),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new(config)
///     .with_event_sink(Arc::new(MyEventBus::connect()?))
///     .expect_groups(&["default"])
///     .build()?;
/// let workers = app.spawn_workers(Arc::new(MyHandler));
/// ```
pub struct AppBuilder {
    config: CourierConfig,
    expected_groups: Option<Vec<String>>,
    clock: Arc<dyn Clock>,
    codec: Arc<dyn ExecutionCodec>,
    states: Arc<dyn ExecutionStateService>,
    branches: Arc<dyn BranchService>,
    events: Arc<dyn EventSink>,
    factory: Arc<dyn EventFactory>,
}

impl AppBuilder {
    pub fn new(config: CourierConfig) -> Self {
        Self {
            config,
            expected_groups: None,
            clock: Arc::new(SystemClock),
            codec: Arc::new(JsonExecutionCodec),
            states: Arc::new(InMemoryExecutionStates::new()),
            branches: Arc::new(InMemoryBranchTracker::new()),
            events: Arc::new(TracingEventSink),
            factory: Arc::new(DefaultEventFactory),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn ExecutionCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_execution_states(mut self, states: Arc<dyn ExecutionStateService>) -> Self {
        self.states = states;
        self
    }

    pub fn with_branch_service(mut self, branches: Arc<dyn BranchService>) -> Self {
        self.branches = branches;
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_event_factory(mut self, factory: Arc<dyn EventFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// ワーカーが必ずいるべき group のリストを設定
    pub fn expect_groups(mut self, groups: &[&str]) -> Self {
        self.expected_groups = Some(groups.iter().map(|g| g.to_string()).collect());
        self
    }

    /// AppBuilder を構築して App を生成
    ///
    /// # 検証
    /// - poll / buffer の設定値が 0 でないこと
    /// - expect_groups() で設定された group に全てワーカーがいること
    pub fn build(self) -> Result<App, BuildError> {
        if self.config.dispatcher.default_group.is_empty() {
            return Err(BuildError::InvalidConfig("dispatcher.default_group is empty".into()));
        }
        if self.config.poll.max_batch_size == 0 {
            return Err(BuildError::InvalidConfig("poll.max_batch_size must be positive".into()));
        }
        if self.config.buffer.max_weight == 0 {
            return Err(BuildError::InvalidConfig("buffer.max_weight must be positive".into()));
        }

        let assigner = WorkerAssigner::from_config(&self.config.workers);
        if let Some(expected_groups) = &self.expected_groups {
            let missing_groups: Vec<String> = expected_groups
                .iter()
                .filter(|g| !assigner.has_group(g))
                .cloned()
                .collect();
            if !missing_groups.is_empty() {
                return Err(BuildError::MissingWorkerGroups(missing_groups));
            }
        }

        let store = Arc::new(
            InMemoryQueueStore::new(Arc::clone(&self.clock)).with_assigner(Arc::new(assigner)),
        );
        let router = Arc::new(TerminalRouter::new(
            Arc::clone(&self.codec),
            self.states,
            self.branches,
            self.events,
            self.factory,
        ));
        let dispatcher = Arc::new(
            QueueDispatcher::new(store.clone(), self.config.dispatcher.default_group.clone())
                .with_router(Arc::clone(&router)),
        );

        tracing::info!(
            workers = self.config.workers.len(),
            default_group = %self.config.dispatcher.default_group,
            "app built"
        );
        Ok(App {
            config: self.config,
            clock: self.clock,
            codec: self.codec,
            store,
            router,
            dispatcher,
        })
    }
}

/// App は組み立て済みのキュー一式
pub struct App {
    pub config: CourierConfig,
    pub clock: Arc<dyn Clock>,
    pub codec: Arc<dyn ExecutionCodec>,
    pub store: Arc<InMemoryQueueStore>,
    pub router: Arc<TerminalRouter>,
    pub dispatcher: Arc<QueueDispatcher>,
}

impl App {
    pub fn worker_loop(&self, worker_id: WorkerId, handler: Arc<dyn ExecutionHandler>) -> WorkerLoop {
        WorkerLoop::new(
            worker_id,
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.codec),
            handler,
            Arc::clone(&self.clock),
            self.config.poll.clone(),
            self.config.buffer.max_weight,
        )
    }

    /// 設定された全ワーカーを同じ handler で起動
    pub fn spawn_workers(&self, handler: Arc<dyn ExecutionHandler>) -> WorkerGroup {
        let loops = self
            .config
            .workers
            .iter()
            .map(|w| Arc::new(self.worker_loop(WorkerId::new(w.id.clone()), Arc::clone(&handler))))
            .collect();
        WorkerGroup::spawn(loops)
    }
}
