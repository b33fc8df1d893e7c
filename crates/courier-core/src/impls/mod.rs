//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryQueueStore**: トランザクション付きのインメモリ キューストア
//! - **WorkerAssigner**: PENDING メッセージのワーカー割り当て
//! - **InMemoryExecutionStates / InMemoryBranchTracker**: 記録するだけの外部サービス
//! - **TracingEventSink / RecordingEventSink**: イベント配送
//! - **DefaultEventFactory / JsonExecutionCodec**
//!
//! # 本番用実装
//! 本番用の store（RDB の行ロック付き poll など）は別クレートに配置します。

pub mod assigner;
pub mod event_factory;
pub mod event_sink;
pub mod inmem_branch;
pub mod inmem_state;
pub mod inmem_store;
pub mod json_codec;

// 主要な型を再エクスポート
pub use self::assigner::WorkerAssigner;
pub use self::event_factory::DefaultEventFactory;
pub use self::event_sink::{RecordingEventSink, TracingEventSink};
pub use self::inmem_branch::InMemoryBranchTracker;
pub use self::inmem_state::InMemoryExecutionStates;
pub use self::inmem_store::{InMemoryQueueStore, InjectedFault};
pub use self::json_codec::JsonExecutionCodec;
