//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! queue の中核（dispatcher / terminal router）は以下の trait にだけ依存し、
//! 永続化・イベント配送・実行状態管理の実装を知りません。
//!
//! # 設計原則
//! - QueueStore が配送状態の正本（トランザクション単位で操作）
//! - 実行状態 / branch 完了 / イベント配送は外部サービス
//! - payload の中身は ExecutionCodec だけが解釈する

pub mod branch;
pub mod clock;
pub mod codec;
pub mod event_factory;
pub mod event_sink;
pub mod execution_state;
pub mod queue_store;

pub use self::branch::BranchService;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::codec::{CodecError, ExecutionCodec};
pub use self::event_factory::EventFactory;
pub use self::event_sink::EventSink;
pub use self::execution_state::ExecutionStateService;
pub use self::queue_store::{QueueStore, QueueTransaction, StoreError};

/// 外部サービス（実行状態・branch・event bus）呼び出しの失敗
#[derive(Debug, thiserror::Error)]
#[error("{service} failed: {reason}")]
pub struct CollaboratorError {
    pub service: &'static str,
    pub reason: String,
}

impl CollaboratorError {
    pub fn new(service: &'static str, reason: impl Into<String>) -> Self {
        Self {
            service,
            reason: reason.into(),
        }
    }
}
