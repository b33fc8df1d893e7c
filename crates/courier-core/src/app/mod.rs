//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **QueueDispatcher**: メッセージの投入（dispatch）と claim（poll）
//! - **TerminalRouter**: 終端メッセージの後始末（状態削除・イベント・branch 完了）
//! - **OutboundBuffer**: ワーカー側の報告バッファ（shrink で圧縮）
//! - **WorkerLoop / WorkerGroup**: poll→handle→report の実行ループ
//! - **AppBuilder**: アプリケーションの構築とワイヤリング

pub mod builder;
pub mod dispatcher;
pub mod outbound_buffer;
pub mod terminal_router;
pub mod worker_loop;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::dispatcher::QueueDispatcher;
pub use self::outbound_buffer::OutboundBuffer;
pub use self::terminal_router::{BranchPartition, TerminalRouter, partition_by_branch};
pub use self::worker_loop::{ExecutionHandler, WorkerGroup, WorkerLoop};
