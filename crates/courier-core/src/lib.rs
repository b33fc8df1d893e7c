//! courier-core
//!
//! Core building blocks for the Courier execution-message queue.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, message, envelope, execution, payload, events, errors）
//! - **ports**: 抽象化レイヤー（QueueStore, ExecutionStateService, BranchService, EventSink, など）
//! - **app**: アプリケーションロジック（dispatcher, terminal_router, outbound_buffer, worker_loop, builder）
//! - **impls**: 実装（InMemoryQueueStore, WorkerAssigner など開発用）
//! - **config**: TOML 設定
//! - **observability**: キュー統計と tracing の初期化

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
