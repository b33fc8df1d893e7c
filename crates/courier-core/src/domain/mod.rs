//! Domain model (IDs, message, status, execution reference, events, errors).
//!
//! - ids: 型付き ID（ExecutionId, BranchId, ExecStateId, MessageId, WorkerId）
//! - state: ExecStatus 状態機械
//! - message: ExecutionMessage（シーケンス番号・deep clone・shrink）
//! - envelope: Envelope trait（id / weight / shrink）
//! - execution: payload に載る実行参照（branch 判定）
//! - payload: 不透明なバイト列
//! - events: DomainEvent
//! - errors: CourierError, ErrorKind

pub mod envelope;
pub mod errors;
pub mod events;
pub mod execution;
pub mod ids;
pub mod message;
pub mod payload;
pub mod state;

pub use self::envelope::Envelope;
pub use self::errors::{CourierError, ErrorKind, Result};
pub use self::events::{DomainEvent, EventType};
pub use self::execution::{BranchMarker, Execution};
pub use self::ids::{BranchId, ExecStateId, ExecutionId, MessageId, WorkerId};
pub use self::message::{DEFAULT_WORKER_GROUP, ExecutionMessage};
pub use self::payload::Payload;
pub use self::state::ExecStatus;
