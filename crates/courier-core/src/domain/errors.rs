//! Errors - エラー型と分類
//!
//! 各 port は自分のエラー型（`StoreError`, `CodecError`, `CollaboratorError`）を持ち、
//! アプリケーション層では `CourierError` にまとめて `?` で伝播します。

use crate::domain::ids::{ExecutionId, MessageId};
use crate::domain::state::ExecStatus;
use crate::ports::{CodecError, CollaboratorError, StoreError};

/// ErrorKind は実行エラーの運用分類
///
/// - Transient: 一時的なエラー（呼び出し側でリトライ可）
/// - Permanent: 恒久的なエラー（入力を直さない限り失敗する）
/// - Infrastructure: インフラエラー（store や外部サービスの障害）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

#[derive(Debug, thiserror::Error)]
pub enum CourierError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid status transition for message {msg_id}: {from} -> {to}")]
    InvalidTransition {
        msg_id: MessageId,
        from: ExecStatus,
        to: ExecStatus,
    },

    #[error("message {0} carries no payload")]
    MissingPayload(MessageId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    /// Events were published but some execution states could not be deleted.
    #[error("state cleanup failed for {} execution(s): {source}", .pending.len())]
    StateCleanup {
        pending: Vec<ExecutionId>,
        #[source]
        source: CollaboratorError,
    },
}

impl CourierError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CourierError::Validation(_)
            | CourierError::InvalidTransition { .. }
            | CourierError::MissingPayload(_)
            | CourierError::Codec(_) => ErrorKind::Permanent,
            CourierError::Store(StoreError::Conflict(_)) => ErrorKind::Transient,
            CourierError::Store(_)
            | CourierError::Collaborator(_)
            | CourierError::StateCleanup { .. } => ErrorKind::Infrastructure,
        }
    }
}

pub type Result<T> = std::result::Result<T, CourierError>;
