//! Domain identifiers (strongly-typed IDs).
//!
//! # ID の種類
//! - `ExecutionId` / `BranchId`: ULID ベースの `Id<T>`（Phantom type で型を区別）
//! - `ExecStateId`: キューの行 ID（store が最初の永続化時に採番、未採番は `EMPTY`）
//! - `MessageId`: 実行インスタンスの論理 ID（再配送されても変わらない）
//! - `WorkerId`: 配送先ワーカー（未割り当ては `EMPTY`）

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"exec-", "branch-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// `T` は PhantomData なので実行時のサイズは Ulid と同じです。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// 現在時刻ベースの新しい ID
    pub fn generate() -> Self {
        Self::from_ulid(Ulid::new())
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Exec {}

impl IdMarker for Exec {
    fn prefix() -> &'static str {
        "exec-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Branch {}

impl IdMarker for Branch {
    fn prefix() -> &'static str {
        "branch-"
    }
}

/// Identifier of a workflow execution.
pub type ExecutionId = Id<Exec>;

/// Identifier of a parallel branch inside a split execution.
pub type BranchId = Id<Branch>;

// ========================================
// Queue row / routing identifiers
// ========================================

/// Identifier of a persisted queue row.
///
/// `EMPTY` until the store persists the message for the first time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecStateId(i64);

impl ExecStateId {
    pub const EMPTY: ExecStateId = ExecStateId(-1);

    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(self) -> i64 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self == Self::EMPTY
    }
}

impl Default for ExecStateId {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Display for ExecStateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Logical identity of the execution instance a message belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<ExecutionId> for MessageId {
    fn from(id: ExecutionId) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    /// 未割り当てを表すワーカー ID
    pub const EMPTY_WORKER: &'static str = "EMPTY";

    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn empty() -> Self {
        Self(Self::EMPTY_WORKER.to_string())
    }

    pub fn is_unassigned(&self) -> bool {
        self.0 == Self::EMPTY_WORKER
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let ulid1 = Ulid::new();
        let ulid2 = Ulid::new();

        let exec = ExecutionId::from_ulid(ulid1);
        let branch = BranchId::from_ulid(ulid2);

        assert_eq!(exec.as_ulid(), ulid1);
        assert_eq!(branch.as_ulid(), ulid2);

        assert!(exec.to_string().starts_with("exec-"));
        assert!(branch.to_string().starts_with("branch-"));
        // let _: ExecutionId = branch; // <- does not compile
    }

    #[test]
    fn message_id_is_derived_from_execution_id() {
        let exec = ExecutionId::generate();
        let msg_id = MessageId::from(exec);
        assert_eq!(msg_id.as_str(), exec.to_string());
        assert!(!msg_id.is_empty());
    }

    #[test]
    fn exec_state_id_defaults_to_empty() {
        assert!(ExecStateId::default().is_empty());
        assert_eq!(ExecStateId::EMPTY.value(), -1);
        assert!(!ExecStateId::new(7).is_empty());
    }

    #[test]
    fn worker_id_defaults_to_unassigned() {
        let worker = WorkerId::default();
        assert!(worker.is_unassigned());
        assert_eq!(worker.as_str(), "EMPTY");
        assert!(!WorkerId::new("worker-1").is_unassigned());
    }

    #[test]
    fn ids_serialize_transparently() {
        let state_id = ExecStateId::new(42);
        assert_eq!(serde_json::to_string(&state_id).unwrap(), "42");

        let worker = WorkerId::new("w1");
        assert_eq!(serde_json::to_string(&worker).unwrap(), "\"w1\"");

        let exec = ExecutionId::generate();
        let back: ExecutionId =
            serde_json::from_str(&serde_json::to_string(&exec).unwrap()).unwrap();
        assert_eq!(exec, back);
    }
}
