//! EventFactory port - 実行参照からライフサイクルイベントを組み立てる
//!
//! 純粋関数として設計（副作用なし）。

use crate::domain::{DomainEvent, Execution};

pub trait EventFactory: Send + Sync {
    fn finished_event(&self, execution: &Execution) -> DomainEvent;

    fn failure_event(&self, execution: &Execution) -> DomainEvent;

    fn failed_branch_event(&self, execution: &Execution) -> DomainEvent;
}
