//! EventSink port - イベントの一括 publish
//!
//! 1 回の `emit` が event bus への 1 回の dispatch に対応します。
//! 呼び出し側は空のバッチで `emit` しません。

use async_trait::async_trait;

use super::CollaboratorError;
use crate::domain::DomainEvent;

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, events: Vec<DomainEvent>) -> Result<(), CollaboratorError>;
}
