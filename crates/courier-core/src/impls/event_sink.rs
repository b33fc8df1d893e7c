//! EventSink の実装
//!
//! - TracingEventSink: イベントをログに出すだけ（CLI のデモ用）
//! - RecordingEventSink: バッチごとに記録する（テスト用）

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::DomainEvent;
use crate::ports::{CollaboratorError, EventSink};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, events: Vec<DomainEvent>) -> Result<(), CollaboratorError> {
        for event in &events {
            tracing::info!(event_type = %event.event_type, data = %event.data, "event emitted");
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingEventSink {
    batches: Mutex<Vec<Vec<DomainEvent>>>,
    fail_next: Mutex<bool>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// One entry per `emit` call.
    pub async fn batches(&self) -> Vec<Vec<DomainEvent>> {
        self.batches.lock().await.clone()
    }

    pub async fn events(&self) -> Vec<DomainEvent> {
        self.batches.lock().await.iter().flatten().cloned().collect()
    }

    /// Make the next `emit` fail without recording anything.
    pub async fn fail_next(&self) {
        *self.fail_next.lock().await = true;
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn emit(&self, events: Vec<DomainEvent>) -> Result<(), CollaboratorError> {
        if std::mem::take(&mut *self.fail_next.lock().await) {
            return Err(CollaboratorError::new("event-sink", "event bus unavailable"));
        }
        self.batches.lock().await.push(events);
        Ok(())
    }
}
