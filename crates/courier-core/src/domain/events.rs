//! Events - ドメインイベント
//!
//! terminal router が event sink にまとめて publish するライフサイクルイベント。

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// A non-branch execution finished.
    Finished,
    /// A non-branch execution failed.
    Failure,
    /// An execution inside a split branch failed.
    FailedBranch,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventType::Finished => "FINISHED",
            EventType::Failure => "FAILURE",
            EventType::FailedBranch => "FAILED_BRANCH",
        };
        f.write_str(s)
    }
}

/// DomainEvent はドメインで発生したイベント（type + JSON data）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub event_type: EventType,
    pub data: serde_json::Value,
}

impl DomainEvent {
    pub fn new(event_type: EventType, data: serde_json::Value) -> Self {
        Self { event_type, data }
    }
}
