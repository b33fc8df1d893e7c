//! Execution-message status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of an execution message.
///
/// State transitions:
/// - Init -> Pending -> Assigned -> Sent -> InProgress -> Terminated | Failed
/// - Init -> Assigned (single-message dispatch to a known group)
/// - Sent | InProgress -> Assigned (re-assignment by recovery, outside the dispatcher)
///
/// `Terminated` and `Failed` are absorbing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecStatus {
    /// Constructed but never persisted.
    #[default]
    Init,

    /// Queued, waiting for a worker to be assigned.
    Pending,

    /// Claimed for a specific worker; eligible for poll.
    Assigned,

    /// Delivered to a worker by a poll call.
    Sent,

    /// Worker acknowledged the start of execution.
    InProgress,

    /// Finished successfully.
    Terminated,

    /// Finished with a failure.
    Failed,
}

impl ExecStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecStatus::Terminated | ExecStatus::Failed)
    }

    /// Only assigned messages are handed out by poll.
    pub fn is_pollable(self) -> bool {
        matches!(self, ExecStatus::Assigned)
    }

    pub fn can_transition_to(self, next: ExecStatus) -> bool {
        use ExecStatus::*;
        matches!(
            (self, next),
            (Init, Pending | Assigned)
                | (Pending, Assigned)
                | (Assigned, Sent)
                | (Sent, InProgress | Assigned)
                | (InProgress, Terminated | Failed | Assigned)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecStatus::Init => "INIT",
            ExecStatus::Pending => "PENDING",
            ExecStatus::Assigned => "ASSIGNED",
            ExecStatus::Sent => "SENT",
            ExecStatus::InProgress => "IN_PROGRESS",
            ExecStatus::Terminated => "TERMINATED",
            ExecStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
