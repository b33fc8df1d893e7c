//! Execution message: the unit of work in transit to or about a worker.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::envelope::Envelope;
use super::errors::CourierError;
use super::execution::Execution;
use super::ids::{ExecStateId, MessageId, WorkerId};
use super::payload::Payload;
use super::state::ExecStatus;

/// Group used when a producer does not name one.
pub const DEFAULT_WORKER_GROUP: &str = "default";

/// One delivery record of an execution.
///
/// Design:
/// - `msg_id` is fixed at construction; there is no setter.
/// - `msg_seq_id` only moves through `increment_sequence`, which is atomic so
///   a message shared between threads during a poll cannot lose an increment.
/// - `exec_state_id` and `created_at` are stamped once by the store.
/// - `worker_key` and `execution` are process-local and never persisted.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExecutionMessage {
    exec_state_id: ExecStateId,
    worker_id: WorkerId,
    worker_group: String,
    status: ExecStatus,
    payload: Option<Payload>,
    msg_seq_id: AtomicU32,
    msg_id: MessageId,
    created_at: Option<DateTime<Utc>>,

    #[serde(skip)]
    worker_key: Option<String>,

    #[serde(skip)]
    execution: Option<Execution>,
}

impl ExecutionMessage {
    /// New message queued for assignment in the default group.
    pub fn new(msg_id: MessageId, payload: Payload) -> Self {
        Self::with_parts(
            ExecStateId::EMPTY,
            WorkerId::empty(),
            DEFAULT_WORKER_GROUP,
            msg_id,
            ExecStatus::Pending,
            Some(payload),
            0,
        )
    }

    pub fn with_parts(
        exec_state_id: ExecStateId,
        worker_id: WorkerId,
        worker_group: impl Into<String>,
        msg_id: MessageId,
        status: ExecStatus,
        payload: Option<Payload>,
        msg_seq_id: u32,
    ) -> Self {
        Self {
            exec_state_id,
            worker_id,
            worker_group: worker_group.into(),
            status,
            payload,
            msg_seq_id: AtomicU32::new(msg_seq_id),
            msg_id,
            created_at: None,
            worker_key: None,
            execution: None,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.worker_group = group.into();
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn with_worker_key(mut self, worker_key: impl Into<String>) -> Self {
        self.worker_key = Some(worker_key.into());
        self
    }

    /// Attach the already-decoded execution so consumers can skip decoding.
    pub fn with_execution(mut self, execution: Execution) -> Self {
        self.execution = Some(execution);
        self
    }

    pub fn exec_state_id(&self) -> ExecStateId {
        self.exec_state_id
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    pub fn worker_group(&self) -> &str {
        &self.worker_group
    }

    pub fn status(&self) -> ExecStatus {
        self.status
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn msg_id(&self) -> &MessageId {
        &self.msg_id
    }

    pub fn msg_seq_id(&self) -> u32 {
        self.msg_seq_id.load(Ordering::Acquire)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn worker_key(&self) -> Option<&str> {
        self.worker_key.as_deref()
    }

    pub fn execution(&self) -> Option<&Execution> {
        self.execution.as_ref()
    }

    /// Idempotency key of this delivery attempt: `msg_id:msg_seq_id`.
    pub fn unique_id(&self) -> String {
        format!("{}:{}", self.msg_id, self.msg_seq_id())
    }

    /// Bump the redelivery counter. Returns the new value.
    pub fn increment_sequence(&self) -> u32 {
        self.msg_seq_id.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Move to `next`, rejecting steps the state machine does not allow.
    pub fn transition_to(&mut self, next: ExecStatus) -> Result<(), CourierError> {
        if !self.status.can_transition_to(next) {
            return Err(CourierError::InvalidTransition {
                msg_id: self.msg_id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Unchecked status write for fixtures that need a row in a given state.
    #[cfg(test)]
    pub(crate) fn set_status(&mut self, status: ExecStatus) {
        self.status = status;
    }

    /// Claim for `worker_id` (Pending -> Assigned).
    pub fn assign_to(&mut self, worker_id: WorkerId) -> Result<(), CourierError> {
        self.transition_to(ExecStatus::Assigned)?;
        self.worker_key = Some(format!("{}:{}", self.worker_group, worker_id));
        self.worker_id = worker_id;
        Ok(())
    }

    /// Stamp the row id and creation time on first persistence.
    ///
    /// Both values are write-once: an already persisted message keeps them.
    pub fn mark_persisted(&mut self, exec_state_id: ExecStateId, now: DateTime<Utc>) {
        if self.exec_state_id.is_empty() {
            self.exec_state_id = exec_state_id;
        }
        if self.created_at.is_none() {
            self.created_at = Some(now);
        }
    }
}

impl Default for ExecutionMessage {
    fn default() -> Self {
        Self::with_parts(
            ExecStateId::EMPTY,
            WorkerId::empty(),
            "",
            MessageId::default(),
            ExecStatus::Init,
            None,
            0,
        )
    }
}

impl Clone for ExecutionMessage {
    fn clone(&self) -> Self {
        Self {
            exec_state_id: self.exec_state_id,
            worker_id: self.worker_id.clone(),
            worker_group: self.worker_group.clone(),
            status: self.status,
            payload: self.payload.clone(),
            msg_seq_id: AtomicU32::new(self.msg_seq_id()),
            msg_id: self.msg_id.clone(),
            created_at: self.created_at,
            worker_key: self.worker_key.clone(),
            execution: self.execution.clone(),
        }
    }
}

// Process-local fields (worker_key, execution) do not take part in equality.
impl PartialEq for ExecutionMessage {
    fn eq(&self, other: &Self) -> bool {
        self.exec_state_id == other.exec_state_id
            && self.msg_seq_id() == other.msg_seq_id()
            && self.msg_id == other.msg_id
            && self.payload == other.payload
            && self.status == other.status
            && self.worker_group == other.worker_group
            && self.worker_id == other.worker_id
            && self.created_at == other.created_at
    }
}

impl Eq for ExecutionMessage {}

impl fmt::Display for ExecutionMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "msg_id={} exec_state_id={} status={} seq={} worker={}",
            self.msg_id,
            self.exec_state_id,
            self.status,
            self.msg_seq_id(),
            self.worker_id,
        )
    }
}

impl Envelope for ExecutionMessage {
    fn id(&self) -> &str {
        self.msg_id.as_str()
    }

    fn weight(&self) -> u32 {
        1
    }

    /// Keeps two entries out of three or more.
    ///
    /// - first entry `IN_PROGRESS`: its start report is superseded by the
    ///   second entry, so keep the second and the last.
    /// - otherwise: keep the original dispatch record and the last.
    fn shrink(entries: &[Self]) -> Vec<Self> {
        match entries {
            [first, second, .., last] => {
                let kept = if first.status == ExecStatus::InProgress {
                    second
                } else {
                    first
                };
                vec![kept.clone(), last.clone()]
            }
            _ => entries.to_vec(),
        }
    }
}
