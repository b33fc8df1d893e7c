//! WorkerAssigner - PENDING メッセージにワーカーを割り当てる
//!
//! group ごとに登録されたワーカーからランダムに 1 つ選びます。
//! group にワーカーがいない場合は PENDING のまま残します。

use std::collections::HashMap;

use rand::seq::SliceRandom;

use crate::config::WorkerConfig;
use crate::domain::{ExecStatus, ExecutionMessage, WorkerId};

#[derive(Debug, Default)]
pub struct WorkerAssigner {
    groups: HashMap<String, Vec<WorkerId>>,
}

impl WorkerAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `worker_id` as serving `group`. Duplicate registrations are ignored.
    pub fn register(&mut self, group: impl Into<String>, worker_id: WorkerId) {
        let workers = self.groups.entry(group.into()).or_default();
        if !workers.contains(&worker_id) {
            workers.push(worker_id);
        }
    }

    pub fn from_config(workers: &[WorkerConfig]) -> Self {
        let mut assigner = Self::new();
        for worker in workers {
            for group in &worker.groups {
                assigner.register(group.clone(), WorkerId::new(worker.id.clone()));
            }
        }
        assigner
    }

    pub fn workers_for(&self, group: &str) -> &[WorkerId] {
        self.groups.get(group).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_group(&self, group: &str) -> bool {
        !self.workers_for(group).is_empty()
    }

    /// Assign a PENDING message to a random worker of its group.
    ///
    /// Returns `true` when the message moved to ASSIGNED. Messages in any other
    /// status are left untouched.
    pub fn assign(&self, message: &mut ExecutionMessage) -> bool {
        if message.status() != ExecStatus::Pending {
            return false;
        }

        let Some(worker_id) = self
            .workers_for(message.worker_group())
            .choose(&mut rand::thread_rng())
            .cloned()
        else {
            tracing::warn!(
                msg_id = %message.msg_id(),
                group = message.worker_group(),
                "no worker registered for group, message stays pending"
            );
            return false;
        };

        match message.assign_to(worker_id) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(msg_id = %message.msg_id(), error = %e, "assignment rejected");
                false
            }
        }
    }
}
