//! Execution reference carried inside a message payload.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::{BranchId, ExecutionId};

/// The unit of workflow state a message reports progress for.
///
/// Only the fields the queue needs for routing are modelled here; the engine
/// keeps the rest in `context`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    pub execution_id: ExecutionId,
    pub running_plan_id: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,

    /// Set when the execution runs inside a split (fork-join) branch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<BranchId>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, String>,
}

impl Execution {
    pub fn new(execution_id: ExecutionId, running_plan_id: i64) -> Self {
        Self {
            execution_id,
            running_plan_id,
            position: None,
            branch_id: None,
            context: HashMap::new(),
        }
    }

    pub fn with_branch(mut self, branch_id: BranchId) -> Self {
        self.branch_id = Some(branch_id);
        self
    }

    pub fn with_position(mut self, position: i64) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn is_branch(&self) -> bool {
        self.branch_id.is_some()
    }
}

/// Which slot of an execution's persisted state is addressed.
///
/// The queue only ever touches the main slot; per-branch slots are owned by
/// the branch service and merged when the branch ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchMarker {
    /// The execution's main (non-branch) state.
    Empty,
}

impl fmt::Display for BranchMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchMarker::Empty => f.write_str("EMPTY_BRANCH"),
        }
    }
}
