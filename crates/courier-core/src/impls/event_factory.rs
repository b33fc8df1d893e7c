//! DefaultEventFactory - 実行参照の識別子をイベントの data に載せる

use serde_json::{Map, Value, json};

use crate::domain::{DomainEvent, EventType, Execution};
use crate::ports::EventFactory;

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEventFactory;

impl DefaultEventFactory {
    fn build(event_type: EventType, execution: &Execution) -> DomainEvent {
        let mut data = Map::new();
        data.insert("execution_id".into(), json!(execution.execution_id.to_string()));
        data.insert("running_plan_id".into(), json!(execution.running_plan_id));
        if let Some(position) = execution.position {
            data.insert("position".into(), json!(position));
        }
        if let Some(branch_id) = execution.branch_id {
            data.insert("branch_id".into(), json!(branch_id.to_string()));
        }
        DomainEvent::new(event_type, Value::Object(data))
    }
}

impl EventFactory for DefaultEventFactory {
    fn finished_event(&self, execution: &Execution) -> DomainEvent {
        Self::build(EventType::Finished, execution)
    }

    fn failure_event(&self, execution: &Execution) -> DomainEvent {
        Self::build(EventType::Failure, execution)
    }

    fn failed_branch_event(&self, execution: &Execution) -> DomainEvent {
        Self::build(EventType::FailedBranch, execution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BranchId, ExecutionId};

    #[test]
    fn event_data_carries_identifiers() {
        let execution = Execution::new(ExecutionId::generate(), 7).with_position(3);
        let event = DefaultEventFactory.finished_event(&execution);
        assert_eq!(event.event_type, EventType::Finished);
        assert_eq!(event.data["execution_id"], execution.execution_id.to_string());
        assert_eq!(event.data["running_plan_id"], 7);
        assert_eq!(event.data["position"], 3);
        assert!(event.data.get("branch_id").is_none());
    }

    #[test]
    fn failed_branch_event_names_branch() {
        let branch_id = BranchId::generate();
        let execution = Execution::new(ExecutionId::generate(), 1).with_branch(branch_id);
        let event = DefaultEventFactory.failed_branch_event(&execution);
        assert_eq!(event.event_type, EventType::FailedBranch);
        assert_eq!(event.data["branch_id"], branch_id.to_string());
    }
}
