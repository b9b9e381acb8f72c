use super::event::WorkflowStatus;
use crate::error::{SddError, SddResult};

/// Validates a workflow status transition.
pub fn validate_transition(from: WorkflowStatus, to: WorkflowStatus) -> SddResult<()> {
    if allowed(from, to) {
        Ok(())
    } else {
        Err(SddError::InvalidState(format!(
            "workflow run cannot move from {from:?} to {to:?}"
        )))
    }
}

pub fn allowed_transitions(from: WorkflowStatus) -> Vec<WorkflowStatus> {
    use WorkflowStatus::*;
    match from {
        Idle => vec![Running],
        Running => vec![Completed, Failed, Canceled],
        Failed => vec![Running],
        Canceled => vec![Running],
        Completed => vec![],
    }
}

fn allowed(from: WorkflowStatus, to: WorkflowStatus) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_status() -> impl Strategy<Value = WorkflowStatus> {
        prop_oneof![
            Just(WorkflowStatus::Idle),
            Just(WorkflowStatus::Running),
            Just(WorkflowStatus::Completed),
            Just(WorkflowStatus::Failed),
            Just(WorkflowStatus::Canceled),
        ]
    }

    #[test]
    fn completed_is_final() {
        assert!(allowed_transitions(WorkflowStatus::Completed).is_empty());
        assert!(validate_transition(WorkflowStatus::Completed, WorkflowStatus::Running).is_err());
    }

    #[test]
    fn retry_reenters_running() {
        assert!(validate_transition(WorkflowStatus::Failed, WorkflowStatus::Running).is_ok());
        assert!(validate_transition(WorkflowStatus::Canceled, WorkflowStatus::Running).is_ok());
    }

    proptest! {
        #[test]
        fn terminal_states_are_only_reached_from_running(from in any_status(), to in any_status()) {
            if to.is_terminal() && validate_transition(from, to).is_ok() {
                prop_assert_eq!(from, WorkflowStatus::Running);
            }
        }
    }
}
