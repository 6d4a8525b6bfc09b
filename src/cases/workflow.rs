// Case status graph
//
// Pending -> Review -> {Approved, Rejected}, with TaskPending reachable from
// any non-terminal status. Terminal statuses reject every event.

use crate::cases::types::CaseStatus;
use statig::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseEvent {
    /// Loads a persisted status into a fresh machine
    Restore {
        status: CaseStatus,
        resume_status: Option<CaseStatus>,
    },
    SubmitForReview,
    Approve,
    Reject,
    RaiseTask,
    ClearTask,
}

/// Result of feeding one event through the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowStep {
    pub from: CaseStatus,
    pub to: CaseStatus,
    pub resume_status: Option<CaseStatus>,
}

#[derive(Debug, Default)]
pub struct CaseWorkflow {
    status: CaseStatus,
    resume_status: Option<CaseStatus>,
    rejection: Option<String>,
}

impl CaseWorkflow {
    fn move_to(&mut self, status: CaseStatus) {
        tracing::debug!(from = %self.status, to = %status, "Case status transition");
        self.status = status;
    }

    fn refuse(&mut self, reason: impl Into<String>) {
        self.rejection = Some(reason.into());
    }

    pub fn status(&self) -> CaseStatus {
        self.status
    }
}

#[state_machine(initial = "State::unloaded()")]
impl CaseWorkflow {
    #[state]
    fn unloaded(&mut self, event: &CaseEvent) -> Outcome<State> {
        match event {
            CaseEvent::Restore {
                status,
                resume_status,
            } => {
                self.status = *status;
                self.resume_status = *resume_status;
                match status {
                    CaseStatus::Pending => Transition(State::pending()),
                    CaseStatus::Review => Transition(State::review()),
                    CaseStatus::TaskPending => Transition(State::task_pending()),
                    CaseStatus::Approved => Transition(State::approved()),
                    CaseStatus::Rejected => Transition(State::rejected()),
                }
            }
            _ => {
                self.refuse("workflow has no status loaded");
                Handled
            }
        }
    }

    /// Shared handling for every non-terminal status.
    #[superstate]
    fn active(&mut self, event: &CaseEvent) -> Outcome<State> {
        match event {
            CaseEvent::SubmitForReview => {
                self.resume_status = None;
                self.move_to(CaseStatus::Review);
                Transition(State::review())
            }
            CaseEvent::Approve => {
                self.resume_status = None;
                self.move_to(CaseStatus::Approved);
                Transition(State::approved())
            }
            CaseEvent::Reject => {
                self.resume_status = None;
                self.move_to(CaseStatus::Rejected);
                Transition(State::rejected())
            }
            CaseEvent::ClearTask => {
                self.refuse("no task is pending on this case");
                Handled
            }
            CaseEvent::RaiseTask | CaseEvent::Restore { .. } => {
                self.refuse("status is already loaded");
                Handled
            }
        }
    }

    #[state(superstate = "active")]
    fn pending(&mut self, event: &CaseEvent) -> Outcome<State> {
        match event {
            CaseEvent::RaiseTask => {
                self.resume_status = Some(CaseStatus::Pending);
                self.move_to(CaseStatus::TaskPending);
                Transition(State::task_pending())
            }
            _ => Super,
        }
    }

    #[state(superstate = "active")]
    fn review(&mut self, event: &CaseEvent) -> Outcome<State> {
        match event {
            CaseEvent::RaiseTask => {
                self.resume_status = Some(CaseStatus::Review);
                self.move_to(CaseStatus::TaskPending);
                Transition(State::task_pending())
            }
            _ => Super,
        }
    }

    #[state(superstate = "active")]
    fn task_pending(&mut self, event: &CaseEvent) -> Outcome<State> {
        match event {
            // Raising another task keeps the original resume point.
            CaseEvent::RaiseTask => Handled,
            CaseEvent::ClearTask => match self.resume_status.take() {
                Some(CaseStatus::Review) => {
                    self.move_to(CaseStatus::Review);
                    Transition(State::review())
                }
                _ => {
                    self.move_to(CaseStatus::Pending);
                    Transition(State::pending())
                }
            },
            _ => Super,
        }
    }

    #[state]
    fn approved(&mut self) -> Outcome<State> {
        self.refuse("case is already approved and accepts no further status changes");
        Handled
    }

    #[state]
    fn rejected(&mut self) -> Outcome<State> {
        self.refuse("case is already rejected and accepts no further status changes");
        Handled
    }
}

/// Runs `event` against a case currently in `status`.
///
/// Returns the refusal reason when the graph does not allow the event.
pub fn advance(
    status: CaseStatus,
    resume_status: Option<CaseStatus>,
    event: &CaseEvent,
) -> Result<WorkflowStep, String> {
    let mut machine = CaseWorkflow::default().state_machine();
    machine.handle(&CaseEvent::Restore {
        status,
        resume_status,
    });
    machine.handle(event);

    let workflow = machine.inner();
    if let Some(reason) = &workflow.rejection {
        return Err(reason.clone());
    }
    Ok(WorkflowStep {
        from: status,
        to: workflow.status,
        resume_status: workflow.resume_status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_then_approve() {
        let step = advance(CaseStatus::Pending, None, &CaseEvent::SubmitForReview).unwrap();
        assert_eq!(step.to, CaseStatus::Review);

        let step = advance(step.to, step.resume_status, &CaseEvent::Approve).unwrap();
        assert_eq!(step.from, CaseStatus::Review);
        assert_eq!(step.to, CaseStatus::Approved);
    }

    #[test]
    fn test_pending_can_be_decided_directly() {
        let step = advance(CaseStatus::Pending, None, &CaseEvent::Approve).unwrap();
        assert_eq!(step.to, CaseStatus::Approved);
        let step = advance(CaseStatus::Pending, None, &CaseEvent::Reject).unwrap();
        assert_eq!(step.to, CaseStatus::Rejected);
    }

    #[test]
    fn test_terminal_statuses_refuse_everything() {
        for terminal in [CaseStatus::Approved, CaseStatus::Rejected] {
            for event in [
                CaseEvent::SubmitForReview,
                CaseEvent::Approve,
                CaseEvent::Reject,
                CaseEvent::RaiseTask,
                CaseEvent::ClearTask,
            ] {
                assert!(
                    advance(terminal, None, &event).is_err(),
                    "{terminal} accepted {event:?}"
                );
            }
        }
    }

    #[test]
    fn test_task_side_branch_returns_to_previous_status() {
        let raised = advance(CaseStatus::Review, None, &CaseEvent::RaiseTask).unwrap();
        assert_eq!(raised.to, CaseStatus::TaskPending);
        assert_eq!(raised.resume_status, Some(CaseStatus::Review));

        let again = advance(raised.to, raised.resume_status, &CaseEvent::RaiseTask).unwrap();
        assert_eq!(again.resume_status, Some(CaseStatus::Review));

        let cleared = advance(again.to, again.resume_status, &CaseEvent::ClearTask).unwrap();
        assert_eq!(cleared.to, CaseStatus::Review);
        assert_eq!(cleared.resume_status, None);

        let from_pending = advance(CaseStatus::Pending, None, &CaseEvent::RaiseTask).unwrap();
        let cleared = advance(
            from_pending.to,
            from_pending.resume_status,
            &CaseEvent::ClearTask,
        )
        .unwrap();
        assert_eq!(cleared.to, CaseStatus::Pending);
    }

    #[test]
    fn test_task_pending_can_be_decided() {
        let step = advance(
            CaseStatus::TaskPending,
            Some(CaseStatus::Pending),
            &CaseEvent::Reject,
        )
        .unwrap();
        assert_eq!(step.to, CaseStatus::Rejected);
        assert_eq!(step.resume_status, None);
    }

    #[test]
    fn test_clear_without_task_is_refused() {
        assert!(advance(CaseStatus::Review, None, &CaseEvent::ClearTask).is_err());
    }
}
