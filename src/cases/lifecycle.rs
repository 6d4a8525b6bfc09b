// Case lifecycle service
//
// Every operation loads the case, validates, writes the whole document back,
// and only then queues notification work. Validation errors abort before any
// write; notification problems never surface here.

use crate::cases::errors::CaseError;
use crate::cases::types::{
    Actor, Case, CaseComment, CaseKey, CaseNumber, CaseStatus, DetailSection, NewCase,
    PaymentReceipt,
};
use crate::cases::workflow::{advance, CaseEvent};
use crate::notify::queue::{NotificationJob, NotificationQueue};
use crate::notify::types::NotificationMessage;
use crate::sequence::SequenceGenerator;
use crate::store::{CaseRepository, StoreError};
use crate::telemetry::{create_case_span, generate_correlation_id};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// Things that happen to a case that people may need to hear about
#[derive(Debug, Clone, PartialEq)]
enum CaseActivity {
    Status(CaseStatus),
    TaskCleared,
    DetailsEdited(DetailSection),
    Commented(String),
    PaymentRecorded(i64),
}

impl CaseActivity {
    fn message(&self, number: CaseNumber, actor: &Actor) -> NotificationMessage {
        let who = &actor.display_name;
        match self {
            CaseActivity::Status(CaseStatus::Review) => NotificationMessage::new(
                format!("Case #{number} moved to review"),
                format!("{who} moved case #{number} to review"),
            ),
            CaseActivity::Status(CaseStatus::Approved) => NotificationMessage::new(
                format!("Case #{number} approved"),
                format!("{who} approved case #{number}"),
            ),
            CaseActivity::Status(CaseStatus::Rejected) => NotificationMessage::new(
                format!("Case #{number} rejected"),
                format!("{who} rejected case #{number}"),
            ),
            CaseActivity::Status(status) => NotificationMessage::new(
                format!("Case #{number} is now {status}"),
                format!("{who} set case #{number} to {status}"),
            ),
            CaseActivity::TaskCleared => NotificationMessage::new(
                format!("Task cleared on case #{number}"),
                format!("{who} cleared the pending task on case #{number}"),
            ),
            CaseActivity::DetailsEdited(section) => NotificationMessage::new(
                format!("Case #{number} updated"),
                format!("{who} updated the {} details of case #{number}", section_name(*section)),
            ),
            CaseActivity::Commented(text) => NotificationMessage::new(
                format!("New comment on case #{number}"),
                format!("{who} commented on case #{number}: {}", preview(text)),
            ),
            CaseActivity::PaymentRecorded(amount_minor) => NotificationMessage::new(
                format!("Payment received on case #{number}"),
                format!(
                    "{who} recorded a payment of {}.{:02} on case #{number}",
                    amount_minor / 100,
                    amount_minor % 100
                ),
            ),
        }
    }
}

fn section_name(section: DetailSection) -> &'static str {
    match section {
        DetailSection::Applicant => "applicant",
        DetailSection::Bank => "bank",
        DetailSection::Liability => "liability",
        DetailSection::Income => "income",
        DetailSection::Collateral => "collateral",
    }
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 80;
    if text.chars().count() <= LIMIT {
        text.to_string()
    } else {
        let cut: String = text.chars().take(LIMIT).collect();
        format!("{cut}...")
    }
}

fn require_non_empty(value: &str, field: &str) -> Result<(), CaseError> {
    if value.trim().is_empty() {
        return Err(CaseError::InvalidInput {
            reason: format!("{field} must not be empty"),
        });
    }
    Ok(())
}

pub struct CaseLifecycle {
    cases: Arc<dyn CaseRepository>,
    sequence: Arc<SequenceGenerator>,
    notifications: NotificationQueue,
}

impl CaseLifecycle {
    pub fn new(
        cases: Arc<dyn CaseRepository>,
        sequence: Arc<SequenceGenerator>,
        notifications: NotificationQueue,
    ) -> Self {
        Self {
            cases,
            sequence,
            notifications,
        }
    }

    /// Issues the next case number for the organization.
    pub async fn create_case_number(&self, organization_id: &str) -> Result<CaseNumber, CaseError> {
        require_non_empty(organization_id, "organization id")?;
        Ok(self.sequence.next_case_number(organization_id).await?)
    }

    /// Opens a new case in `Pending`, consulting the sequence generator once.
    pub async fn open_case(&self, new_case: NewCase) -> Result<Case, CaseError> {
        require_non_empty(&new_case.creator_id, "creator id")?;
        let number = self.create_case_number(&new_case.organization_id).await?;
        let case = Case::new(
            new_case.organization_id,
            number,
            new_case.creator_id,
            new_case.branch,
        );

        match self.cases.insert_case(&case).await {
            Ok(()) => {}
            Err(StoreError::DuplicateKey { .. }) => {
                return Err(CaseError::DuplicateCaseNumber { key: case.key() })
            }
            Err(e) => return Err(e.into()),
        }
        info!(
            organization_id = %case.organization_id,
            case_number = case.case_number,
            "Case opened"
        );
        Ok(case)
    }

    pub async fn find_case(&self, key: &CaseKey) -> Result<Case, CaseError> {
        self.cases
            .find_case(key)
            .await?
            .ok_or_else(|| CaseError::NotFound { key: key.clone() })
    }

    /// Moves the case to `target`, storing `payload` as the matching report.
    pub async fn change_status(
        &self,
        key: &CaseKey,
        target: CaseStatus,
        actor: &Actor,
        payload: Option<serde_json::Value>,
    ) -> Result<Case, CaseError> {
        let span = create_case_span(
            "change_status",
            &key.organization_id,
            key.case_number,
            &generate_correlation_id(),
        );
        async {
            let mut case = self.find_case(key).await?;
            let read_status = case.status;
            if read_status.is_terminal() {
                return Err(CaseError::terminal(key, read_status));
            }

            let event = match target {
                CaseStatus::Review => CaseEvent::SubmitForReview,
                CaseStatus::Approved => CaseEvent::Approve,
                CaseStatus::Rejected => CaseEvent::Reject,
                CaseStatus::TaskPending => CaseEvent::RaiseTask,
                CaseStatus::Pending => {
                    return Err(CaseError::InvalidInput {
                        reason: format!("{target} is not a valid target status"),
                    })
                }
            };
            let step = advance(case.status, case.resume_status, &event).map_err(|reason| {
                CaseError::InvalidOperation {
                    key: key.clone(),
                    reason,
                }
            })?;

            case.status = step.to;
            case.resume_status = step.resume_status;
            match target {
                CaseStatus::Review => case.review_report = payload,
                CaseStatus::Approved | CaseStatus::Rejected => {
                    case.final_report = payload;
                    case.decided_by = Some(actor.employee_id.clone());
                }
                CaseStatus::TaskPending => case.pending_task = payload,
                CaseStatus::Pending => {}
            }
            case.touch();
            self.save(&case, read_status).await?;

            info!(
                from = %step.from,
                to = %step.to,
                actor_id = %actor.employee_id,
                "Case status changed"
            );
            self.notify(&case, actor, CaseActivity::Status(step.to)).await;
            Ok(case)
        }
        .instrument(span)
        .await
    }

    /// Leaves `TaskPending` for the status held before the task was raised.
    pub async fn clear_task(&self, key: &CaseKey, actor: &Actor) -> Result<Case, CaseError> {
        let mut case = self.find_case(key).await?;
        let read_status = case.status;
        if read_status.is_terminal() {
            return Err(CaseError::terminal(key, read_status));
        }
        let step = advance(read_status, case.resume_status, &CaseEvent::ClearTask).map_err(
            |reason| CaseError::InvalidOperation {
                key: key.clone(),
                reason,
            },
        )?;

        case.status = step.to;
        case.resume_status = step.resume_status;
        case.pending_task = None;
        case.touch();
        self.save(&case, read_status).await?;

        info!(case = %key, to = %step.to, "Case task cleared");
        self.notify(&case, actor, CaseActivity::TaskCleared).await;
        Ok(case)
    }

    /// Records a step verification. Never changes status and never notifies.
    pub async fn set_step_verified(
        &self,
        key: &CaseKey,
        step: &str,
        verified: bool,
        actor: &Actor,
    ) -> Result<Case, CaseError> {
        require_non_empty(step, "step name")?;
        let mut case = self.find_case(key).await?;
        case.upsert_verified_step(step, verified, &actor.employee_id);
        case.touch();
        self.save(&case, case.status).await?;
        debug!(case = %key, step, verified, "Step verification recorded");
        Ok(case)
    }

    /// Adds `step` to the completed steps if it is not there yet.
    pub async fn complete_step(&self, key: &CaseKey, step: &str) -> Result<Case, CaseError> {
        require_non_empty(step, "step name")?;
        let mut case = self.find_case(key).await?;
        if case.mark_step_completed(step) {
            case.touch();
            self.save(&case, case.status).await?;
            debug!(case = %key, step, "Step completed");
        }
        Ok(case)
    }

    /// Replaces one detail section. Notifies only once the case has left `Pending`.
    pub async fn edit_details(
        &self,
        key: &CaseKey,
        section: DetailSection,
        value: serde_json::Value,
        actor: &Actor,
    ) -> Result<Case, CaseError> {
        let mut case = self.find_case(key).await?;
        if case.status.is_terminal() {
            return Err(CaseError::InvalidOperation {
                key: key.clone(),
                reason: format!("details of a {} case are frozen", case.status),
            });
        }
        // Read before the mutation.
        let read_status = case.status;
        let should_notify = read_status != CaseStatus::default();

        case.details.insert(section, value);
        case.touch();
        self.save(&case, read_status).await?;

        if should_notify {
            self.notify(&case, actor, CaseActivity::DetailsEdited(section)).await;
        } else {
            debug!(case = %key, "Case still pending, detail edit not announced");
        }
        Ok(case)
    }

    pub async fn add_comment(
        &self,
        key: &CaseKey,
        actor: &Actor,
        text: &str,
    ) -> Result<Case, CaseError> {
        require_non_empty(text, "comment")?;
        let mut case = self.find_case(key).await?;
        case.comments.push(CaseComment {
            author_id: actor.employee_id.clone(),
            text: text.to_string(),
            created_at: Utc::now(),
        });
        case.touch();
        self.save(&case, case.status).await?;

        self.notify(&case, actor, CaseActivity::Commented(text.to_string())).await;
        Ok(case)
    }

    pub async fn record_payment(
        &self,
        key: &CaseKey,
        actor: &Actor,
        amount_minor: i64,
        reference: &str,
    ) -> Result<Case, CaseError> {
        if amount_minor <= 0 {
            return Err(CaseError::InvalidInput {
                reason: format!("payment amount must be positive, got {amount_minor}"),
            });
        }
        require_non_empty(reference, "payment reference")?;

        let mut case = self.find_case(key).await?;
        case.payments.push(PaymentReceipt {
            recorded_by: actor.employee_id.clone(),
            amount_minor,
            reference: reference.to_string(),
            received_at: Utc::now(),
        });
        case.touch();
        self.save(&case, case.status).await?;

        self.notify(&case, actor, CaseActivity::PaymentRecorded(amount_minor)).await;
        Ok(case)
    }

    /// Writes the case back unless another writer changed its status since `read_status`.
    async fn save(&self, case: &Case, read_status: CaseStatus) -> Result<(), CaseError> {
        match self.cases.save_case(case, read_status).await {
            Ok(()) => Ok(()),
            Err(StoreError::Conflict { what }) => {
                warn!(case = %case.key(), %what, "Lost a concurrent case update");
                Err(CaseError::InvalidOperation {
                    key: case.key(),
                    reason: format!("case changed while the update was in flight ({what})"),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn notify(&self, case: &Case, actor: &Actor, activity: CaseActivity) {
        let message = activity.message(case.case_number, actor);
        self.notifications
            .enqueue(NotificationJob::new(
                case.clone(),
                actor.employee_id.clone(),
                message,
            ))
            .await;
    }
}
