// Notification fan-out across push, live socket and durable inbox
//
// Each recipient is handled independently. Push and live delivery are best
// effort; the inbox record is written for every recipient regardless of how
// the other two channels fare, and the push timeout runs alongside the
// record write rather than ahead of it.

use crate::notify::presence::PresenceRegistry;
use crate::notify::push::{PushError, PushMessage, PushSender};
use crate::notify::types::{CaseRef, NewNotification, NotificationMessage, Recipient};
use crate::observability::dispatch_metrics;
use crate::realtime::events::{LiveNotification, ServerEvent};
use crate::store::InboxRepository;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// What happened for a single recipient. `None` means the channel was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliveryOutcome {
    pub push: Option<bool>,
    pub live: Option<bool>,
    pub recorded: bool,
}

/// Aggregate of one dispatch call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchReport {
    pub recipients: usize,
    pub push_attempts: usize,
    pub push_failures: usize,
    pub live_emissions: usize,
    pub live_failures: usize,
    pub records_created: usize,
}

impl DispatchReport {
    fn absorb(&mut self, outcome: DeliveryOutcome) {
        self.recipients += 1;
        if let Some(ok) = outcome.push {
            self.push_attempts += 1;
            if !ok {
                self.push_failures += 1;
            }
        }
        match outcome.live {
            Some(true) => self.live_emissions += 1,
            Some(false) => self.live_failures += 1,
            None => {}
        }
        if outcome.recorded {
            self.records_created += 1;
        }
    }
}

pub struct NotificationDispatcher {
    inbox: Arc<dyn InboxRepository>,
    presence: Arc<dyn PresenceRegistry>,
    push: Option<Arc<dyn PushSender>>,
    push_timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(inbox: Arc<dyn InboxRepository>, presence: Arc<dyn PresenceRegistry>) -> Self {
        Self {
            inbox,
            presence,
            push: None,
            push_timeout: DEFAULT_PUSH_TIMEOUT,
        }
    }

    pub fn with_push(mut self, sender: Arc<dyn PushSender>, timeout: Duration) -> Self {
        self.push = Some(sender);
        self.push_timeout = timeout;
        self
    }

    /// Delivers `message` to every recipient. Never fails; problems are logged.
    pub async fn dispatch(
        &self,
        recipients: &[Recipient],
        message: &NotificationMessage,
        case_ref: &CaseRef,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        if recipients.is_empty() {
            debug!(case_number = case_ref.case_number, "No recipients to notify");
            return report;
        }

        let created_at = Utc::now();
        let outcomes = join_all(
            recipients
                .iter()
                .map(|recipient| self.deliver(recipient, message, case_ref, created_at)),
        )
        .await;

        for outcome in outcomes {
            report.absorb(outcome);
        }
        debug!(
            case_number = case_ref.case_number,
            recipients = report.recipients,
            push_attempts = report.push_attempts,
            live_emissions = report.live_emissions,
            records_created = report.records_created,
            "Notification dispatch finished"
        );
        report
    }

    async fn deliver(
        &self,
        recipient: &Recipient,
        message: &NotificationMessage,
        case_ref: &CaseRef,
        created_at: DateTime<Utc>,
    ) -> DeliveryOutcome {
        let (push, live, recorded) = tokio::join!(
            self.send_push(recipient, message),
            self.emit_live(recipient, message, case_ref, created_at),
            self.record(recipient, message, case_ref),
        );
        DeliveryOutcome {
            push,
            live,
            recorded,
        }
    }

    async fn send_push(&self, recipient: &Recipient, message: &NotificationMessage) -> Option<bool> {
        let token = recipient.push_token.as_ref()?;
        let Some(sender) = &self.push else {
            debug!(
                employee_id = %recipient.employee_id,
                "Push token registered but no push sender configured"
            );
            return None;
        };

        let metrics = dispatch_metrics();
        metrics.record_push_attempt();
        let push = PushMessage::new(token.clone(), message.title.clone(), message.body.clone());
        let result = match tokio::time::timeout(self.push_timeout, sender.send(push)).await {
            Ok(result) => result,
            Err(_) => Err(PushError::Timeout {
                timeout_ms: self.push_timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(()) => Some(true),
            Err(e) => {
                metrics.record_push_failure();
                warn!(employee_id = %recipient.employee_id, "Push delivery failed: {}", e);
                Some(false)
            }
        }
    }

    async fn emit_live(
        &self,
        recipient: &Recipient,
        message: &NotificationMessage,
        case_ref: &CaseRef,
        created_at: DateTime<Utc>,
    ) -> Option<bool> {
        if !recipient.present {
            return None;
        }
        let handle = self.presence.is_present(&recipient.employee_id).await?;

        let metrics = dispatch_metrics();
        let event = ServerEvent::Notification(LiveNotification {
            recipient_id: recipient.employee_id.clone(),
            case_id: case_ref.case_id,
            loan_id: case_ref.case_number,
            title: message.title.clone(),
            message: message.body.clone(),
            created_at,
            read_status: false,
        });
        match handle.emit(event) {
            Ok(()) => {
                metrics.record_live_emission();
                Some(true)
            }
            Err(e) => {
                metrics.record_live_failure();
                warn!(employee_id = %recipient.employee_id, "Live delivery failed: {}", e);
                Some(false)
            }
        }
    }

    async fn record(
        &self,
        recipient: &Recipient,
        message: &NotificationMessage,
        case_ref: &CaseRef,
    ) -> bool {
        let metrics = dispatch_metrics();
        let notification = NewNotification {
            recipient_id: recipient.employee_id.clone(),
            organization_id: case_ref.organization_id.clone(),
            case_ref: case_ref.clone(),
            title: message.title.clone(),
            body: message.body.clone(),
        };
        match self.inbox.create_notification(notification).await {
            Ok(_) => {
                metrics.record_inbox_record();
                true
            }
            Err(e) => {
                metrics.record_inbox_failure();
                error!(
                    employee_id = %recipient.employee_id,
                    case_number = case_ref.case_number,
                    "Failed to write inbox record: {}",
                    e
                );
                false
            }
        }
    }
}
