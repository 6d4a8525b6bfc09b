use crate::cases::types::{CaseNumber, EmployeeId, OrganizationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies the case a notification is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseRef {
    pub case_id: Uuid,
    pub organization_id: OrganizationId,
    pub case_number: CaseNumber,
}

/// Human-readable title and body describing who did what
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub title: String,
    pub body: String,
}

impl NotificationMessage {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

/// A computed notification target. Produced by the resolver, consumed by the dispatcher,
/// never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub employee_id: EmployeeId,
    pub present: bool,
    pub push_token: Option<String>,
}

impl Recipient {
    pub fn has_push_token(&self) -> bool {
        self.push_token.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub recipient_id: EmployeeId,
    pub organization_id: OrganizationId,
    pub case_ref: CaseRef,
    pub title: String,
    pub body: String,
}

/// Durable inbox entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: Uuid,
    pub recipient_id: EmployeeId,
    pub organization_id: OrganizationId,
    pub case_ref: CaseRef,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl NotificationRecord {
    pub fn from_new(notification: NewNotification) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient_id: notification.recipient_id,
            organization_id: notification.organization_id,
            case_ref: notification.case_ref,
            title: notification.title,
            body: notification.body,
            created_at: Utc::now(),
            read: false,
        }
    }
}
