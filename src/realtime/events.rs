// Wire events exchanged with live connections

use crate::cases::types::{CaseNumber, EmployeeId, OrganizationId};
use crate::notify::types::NotificationRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload of a live `notification` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveNotification {
    pub recipient_id: EmployeeId,
    pub case_id: Uuid,
    pub loan_id: CaseNumber,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read_status: bool,
}

/// Server to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "notification")]
    Notification(LiveNotification),
    #[serde(rename = "getAllNotifications")]
    AllNotifications(Vec<NotificationRecord>),
    #[serde(rename = "error")]
    Error { message: String },
}

/// Client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "join", rename_all = "camelCase")]
    Join {
        employee_id: EmployeeId,
        organization_id: OrganizationId,
    },
    #[serde(rename = "markAsRead", rename_all = "camelCase")]
    MarkAsRead { notification_id: Uuid },
}
