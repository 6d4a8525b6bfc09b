//! Persistence seams
//!
//! The lifecycle, sequence and notification services only talk to storage
//! through these traits, so they can run against the SQLite store in
//! production and the in-memory store in tests.

pub mod memory;
#[cfg(feature = "database")]
pub mod sqlite;

use crate::cases::types::{Case, CaseKey, CaseNumber, CaseStatus, Employee};
use crate::notify::types::{NewNotification, NotificationRecord};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

pub use memory::MemoryStore;
#[cfg(feature = "database")]
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {what}")]
    NotFound { what: String },
    /// A uniqueness constraint rejected the write
    #[error("Duplicate key: {what}")]
    DuplicateKey { what: String },
    /// The stored record changed since it was read
    #[error("Concurrent update: {what}")]
    Conflict { what: String },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Storage backend error: {message}")]
    Backend { message: String },
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        StoreError::Backend {
            message: message.into(),
        }
    }
}

/// Case documents. A case is always written back as a whole.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait CaseRepository: Send + Sync {
    /// Fails with `DuplicateKey` if the organization already has this case number.
    async fn insert_case(&self, case: &Case) -> Result<(), StoreError>;

    async fn find_case(&self, key: &CaseKey) -> Result<Option<Case>, StoreError>;

    /// Replaces the stored document if its status is still `expected`.
    ///
    /// Fails with `NotFound` if it was never inserted and with `Conflict` if
    /// another writer moved the status first.
    async fn save_case(&self, case: &Case, expected: CaseStatus) -> Result<(), StoreError>;

    /// Largest case number issued in the organization, if any.
    async fn max_case_number(&self, organization_id: &str)
        -> Result<Option<CaseNumber>, StoreError>;
}

/// Per-organization named counters.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait SequenceStore: Send + Sync {
    /// Atomically increments and returns the counter, creating it at 1 if absent.
    ///
    /// Returns `DuplicateKey` when a concurrent creation of the same row won the race.
    async fn increment(&self, organization_id: &str, name: &str) -> Result<i64, StoreError>;

    /// Raises the counter to `value` unless it is already at or above it.
    async fn advance_to(&self, organization_id: &str, name: &str, value: i64)
        -> Result<(), StoreError>;
}

/// Organization staff lookups used for audience resolution.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    async fn find_employee(&self, employee_id: &str) -> Result<Option<Employee>, StoreError>;

    /// Employees of the organization holding a role and a membership in `branch`.
    async fn branch_managers(
        &self,
        organization_id: &str,
        branch: &str,
    ) -> Result<Vec<Employee>, StoreError>;

    async fn super_admin(&self, organization_id: &str) -> Result<Option<Employee>, StoreError>;
}

/// Durable notification inbox.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait InboxRepository: Send + Sync {
    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<NotificationRecord, StoreError>;

    /// Newest first.
    async fn notifications_for(
        &self,
        organization_id: &str,
        recipient_id: &str,
    ) -> Result<Vec<NotificationRecord>, StoreError>;

    /// Flips the read flag; only the recipient may mark their own record.
    async fn mark_read(
        &self,
        notification_id: Uuid,
        recipient_id: &str,
    ) -> Result<NotificationRecord, StoreError>;
}

/// Convenience bundle of every store the services need.
pub trait Storage: CaseRepository + SequenceStore + EmployeeDirectory + InboxRepository {}

impl<T> Storage for T where T: CaseRepository + SequenceStore + EmployeeDirectory + InboxRepository {}

pub(crate) fn case_label(organization_id: &str, number: CaseNumber) -> String {
    CaseKey::new(organization_id, number).to_string()
}
