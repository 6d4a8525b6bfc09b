// In-process store backed by tokio locks

use super::{
    case_label, CaseRepository, EmployeeDirectory, InboxRepository, SequenceStore, StoreError,
};
use crate::cases::types::{Case, CaseKey, CaseNumber, CaseStatus, Employee};
use crate::notify::types::{NewNotification, NotificationRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct MemoryStore {
    cases: RwLock<HashMap<CaseKey, Case>>,
    counters: Mutex<HashMap<(String, String), i64>>,
    employees: RwLock<HashMap<String, Employee>>,
    notifications: RwLock<Vec<NotificationRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_employee(&self, employee: Employee) {
        self.employees
            .write()
            .await
            .insert(employee.id.clone(), employee);
    }

    pub async fn counter_value(&self, organization_id: &str, name: &str) -> Option<i64> {
        self.counters
            .lock()
            .await
            .get(&(organization_id.to_string(), name.to_string()))
            .copied()
    }

    /// Every inbox record, in creation order.
    pub async fn all_notifications(&self) -> Vec<NotificationRecord> {
        self.notifications.read().await.clone()
    }
}

#[async_trait]
impl CaseRepository for MemoryStore {
    async fn insert_case(&self, case: &Case) -> Result<(), StoreError> {
        let mut cases = self.cases.write().await;
        let key = case.key();
        if cases.contains_key(&key) {
            return Err(StoreError::DuplicateKey {
                what: case_label(&case.organization_id, case.case_number),
            });
        }
        cases.insert(key, case.clone());
        Ok(())
    }

    async fn find_case(&self, key: &CaseKey) -> Result<Option<Case>, StoreError> {
        Ok(self.cases.read().await.get(key).cloned())
    }

    async fn save_case(&self, case: &Case, expected: CaseStatus) -> Result<(), StoreError> {
        let mut cases = self.cases.write().await;
        let label = || case_label(&case.organization_id, case.case_number);
        match cases.get_mut(&case.key()) {
            Some(existing) if existing.status != expected => Err(StoreError::Conflict {
                what: format!("{} is {}, expected {}", label(), existing.status, expected),
            }),
            Some(existing) => {
                *existing = case.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound { what: label() }),
        }
    }

    async fn max_case_number(
        &self,
        organization_id: &str,
    ) -> Result<Option<CaseNumber>, StoreError> {
        Ok(self
            .cases
            .read()
            .await
            .keys()
            .filter(|key| key.organization_id == organization_id)
            .map(|key| key.case_number)
            .max())
    }
}

#[async_trait]
impl SequenceStore for MemoryStore {
    async fn increment(&self, organization_id: &str, name: &str) -> Result<i64, StoreError> {
        let mut counters = self.counters.lock().await;
        let value = counters
            .entry((organization_id.to_string(), name.to_string()))
            .or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn advance_to(
        &self,
        organization_id: &str,
        name: &str,
        value: i64,
    ) -> Result<(), StoreError> {
        let mut counters = self.counters.lock().await;
        let current = counters
            .entry((organization_id.to_string(), name.to_string()))
            .or_insert(0);
        *current = (*current).max(value);
        Ok(())
    }
}

#[async_trait]
impl EmployeeDirectory for MemoryStore {
    async fn find_employee(&self, employee_id: &str) -> Result<Option<Employee>, StoreError> {
        Ok(self.employees.read().await.get(employee_id).cloned())
    }

    async fn branch_managers(
        &self,
        organization_id: &str,
        branch: &str,
    ) -> Result<Vec<Employee>, StoreError> {
        let mut managers: Vec<Employee> = self
            .employees
            .read()
            .await
            .values()
            .filter(|e| e.organization_id == organization_id && e.manages_branch(branch))
            .cloned()
            .collect();
        managers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(managers)
    }

    async fn super_admin(&self, organization_id: &str) -> Result<Option<Employee>, StoreError> {
        Ok(self
            .employees
            .read()
            .await
            .values()
            .find(|e| e.organization_id == organization_id && e.is_super_admin)
            .cloned())
    }
}

#[async_trait]
impl InboxRepository for MemoryStore {
    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<NotificationRecord, StoreError> {
        let record = NotificationRecord::from_new(notification);
        self.notifications.write().await.push(record.clone());
        Ok(record)
    }

    async fn notifications_for(
        &self,
        organization_id: &str,
        recipient_id: &str,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        let mut records: Vec<NotificationRecord> = self
            .notifications
            .read()
            .await
            .iter()
            .filter(|n| n.organization_id == organization_id && n.recipient_id == recipient_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps; reverse for newest first.
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        records.reverse();
        Ok(records)
    }

    async fn mark_read(
        &self,
        notification_id: Uuid,
        recipient_id: &str,
    ) -> Result<NotificationRecord, StoreError> {
        let mut notifications = self.notifications.write().await;
        let record = notifications
            .iter_mut()
            .find(|n| n.id == notification_id && n.recipient_id == recipient_id)
            .ok_or_else(|| StoreError::NotFound {
                what: format!("notification {notification_id}"),
            })?;
        record.read = true;
        Ok(record.clone())
    }
}
