use super::{
    case_label, CaseRepository, EmployeeDirectory, InboxRepository, SequenceStore, StoreError,
};
use crate::cases::types::{Case, CaseKey, CaseNumber, CaseStatus, Employee};
use crate::notify::types::{CaseRef, NewNotification, NotificationRecord};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound {
                what: "row".to_string(),
            },
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateKey {
                what: db.message().to_string(),
            },
            other => StoreError::backend(other.to_string()),
        }
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StoreError::backend(format!("invalid timestamp '{raw}': {e}")))
}

fn parse_uuid(raw: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|e| StoreError::backend(format!("invalid uuid '{raw}': {e}")))
}

/// SQLite-backed store for cases, counters, employees and the inbox
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect, creating the database file if needed and optionally migrating.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        auto_migrate: bool,
    ) -> Result<Self, StoreError> {
        let in_memory = database_url.contains(":memory:");
        if !in_memory && !sqlx::Sqlite::database_exists(database_url).await? {
            info!("Creating database at {}", database_url);
            sqlx::Sqlite::create_database(database_url).await?;
        }

        // Every in-memory connection is its own database, so pin the pool to one.
        let max_connections = if in_memory { 1 } else { max_connections };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        let store = Self { pool };
        if auto_migrate {
            store.migrate().await?;
        }
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::backend(e.to_string()))?;
        info!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace a directory entry
    pub async fn upsert_employee(&self, employee: &Employee) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO employees
                (id, organization_id, name, branches, role, is_super_admin, push_token)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&employee.id)
        .bind(&employee.organization_id)
        .bind(&employee.name)
        .bind(serde_json::to_string(&employee.branches)?)
        .bind(&employee.role)
        .bind(employee.is_super_admin)
        .bind(&employee.push_token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn shutdown(&self) {
        info!("Shutting down database connections...");
        self.pool.close().await;
        info!("Database connections closed");
    }

    fn employee_from_row(row: &SqliteRow) -> Result<Employee, StoreError> {
        let branches: String = row.try_get("branches")?;
        Ok(Employee {
            id: row.try_get("id")?,
            organization_id: row.try_get("organization_id")?,
            name: row.try_get("name")?,
            branches: serde_json::from_str(&branches)?,
            role: row.try_get("role")?,
            is_super_admin: row.try_get("is_super_admin")?,
            push_token: row.try_get("push_token")?,
        })
    }

    fn notification_from_row(row: &SqliteRow) -> Result<NotificationRecord, StoreError> {
        let id: String = row.try_get("id")?;
        let case_id: String = row.try_get("case_id")?;
        let created_at: String = row.try_get("created_at")?;
        let organization_id: String = row.try_get("organization_id")?;
        Ok(NotificationRecord {
            id: parse_uuid(&id)?,
            recipient_id: row.try_get("recipient_id")?,
            case_ref: CaseRef {
                case_id: parse_uuid(&case_id)?,
                organization_id: organization_id.clone(),
                case_number: row.try_get("case_number")?,
            },
            organization_id,
            title: row.try_get("title")?,
            body: row.try_get("body")?,
            created_at: parse_timestamp(&created_at)?,
            read: row.try_get("read")?,
        })
    }
}

#[async_trait]
impl CaseRepository for SqliteStore {
    async fn insert_case(&self, case: &Case) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO cases (id, organization_id, case_number, status, document, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(case.id.to_string())
        .bind(&case.organization_id)
        .bind(case.case_number)
        .bind(case.status.as_str())
        .bind(serde_json::to_string(case)?)
        .bind(timestamp(&case.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| match StoreError::from(e) {
            StoreError::DuplicateKey { .. } => StoreError::DuplicateKey {
                what: case_label(&case.organization_id, case.case_number),
            },
            other => other,
        })?;
        Ok(())
    }

    async fn find_case(&self, key: &CaseKey) -> Result<Option<Case>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT document FROM cases
            WHERE organization_id = ?1 AND case_number = ?2
            "#,
        )
        .bind(&key.organization_id)
        .bind(key.case_number)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let document: String = row.try_get("document")?;
                Ok(Some(serde_json::from_str(&document)?))
            }
            None => Ok(None),
        }
    }

    async fn save_case(&self, case: &Case, expected: CaseStatus) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE cases SET status = ?3, document = ?4, updated_at = ?5
            WHERE organization_id = ?1 AND case_number = ?2 AND status = ?6
            "#,
        )
        .bind(&case.organization_id)
        .bind(case.case_number)
        .bind(case.status.as_str())
        .bind(serde_json::to_string(case)?)
        .bind(timestamp(&case.updated_at))
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }
        let label = case_label(&case.organization_id, case.case_number);
        match self.find_case(&case.key()).await? {
            Some(current) => Err(StoreError::Conflict {
                what: format!("{label} is {}, expected {expected}", current.status),
            }),
            None => Err(StoreError::NotFound { what: label }),
        }
    }

    async fn max_case_number(
        &self,
        organization_id: &str,
    ) -> Result<Option<CaseNumber>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT MAX(case_number) AS max_number FROM cases WHERE organization_id = ?1
            "#,
        )
        .bind(organization_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("max_number")?)
    }
}

#[async_trait]
impl SequenceStore for SqliteStore {
    async fn increment(&self, organization_id: &str, name: &str) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO sequence_counters (organization_id, name, value)
            VALUES (?1, ?2, 1)
            ON CONFLICT (organization_id, name) DO UPDATE SET value = value + 1
            RETURNING value
            "#,
        )
        .bind(organization_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("value")?)
    }

    async fn advance_to(
        &self,
        organization_id: &str,
        name: &str,
        value: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sequence_counters (organization_id, name, value)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (organization_id, name) DO UPDATE SET value = MAX(value, excluded.value)
            "#,
        )
        .bind(organization_id)
        .bind(name)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl EmployeeDirectory for SqliteStore {
    async fn find_employee(&self, employee_id: &str) -> Result<Option<Employee>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, organization_id, name, branches, role, is_super_admin, push_token
            FROM employees WHERE id = ?1
            "#,
        )
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::employee_from_row).transpose()
    }

    async fn branch_managers(
        &self,
        organization_id: &str,
        branch: &str,
    ) -> Result<Vec<Employee>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, organization_id, name, branches, role, is_super_admin, push_token
            FROM employees
            WHERE organization_id = ?1
              AND role IS NOT NULL
              AND EXISTS (SELECT 1 FROM json_each(employees.branches) WHERE json_each.value = ?2)
            ORDER BY id ASC
            "#,
        )
        .bind(organization_id)
        .bind(branch)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::employee_from_row).collect()
    }

    async fn super_admin(&self, organization_id: &str) -> Result<Option<Employee>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, organization_id, name, branches, role, is_super_admin, push_token
            FROM employees
            WHERE organization_id = ?1 AND is_super_admin = 1
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::employee_from_row).transpose()
    }
}

#[async_trait]
impl InboxRepository for SqliteStore {
    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<NotificationRecord, StoreError> {
        let record = NotificationRecord::from_new(notification);
        sqlx::query(
            r#"
            INSERT INTO notifications
                (id, recipient_id, organization_id, case_id, case_number, title, body, created_at, read)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.recipient_id)
        .bind(&record.organization_id)
        .bind(record.case_ref.case_id.to_string())
        .bind(record.case_ref.case_number)
        .bind(&record.title)
        .bind(&record.body)
        .bind(timestamp(&record.created_at))
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    async fn notifications_for(
        &self,
        organization_id: &str,
        recipient_id: &str,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, recipient_id, organization_id, case_id, case_number, title, body, created_at, read
            FROM notifications
            WHERE organization_id = ?1 AND recipient_id = ?2
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(organization_id)
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::notification_from_row).collect()
    }

    async fn mark_read(
        &self,
        notification_id: Uuid,
        recipient_id: &str,
    ) -> Result<NotificationRecord, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE notifications SET read = 1
            WHERE id = ?1 AND recipient_id = ?2
            RETURNING id, recipient_id, organization_id, case_id, case_number, title, body, created_at, read
            "#,
        )
        .bind(notification_id.to_string())
        .bind(recipient_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::notification_from_row(&row),
            None => Err(StoreError::NotFound {
                what: format!("notification {notification_id}"),
            }),
        }
    }
}
