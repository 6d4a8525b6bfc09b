use crate::cases::types::{CaseKey, CaseStatus};
use crate::store::StoreError;
use thiserror::Error;

/// Errors surfaced to callers of the case lifecycle operations.
///
/// Notification failures never appear here: once a mutation is committed,
/// anything that goes wrong while telling people about it is logged and dropped.
#[derive(Debug, Error)]
pub enum CaseError {
    #[error("Case not found: {key}")]
    NotFound { key: CaseKey },
    #[error("Invalid operation on case {key}: {reason}")]
    InvalidOperation { key: CaseKey, reason: String },
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },
    #[error("Case number {key} already exists")]
    DuplicateCaseNumber { key: CaseKey },
    #[error("Storage error: {source}")]
    Storage {
        #[from]
        source: StoreError,
    },
}

impl CaseError {
    pub fn terminal(key: &CaseKey, status: CaseStatus) -> Self {
        CaseError::InvalidOperation {
            key: key.clone(),
            reason: format!("case is already {status} and accepts no further status changes"),
        }
    }

    pub fn is_invalid_operation(&self) -> bool {
        matches!(self, CaseError::InvalidOperation { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CaseError::NotFound { .. })
    }
}
