// Per-organization case number issuance
//
// The atomic increment in the store is the only path that is safe across
// processes. The max-scan fallback exists for the double duplicate-key race on
// counter creation and can hand out a number another process also computed;
// the case repository's uniqueness constraint turns that into a loud insert
// failure instead of a silent duplicate.

use crate::observability::dispatch_metrics;
use crate::store::{CaseRepository, SequenceStore, StoreError};
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_SEQUENCE_NAME: &str = "caseId";

pub struct SequenceGenerator {
    counters: Arc<dyn SequenceStore>,
    cases: Arc<dyn CaseRepository>,
    sequence_name: String,
}

impl SequenceGenerator {
    pub fn new(counters: Arc<dyn SequenceStore>, cases: Arc<dyn CaseRepository>) -> Self {
        Self::with_name(counters, cases, DEFAULT_SEQUENCE_NAME)
    }

    pub fn with_name(
        counters: Arc<dyn SequenceStore>,
        cases: Arc<dyn CaseRepository>,
        sequence_name: impl Into<String>,
    ) -> Self {
        Self {
            counters,
            cases,
            sequence_name: sequence_name.into(),
        }
    }

    pub fn sequence_name(&self) -> &str {
        &self.sequence_name
    }

    /// Issues the next case number for `organization_id`.
    pub async fn next_case_number(&self, organization_id: &str) -> Result<i64, StoreError> {
        match self.counters.increment(organization_id, &self.sequence_name).await {
            Ok(value) => return Ok(value),
            Err(StoreError::DuplicateKey { what }) => {
                debug!(
                    organization_id,
                    conflict = %what,
                    "Counter creation raced, retrying increment"
                );
            }
            Err(other) => return Err(other),
        }

        match self.counters.increment(organization_id, &self.sequence_name).await {
            Ok(value) => Ok(value),
            Err(StoreError::DuplicateKey { what }) => {
                warn!(
                    organization_id,
                    conflict = %what,
                    "Counter increment failed twice, falling back to case scan"
                );
                self.fallback_from_scan(organization_id).await
            }
            Err(other) => Err(other),
        }
    }

    async fn fallback_from_scan(&self, organization_id: &str) -> Result<i64, StoreError> {
        dispatch_metrics().record_counter_fallback();
        let next = self
            .cases
            .max_case_number(organization_id)
            .await?
            .unwrap_or(0)
            + 1;

        // Best effort: the number is already decided, a failed write-back only
        // means the next caller may take the fallback path again.
        let counters = Arc::clone(&self.counters);
        let organization = organization_id.to_string();
        let name = self.sequence_name.clone();
        tokio::spawn(async move {
            if let Err(e) = counters.advance_to(&organization, &name, next).await {
                warn!(
                    organization_id = %organization,
                    value = next,
                    "Failed to write fallback case number back to counter: {}",
                    e
                );
            }
        });

        Ok(next)
    }
}
