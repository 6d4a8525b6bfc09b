// Audience resolution for case events
//
// creator + role-holding members of the case's branch + organization
// super-admin, deduplicated by employee id, minus the actor.

use crate::cases::types::{Case, Employee};
use crate::notify::presence::PresenceRegistry;
use crate::notify::types::Recipient;
use crate::store::EmployeeDirectory;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct RecipientResolver {
    directory: Arc<dyn EmployeeDirectory>,
    presence: Arc<dyn PresenceRegistry>,
}

impl RecipientResolver {
    pub fn new(directory: Arc<dyn EmployeeDirectory>, presence: Arc<dyn PresenceRegistry>) -> Self {
        Self {
            directory,
            presence,
        }
    }

    /// Lookup failures drop the affected rule and never fail the caller.
    pub async fn resolve_audience(&self, case: &Case, actor_id: &str) -> Vec<Recipient> {
        let mut candidates: Vec<Employee> = Vec::new();

        match self.directory.find_employee(&case.creator_id).await {
            Ok(Some(creator)) => candidates.push(creator),
            Ok(None) => debug!(
                creator_id = %case.creator_id,
                case_number = case.case_number,
                "Case creator not found, skipping"
            ),
            Err(e) => warn!(
                creator_id = %case.creator_id,
                "Failed to look up case creator: {}",
                e
            ),
        }

        match self
            .directory
            .branch_managers(&case.organization_id, &case.branch)
            .await
        {
            Ok(managers) => candidates.extend(managers),
            Err(e) => warn!(
                organization_id = %case.organization_id,
                branch = %case.branch,
                "Failed to look up branch managers: {}",
                e
            ),
        }

        match self.directory.super_admin(&case.organization_id).await {
            Ok(Some(admin)) => candidates.push(admin),
            Ok(None) => {}
            Err(e) => warn!(
                organization_id = %case.organization_id,
                "Failed to look up super admin: {}",
                e
            ),
        }

        let mut seen = HashSet::new();
        let mut recipients = Vec::new();
        for employee in candidates {
            if employee.id == actor_id || !seen.insert(employee.id.clone()) {
                continue;
            }
            let present = self.presence.is_present(&employee.id).await.is_some();
            recipients.push(Recipient {
                employee_id: employee.id,
                present,
                push_token: employee.push_token,
            });
        }

        debug!(
            case_number = case.case_number,
            audience = recipients.len(),
            "Resolved notification audience"
        );
        recipients
    }
}
