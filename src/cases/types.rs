// Core types for case files and the people who act on them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

pub type OrganizationId = String;
pub type EmployeeId = String;
pub type CaseNumber = i64;

/// Addresses one case inside one organization
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaseKey {
    pub organization_id: OrganizationId,
    pub case_number: CaseNumber,
}

impl CaseKey {
    pub fn new(organization_id: impl Into<OrganizationId>, case_number: CaseNumber) -> Self {
        Self {
            organization_id: organization_id.into(),
            case_number,
        }
    }
}

impl fmt::Display for CaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.organization_id, self.case_number)
    }
}

/// Case status. `Pending` is the initial default; `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    #[default]
    Pending,
    Review,
    TaskPending,
    Approved,
    Rejected,
}

impl CaseStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CaseStatus::Approved | CaseStatus::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Pending => "pending",
            CaseStatus::Review => "review",
            CaseStatus::TaskPending => "task_pending",
            CaseStatus::Approved => "approved",
            CaseStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(CaseStatus::Pending),
            "review" => Ok(CaseStatus::Review),
            "task_pending" | "taskpending" => Ok(CaseStatus::TaskPending),
            "approved" => Ok(CaseStatus::Approved),
            "rejected" => Ok(CaseStatus::Rejected),
            other => Err(format!("unknown case status '{other}'")),
        }
    }
}

/// Verification record for one workflow step. At most one per step name within a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedStep {
    pub step: String,
    pub verified: bool,
    pub verified_by: EmployeeId,
    pub updated_at: DateTime<Utc>,
}

/// Editable detail sections of a case file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailSection {
    Applicant,
    Bank,
    Liability,
    Income,
    Collateral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseComment {
    pub author_id: EmployeeId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub recorded_by: EmployeeId,
    /// Amount in minor currency units
    pub amount_minor: i64,
    pub reference: String,
    pub received_at: DateTime<Utc>,
}

/// A loan application file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    /// Stable reference used by inbox records and live events
    pub id: Uuid,
    pub organization_id: OrganizationId,
    /// Per-organization loan identifier issued by the sequence generator
    pub case_number: CaseNumber,
    pub status: CaseStatus,
    /// Status to return to once a raised task is cleared
    pub resume_status: Option<CaseStatus>,
    pub completed_steps: Vec<String>,
    pub verified_steps: Vec<VerifiedStep>,
    pub creator_id: EmployeeId,
    pub branch: String,
    pub details: BTreeMap<DetailSection, serde_json::Value>,
    pub review_report: Option<serde_json::Value>,
    pub final_report: Option<serde_json::Value>,
    pub pending_task: Option<serde_json::Value>,
    /// Approver or rejector
    pub decided_by: Option<EmployeeId>,
    pub comments: Vec<CaseComment>,
    pub payments: Vec<PaymentReceipt>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Case {
    pub fn new(
        organization_id: impl Into<OrganizationId>,
        case_number: CaseNumber,
        creator_id: impl Into<EmployeeId>,
        branch: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            organization_id: organization_id.into(),
            case_number,
            status: CaseStatus::Pending,
            resume_status: None,
            completed_steps: Vec::new(),
            verified_steps: Vec::new(),
            creator_id: creator_id.into(),
            branch: branch.into(),
            details: BTreeMap::new(),
            review_report: None,
            final_report: None,
            pending_task: None,
            decided_by: None,
            comments: Vec::new(),
            payments: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> CaseKey {
        CaseKey::new(self.organization_id.clone(), self.case_number)
    }

    pub fn verified_step(&self, step: &str) -> Option<&VerifiedStep> {
        self.verified_steps.iter().find(|s| s.step == step)
    }

    /// Updates the existing record for `step` in place, or appends one.
    pub fn upsert_verified_step(&mut self, step: &str, verified: bool, verifier: &str) {
        let now = Utc::now();
        match self.verified_steps.iter_mut().find(|s| s.step == step) {
            Some(existing) => {
                existing.verified = verified;
                existing.verified_by = verifier.to_string();
                existing.updated_at = now;
            }
            None => self.verified_steps.push(VerifiedStep {
                step: step.to_string(),
                verified,
                verified_by: verifier.to_string(),
                updated_at: now,
            }),
        }
    }

    /// Returns false when the step was already recorded.
    pub fn mark_step_completed(&mut self, step: &str) -> bool {
        if self.completed_steps.iter().any(|s| s == step) {
            return false;
        }
        self.completed_steps.push(step.to_string());
        true
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Input for opening a new case
#[derive(Debug, Clone)]
pub struct NewCase {
    pub organization_id: OrganizationId,
    pub creator_id: EmployeeId,
    pub branch: String,
}

/// The employee performing an action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub employee_id: EmployeeId,
    pub display_name: String,
}

impl Actor {
    pub fn new(employee_id: impl Into<EmployeeId>, display_name: impl Into<String>) -> Self {
        Self {
            employee_id: employee_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Directory entry for an employee of an organization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub branches: Vec<String>,
    /// Assigned role reference; `None` for unassigned staff
    pub role: Option<String>,
    pub is_super_admin: bool,
    pub push_token: Option<String>,
}

impl Employee {
    pub fn new(
        id: impl Into<EmployeeId>,
        organization_id: impl Into<OrganizationId>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            organization_id: organization_id.into(),
            name: name.into(),
            branches: Vec::new(),
            role: None,
            is_super_admin: false,
            push_token: None,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branches.push(branch.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_push_token(mut self, token: impl Into<String>) -> Self {
        self.push_token = Some(token.into());
        self
    }

    pub fn super_admin(mut self) -> Self {
        self.is_super_admin = true;
        self
    }

    pub fn manages_branch(&self, branch: &str) -> bool {
        self.role.is_some() && self.branches.iter().any(|b| b == branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverify_updates_existing_record() {
        let mut case = Case::new("acme", 1, "emp-1", "north");
        case.upsert_verified_step("kyc", true, "emp-2");
        case.upsert_verified_step("kyc", false, "emp-3");
        case.upsert_verified_step("income", true, "emp-2");

        assert_eq!(case.verified_steps.len(), 2);
        let kyc = case.verified_step("kyc").unwrap();
        assert!(!kyc.verified);
        assert_eq!(kyc.verified_by, "emp-3");
    }

    #[test]
    fn test_completed_steps_keep_order_without_duplicates() {
        let mut case = Case::new("acme", 1, "emp-1", "north");
        assert!(case.mark_step_completed("applicant"));
        assert!(case.mark_step_completed("bank"));
        assert!(!case.mark_step_completed("applicant"));
        assert_eq!(case.completed_steps, vec!["applicant", "bank"]);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("task-pending".parse::<CaseStatus>(), Ok(CaseStatus::TaskPending));
        assert_eq!("Approved".parse::<CaseStatus>(), Ok(CaseStatus::Approved));
        assert!("archived".parse::<CaseStatus>().is_err());
        assert!(CaseStatus::Rejected.is_terminal());
        assert!(!CaseStatus::TaskPending.is_terminal());
    }

    #[test]
    fn test_unassigned_staff_do_not_manage_branches() {
        let staff = Employee::new("e1", "acme", "Sam").with_branch("north");
        let manager = Employee::new("e2", "acme", "Kim")
            .with_branch("north")
            .with_role("branch-manager");
        assert!(!staff.manages_branch("north"));
        assert!(manager.manages_branch("north"));
        assert!(!manager.manages_branch("south"));
    }
}
