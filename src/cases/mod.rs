// Case Lifecycle Module
//
// Case data model, the status graph, and the service that applies
// transitions and hands committed changes to the notification pipeline.

pub mod errors;
pub mod lifecycle;
pub mod types;
pub mod workflow;

pub use errors::CaseError;
pub use lifecycle::CaseLifecycle;
pub use types::{
    Actor, Case, CaseKey, CaseNumber, CaseStatus, DetailSection, Employee, EmployeeId, NewCase,
    OrganizationId, VerifiedStep,
};
pub use workflow::{CaseEvent, CaseWorkflow};
