// Lendflow Library - Loan Case Lifecycle and Notification Fan-Out
// This exposes the core components for testing and integration

pub mod cases;
pub mod config;
pub mod notify;
pub mod observability;
pub mod realtime;
pub mod sequence;
pub mod services;
pub mod shutdown;
pub mod store;
pub mod telemetry;

// Re-export key types for easy access
pub use cases::{Actor, Case, CaseError, CaseKey, CaseLifecycle, CaseStatus, NewCase};
pub use config::{config, init_config, LendflowConfig};
pub use notify::{
    NotificationDispatcher, NotificationQueue, NotificationWorker, PresenceRegistry,
    RecipientResolver,
};
pub use observability::{dispatch_metrics, DispatchMetrics};
pub use realtime::RealtimeGateway;
pub use sequence::SequenceGenerator;
pub use services::LendflowServices;
pub use shutdown::ShutdownCoordinator;
pub use store::{MemoryStore, Storage, StoreError};
#[cfg(feature = "database")]
pub use store::SqliteStore;
pub use telemetry::{create_case_span, generate_correlation_id, init_telemetry, shutdown_telemetry};
