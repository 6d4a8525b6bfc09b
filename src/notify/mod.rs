// Notification fan-out
//
// Audience resolution, the three delivery channels and the background queue
// that decouples them from case mutations.

pub mod dispatcher;
pub mod presence;
pub mod push;
pub mod queue;
pub mod recipients;
pub mod types;

pub use dispatcher::{DispatchReport, NotificationDispatcher};
pub use presence::{ConnectionHandle, ConnectionId, InProcessPresence, PresenceRegistry};
pub use push::{HttpPushSender, PushError, PushMessage, PushSender};
pub use queue::{NotificationJob, NotificationQueue, NotificationWorker};
pub use recipients::RecipientResolver;
pub use types::{CaseRef, NotificationMessage, NotificationRecord, Recipient};
