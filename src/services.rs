use crate::cases::CaseLifecycle;
use crate::config::{NotificationConfig, SequenceConfig};
use crate::notify::{
    InProcessPresence, NotificationDispatcher, NotificationQueue, NotificationWorker,
    PresenceRegistry, PushSender, RecipientResolver,
};
use crate::realtime::RealtimeGateway;
use crate::sequence::SequenceGenerator;
use crate::shutdown::ShutdownCoordinator;
use crate::store::Storage;
use std::sync::Arc;
use std::time::Duration;

/// The wired core: lifecycle operations, live gateway and the notification worker.
pub struct LendflowServices {
    pub lifecycle: Arc<CaseLifecycle>,
    pub gateway: Arc<RealtimeGateway>,
    pub presence: Arc<dyn PresenceRegistry>,
    worker: NotificationWorker,
}

impl LendflowServices {
    /// Must be called inside a tokio runtime; spawns the notification worker.
    pub fn build<S>(
        store: Arc<S>,
        notifications: &NotificationConfig,
        sequence: &SequenceConfig,
        push: Option<Arc<dyn PushSender>>,
    ) -> Self
    where
        S: Storage + 'static,
    {
        let presence: Arc<dyn PresenceRegistry> = Arc::new(InProcessPresence::new());
        Self::with_presence(store, presence, notifications, sequence, push)
    }

    /// Same as `build`, with a caller-supplied presence registry.
    pub fn with_presence<S>(
        store: Arc<S>,
        presence: Arc<dyn PresenceRegistry>,
        notifications: &NotificationConfig,
        sequence: &SequenceConfig,
        push: Option<Arc<dyn PushSender>>,
    ) -> Self
    where
        S: Storage + 'static,
    {
        let resolver = RecipientResolver::new(store.clone(), presence.clone());
        let mut dispatcher = NotificationDispatcher::new(store.clone(), presence.clone());
        if let Some(sender) = push {
            dispatcher = dispatcher.with_push(sender, notifications.push_timeout());
        }
        let (queue, worker) =
            NotificationQueue::start(resolver, dispatcher, notifications.queue_settings());

        let generator = Arc::new(SequenceGenerator::with_name(
            store.clone(),
            store.clone(),
            sequence.name.clone(),
        ));
        let lifecycle = Arc::new(CaseLifecycle::new(store.clone(), generator, queue));
        let gateway = Arc::new(RealtimeGateway::new(presence.clone(), store));

        Self {
            lifecycle,
            gateway,
            presence,
            worker,
        }
    }

    /// Drains outstanding notifications. Returns false if the drain timed out.
    pub async fn shutdown(self, drain_timeout: Duration) -> bool {
        ShutdownCoordinator::new(self.worker)
            .shutdown_all_services(drain_timeout)
            .await
    }
}
