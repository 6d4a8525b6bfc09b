/// Shared builders for the case lifecycle integration tests
#[allow(dead_code)]
pub mod harness {
    use async_trait::async_trait;
    use lendflow::cases::{Actor, Case, CaseKey, CaseStatus, Employee, NewCase};
    use lendflow::config::{NotificationConfig, SequenceConfig};
    use lendflow::notify::{InProcessPresence, PushError, PushMessage, PushSender};
    use lendflow::{LendflowServices, MemoryStore};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    pub const ORG: &str = "acme";
    pub const BRANCH: &str = "north";

    /// Push sender that records every message it is handed
    #[derive(Default)]
    pub struct RecordingPush {
        sent: Mutex<Vec<PushMessage>>,
        fail_tokens: Vec<String>,
    }

    impl RecordingPush {
        pub fn failing_for(tokens: &[&str]) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail_tokens: tokens.iter().map(|t| t.to_string()).collect(),
            }
        }

        pub fn tokens(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|m| m.token.clone())
                .collect()
        }
    }

    #[async_trait]
    impl PushSender for RecordingPush {
        async fn send(&self, message: PushMessage) -> Result<(), PushError> {
            let rejected = self.fail_tokens.contains(&message.token);
            self.sent.lock().unwrap().push(message);
            if rejected {
                return Err(PushError::Rejected {
                    status: 400,
                    body: "unregistered token".to_string(),
                });
            }
            Ok(())
        }
    }

    pub struct TestEnv {
        pub store: Arc<MemoryStore>,
        pub presence: Arc<InProcessPresence>,
        pub push: Arc<RecordingPush>,
        pub services: LendflowServices,
    }

    impl TestEnv {
        pub async fn new() -> Self {
            Self::with_push(RecordingPush::default()).await
        }

        pub async fn with_push(push: RecordingPush) -> Self {
            let store = Arc::new(MemoryStore::new());
            seed_staff(&store).await;
            let presence = Arc::new(InProcessPresence::new());
            let push = Arc::new(push);
            let services = LendflowServices::with_presence(
                store.clone(),
                presence.clone(),
                &NotificationConfig::default(),
                &SequenceConfig::default(),
                Some(push.clone() as Arc<dyn PushSender>),
            );
            Self {
                store,
                presence,
                push,
                services,
            }
        }

        /// Opens a case created by `creator` on the default branch.
        pub async fn open_case(&self) -> Case {
            self.services
                .lifecycle
                .open_case(NewCase {
                    organization_id: ORG.to_string(),
                    creator_id: "creator".to_string(),
                    branch: BRANCH.to_string(),
                })
                .await
                .unwrap()
        }

        /// Opens a case and moves it to `status` through the normal workflow.
        pub async fn case_in(&self, status: CaseStatus) -> CaseKey {
            let case = self.open_case().await;
            let key = case.key();
            let path: &[CaseStatus] = match status {
                CaseStatus::Pending => &[],
                CaseStatus::Review => &[CaseStatus::Review],
                CaseStatus::TaskPending => &[CaseStatus::Review, CaseStatus::TaskPending],
                CaseStatus::Approved => &[CaseStatus::Review, CaseStatus::Approved],
                CaseStatus::Rejected => &[CaseStatus::Review, CaseStatus::Rejected],
            };
            for step in path {
                self.services
                    .lifecycle
                    .change_status(&key, *step, &manager(), None)
                    .await
                    .unwrap();
            }
            key
        }

        /// Stops the notification worker after it has processed everything queued.
        pub async fn settle(self) -> Settled {
            assert!(self.services.shutdown(Duration::from_secs(5)).await);
            Settled {
                store: self.store,
                push: self.push,
            }
        }
    }

    pub struct Settled {
        pub store: Arc<MemoryStore>,
        pub push: Arc<RecordingPush>,
    }

    impl Settled {
        pub async fn recipients_of(&self, title_fragment: &str) -> Vec<String> {
            let mut recipients: Vec<String> = self
                .store
                .all_notifications()
                .await
                .into_iter()
                .filter(|n| n.title.contains(title_fragment))
                .map(|n| n.recipient_id)
                .collect();
            recipients.sort();
            recipients
        }
    }

    pub fn manager() -> Actor {
        Actor::new("manager", "Morgan Lee")
    }

    pub fn employee() -> Actor {
        Actor::new("clerk", "Casey Kim")
    }

    /// creator (push token), branch manager, unassigned clerk, super admin (push token)
    pub async fn seed_staff(store: &MemoryStore) {
        store
            .add_employee(
                Employee::new("creator", ORG, "Cam Ortiz")
                    .with_branch(BRANCH)
                    .with_push_token("tok-creator"),
            )
            .await;
        store
            .add_employee(
                Employee::new("manager", ORG, "Morgan Lee")
                    .with_branch(BRANCH)
                    .with_role("branch-manager"),
            )
            .await;
        store
            .add_employee(Employee::new("clerk", ORG, "Casey Kim").with_branch(BRANCH))
            .await;
        store
            .add_employee(
                Employee::new("admin", ORG, "Ada Park")
                    .super_admin()
                    .with_push_token("tok-admin"),
            )
            .await;
    }
}
