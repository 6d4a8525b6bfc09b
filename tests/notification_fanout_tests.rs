// Delivery across push, live connections and the inbox

mod fixtures;

use fixtures::harness::{employee, manager, RecordingPush, TestEnv, ORG};
use lendflow::cases::CaseStatus;
use lendflow::notify::{ConnectionHandle, PresenceRegistry};
use lendflow::realtime::{ClientEvent, ServerEvent};
use lendflow::store::InboxRepository;

#[tokio::test]
async fn test_each_channel_reaches_the_right_people() {
    let env = TestEnv::new().await;
    let (manager_conn, mut manager_rx) = ConnectionHandle::open();
    env.presence.join("manager", manager_conn).await;

    let key = env.case_in(CaseStatus::Pending).await;
    env.services
        .lifecycle
        .change_status(&key, CaseStatus::Review, &employee(), None)
        .await
        .unwrap();

    let settled = env.settle().await;

    // inbox: everyone in the audience except the actor
    assert_eq!(
        settled.recipients_of("moved to review").await,
        vec!["admin", "creator", "manager"]
    );

    // push: only those with a registered token
    let mut tokens = settled.push.tokens();
    tokens.sort();
    assert_eq!(tokens, vec!["tok-admin", "tok-creator"]);

    // live: only the connected manager
    match manager_rx.recv().await {
        Some(ServerEvent::Notification(live)) => {
            assert_eq!(live.recipient_id, "manager");
            assert_eq!(live.loan_id, key.case_number);
            assert!(live.message.contains("Casey Kim"));
            assert!(!live.read_status);
        }
        other => panic!("expected a live notification, got {other:?}"),
    }
}

#[tokio::test]
async fn test_push_failure_does_not_block_other_channels() {
    let env = TestEnv::with_push(RecordingPush::failing_for(&["tok-creator"])).await;
    let key = env.case_in(CaseStatus::Review).await;
    env.services
        .lifecycle
        .change_status(&key, CaseStatus::Rejected, &manager(), None)
        .await
        .unwrap();

    let settled = env.settle().await;
    assert_eq!(
        settled.recipients_of("rejected").await,
        vec!["admin", "creator"]
    );
    let mut tokens = settled.push.tokens();
    tokens.sort();
    // review and rejection both attempted on each token
    assert_eq!(tokens, vec!["tok-admin", "tok-admin", "tok-creator", "tok-creator"]);
}

#[tokio::test]
async fn test_disconnected_employee_still_gets_inbox_record() {
    let env = TestEnv::new().await;
    let (conn, rx) = ConnectionHandle::open();
    env.presence.join("manager", conn).await;
    drop(rx);

    let key = env.case_in(CaseStatus::Review).await;
    env.services
        .lifecycle
        .add_comment(&key, &employee(), "Payslips uploaded")
        .await
        .unwrap();

    let settled = env.settle().await;
    assert!(settled
        .recipients_of("New comment")
        .await
        .contains(&"manager".to_string()));
}

#[tokio::test]
async fn test_joining_returns_history_and_marking_read_refreshes_it() {
    let env = TestEnv::new().await;
    let gateway = env.services.gateway.clone();
    let key = env.case_in(CaseStatus::Review).await;
    env.services
        .lifecycle
        .change_status(&key, CaseStatus::Approved, &manager(), None)
        .await
        .unwrap();
    let settled = env.settle().await;

    let (conn, mut rx) = ConnectionHandle::open();
    gateway
        .handle_event(
            &conn,
            ClientEvent::Join {
                employee_id: "creator".to_string(),
                organization_id: ORG.to_string(),
            },
        )
        .await
        .unwrap();

    let history = match rx.recv().await {
        Some(ServerEvent::AllNotifications(history)) => history,
        other => panic!("expected history, got {other:?}"),
    };
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|n| !n.read));
    // Jobs for separate events are dispatched concurrently, so look the approval up by title.
    let approval = history
        .iter()
        .find(|n| n.title.contains("approved"))
        .unwrap()
        .clone();

    gateway
        .handle_event(
            &conn,
            ClientEvent::MarkAsRead {
                notification_id: approval.id,
            },
        )
        .await
        .unwrap();
    match rx.recv().await {
        Some(ServerEvent::AllNotifications(history)) => {
            assert_eq!(history.len(), 2);
            for n in &history {
                assert_eq!(n.read, n.id == approval.id, "{}", n.title);
            }
        }
        other => panic!("expected refreshed history, got {other:?}"),
    }

    let stored = settled
        .store
        .notifications_for(ORG, "creator")
        .await
        .unwrap();
    assert_eq!(stored.iter().filter(|n| n.read).count(), 1);
}
