// Case lifecycle scenarios through the wired services and the in-memory store

mod fixtures;

use fixtures::harness::{employee, manager, TestEnv, BRANCH, ORG};
use lendflow::cases::{CaseError, CaseKey, CaseStatus, DetailSection, NewCase};
use lendflow::store::{CaseRepository, SequenceStore};
use lendflow::Case;
use serde_json::json;

#[tokio::test]
async fn test_branch_employee_approves_case_under_review() {
    let env = TestEnv::new().await;
    env.store.advance_to(ORG, "caseId", 1041).await.unwrap();
    let key = env.case_in(CaseStatus::Review).await;
    assert_eq!(key, CaseKey::new(ORG, 1042));

    let approved = env
        .services
        .lifecycle
        .change_status(
            &key,
            CaseStatus::Approved,
            &employee(),
            Some(json!({"decision": "approve", "limit": 250000})),
        )
        .await
        .unwrap();
    assert_eq!(approved.status, CaseStatus::Approved);
    assert_eq!(approved.decided_by.as_deref(), Some("clerk"));

    let stored = env.store.find_case(&key).await.unwrap().unwrap();
    assert_eq!(stored.status, CaseStatus::Approved);
    assert_eq!(stored.final_report, Some(json!({"decision": "approve", "limit": 250000})));

    let err = env
        .services
        .lifecycle
        .change_status(&key, CaseStatus::Rejected, &manager(), None)
        .await
        .unwrap_err();
    assert!(err.is_invalid_operation());

    let settled = env.settle().await;
    let approvals: Vec<_> = settled
        .store
        .all_notifications()
        .await
        .into_iter()
        .filter(|n| n.title.contains("approved"))
        .collect();
    // creator, branch manager and super admin; the acting clerk is left out
    assert_eq!(approvals.len(), 3);
    assert!(approvals.iter().all(|n| n.title.contains("1042")));
    assert!(approvals.iter().all(|n| n.body.contains("Casey Kim")));
    assert!(approvals.iter().all(|n| n.recipient_id != "clerk"));
    assert!(settled.recipients_of("rejected").await.is_empty());
}

#[tokio::test]
async fn test_terminal_status_cannot_be_left() {
    let env = TestEnv::new().await;
    let key = env.open_case().await.key();
    let lifecycle = &env.services.lifecycle;

    lifecycle
        .change_status(&key, CaseStatus::Approved, &manager(), None)
        .await
        .unwrap();
    for target in [
        CaseStatus::Approved,
        CaseStatus::Rejected,
        CaseStatus::Review,
        CaseStatus::TaskPending,
        CaseStatus::Pending,
    ] {
        let err = lifecycle
            .change_status(&key, target, &manager(), None)
            .await
            .unwrap_err();
        assert!(err.is_invalid_operation(), "{target} should be refused");
    }
    assert_eq!(
        lifecycle.find_case(&key).await.unwrap().status,
        CaseStatus::Approved
    );
}

#[tokio::test]
async fn test_pending_is_not_a_target() {
    let env = TestEnv::new().await;
    let key = env.case_in(CaseStatus::Review).await;

    let err = env
        .services
        .lifecycle
        .change_status(&key, CaseStatus::Pending, &manager(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CaseError::InvalidInput { .. }));
}

#[tokio::test]
async fn test_unknown_case_is_not_found() {
    let env = TestEnv::new().await;
    let err = env
        .services
        .lifecycle
        .change_status(&CaseKey::new(ORG, 999), CaseStatus::Review, &manager(), None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_verifying_step_on_approved_case_is_silent() {
    let env = TestEnv::new().await;
    let key = env.case_in(CaseStatus::Approved).await;
    let lifecycle = &env.services.lifecycle;

    let case = lifecycle
        .set_step_verified(&key, "collateral-appraisal", true, &employee())
        .await
        .unwrap();
    assert_eq!(case.status, CaseStatus::Approved);
    let step = case.verified_step("collateral-appraisal").unwrap();
    assert!(step.verified);
    assert_eq!(step.verified_by, "clerk");

    let case = lifecycle
        .set_step_verified(&key, "collateral-appraisal", false, &manager())
        .await
        .unwrap();
    assert_eq!(case.verified_steps.len(), 1);
    assert!(!case.verified_step("collateral-appraisal").unwrap().verified);

    let settled = env.settle().await;
    let notifications = settled.store.all_notifications().await;
    // only the review and approval announcements from getting here
    assert!(notifications
        .iter()
        .all(|n| n.title.contains("review") || n.title.contains("approved")));
}

#[tokio::test]
async fn test_detail_edits_announced_only_after_pending() {
    let env = TestEnv::new().await;
    let lifecycle = env.services.lifecycle.clone();
    let pending = env.open_case().await.key();
    let in_review = env.case_in(CaseStatus::Review).await;

    lifecycle
        .edit_details(&pending, DetailSection::Income, json!({"monthly": 4200}), &employee())
        .await
        .unwrap();
    let edited = lifecycle
        .edit_details(&in_review, DetailSection::Income, json!({"monthly": 5100}), &employee())
        .await
        .unwrap();
    assert_eq!(
        edited.details.get(&DetailSection::Income),
        Some(&json!({"monthly": 5100}))
    );

    let settled = env.settle().await;
    let updates: Vec<_> = settled
        .store
        .all_notifications()
        .await
        .into_iter()
        .filter(|n| n.title.contains("updated"))
        .collect();
    assert_eq!(updates.len(), 3);
    assert!(updates
        .iter()
        .all(|n| n.case_ref.case_number == in_review.case_number));
}

#[tokio::test]
async fn test_details_frozen_once_decided() {
    let env = TestEnv::new().await;
    let key = env.case_in(CaseStatus::Rejected).await;

    let err = env
        .services
        .lifecycle
        .edit_details(&key, DetailSection::Bank, json!({"iban": "X"}), &employee())
        .await
        .unwrap_err();
    assert!(err.is_invalid_operation());
}

#[tokio::test]
async fn test_clear_task_returns_to_previous_status() {
    let env = TestEnv::new().await;
    let lifecycle = env.services.lifecycle.clone();
    let key = env.case_in(CaseStatus::TaskPending).await;

    let case = lifecycle.find_case(&key).await.unwrap();
    assert_eq!(case.resume_status, Some(CaseStatus::Review));

    let cleared = lifecycle.clear_task(&key, &manager()).await.unwrap();
    assert_eq!(cleared.status, CaseStatus::Review);
    assert!(cleared.pending_task.is_none());

    let err = lifecycle.clear_task(&key, &manager()).await.unwrap_err();
    assert!(err.is_invalid_operation());

    let settled = env.settle().await;
    assert_eq!(
        settled.recipients_of("Task cleared").await,
        vec!["admin".to_string(), "creator".to_string()]
    );
}

#[tokio::test]
async fn test_comments_and_payments_validated_and_announced() {
    let env = TestEnv::new().await;
    let lifecycle = env.services.lifecycle.clone();
    let key = env.case_in(CaseStatus::Approved).await;

    assert!(matches!(
        lifecycle.add_comment(&key, &employee(), "   ").await,
        Err(CaseError::InvalidInput { .. })
    ));
    assert!(matches!(
        lifecycle.record_payment(&key, &employee(), 0, "wire-1").await,
        Err(CaseError::InvalidInput { .. })
    ));

    lifecycle
        .add_comment(&key, &employee(), "Signed contract received")
        .await
        .unwrap();
    let case = lifecycle
        .record_payment(&key, &employee(), 125_050, "wire-1")
        .await
        .unwrap();
    assert_eq!(case.comments.len(), 1);
    assert_eq!(case.payments[0].amount_minor, 125_050);

    let settled = env.settle().await;
    let payments: Vec<_> = settled
        .store
        .all_notifications()
        .await
        .into_iter()
        .filter(|n| n.title.contains("Payment received"))
        .collect();
    assert_eq!(payments.len(), 3);
    assert!(payments[0].body.contains("1250.50"));
    assert_eq!(settled.recipients_of("New comment").await.len(), 3);
}

#[tokio::test]
async fn test_completed_steps_are_not_duplicated() {
    let env = TestEnv::new().await;
    let key = env.open_case().await.key();
    let lifecycle = &env.services.lifecycle;

    lifecycle.complete_step(&key, "applicant").await.unwrap();
    let case = lifecycle.complete_step(&key, "applicant").await.unwrap();
    assert_eq!(case.completed_steps, vec!["applicant".to_string()]);
}

#[tokio::test]
async fn test_open_case_rejects_taken_number() {
    let env = TestEnv::new().await;
    let first = env.open_case().await;

    let collision = Case::new(ORG, first.case_number + 1, "creator", BRANCH);
    env.store.insert_case(&collision).await.unwrap();

    let err = env
        .services
        .lifecycle
        .open_case(NewCase {
            organization_id: ORG.to_string(),
            creator_id: "creator".to_string(),
            branch: BRANCH.to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CaseError::DuplicateCaseNumber { .. }));
}
