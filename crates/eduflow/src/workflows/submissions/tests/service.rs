use std::sync::Arc;

use super::common::{
    build_service, catalog, complete_values, directory, draft_entry, now, record_with, school,
    school_admin, sector_admin_alpha, service_with, submission_id, superadmin, today,
    ConflictingStore, DeadSink, MemoryStore, RecordingSink, UnavailableStore,
};
use crate::workflows::submissions::domain::{
    CategoryId, SubmissionStatus, TransitionAction,
};
use crate::workflows::submissions::repository::SubmissionFilter;
use crate::workflows::submissions::service::WorkflowError;

#[tokio::test]
async fn save_draft_creates_a_draft_submission() {
    let (service, store, _sink) = build_service();
    let actor = school_admin("sch-01");

    let record = service
        .save_draft(
            &actor,
            school("sch-01"),
            CategoryId("cat-enrollment".to_string()),
            vec![
                draft_entry("principal_name", "Leyla Aliyeva"),
                draft_entry("student_count", "640"),
            ],
            now(),
        )
        .await
        .expect("draft saves");

    assert_eq!(record.status, SubmissionStatus::Draft);
    assert_eq!(record.entries.len(), 2);
    assert_eq!(
        store.status_of(&record.id),
        Some(SubmissionStatus::Draft)
    );
}

#[tokio::test]
async fn save_draft_rejects_unknown_columns_and_foreign_schools() {
    let (service, _store, _sink) = build_service();

    let unknown_column = service
        .save_draft(
            &school_admin("sch-01"),
            school("sch-01"),
            CategoryId("cat-enrollment".to_string()),
            vec![draft_entry("no_such_column", "x")],
            now(),
        )
        .await
        .expect_err("unknown column is refused");
    assert!(matches!(unknown_column, WorkflowError::UnknownColumn(_)));

    let foreign = service
        .save_draft(
            &school_admin("sch-02"),
            school("sch-01"),
            CategoryId("cat-enrollment".to_string()),
            vec![draft_entry("principal_name", "x")],
            now(),
        )
        .await
        .expect_err("another school's admin cannot write");
    assert!(matches!(foreign, WorkflowError::PermissionDenied { .. }));
}

#[tokio::test]
async fn pending_and_approved_submissions_are_locked_against_edits() {
    let (service, store, _sink) = build_service();
    store.seed(record_with(
        "sch-01",
        "cat-enrollment",
        SubmissionStatus::Pending,
        &complete_values(),
    ));

    let error = service
        .save_draft(
            &school_admin("sch-01"),
            school("sch-01"),
            CategoryId("cat-enrollment".to_string()),
            vec![draft_entry("student_count", "650")],
            now(),
        )
        .await
        .expect_err("pending submission is locked");
    assert!(matches!(
        error,
        WorkflowError::SubmissionLocked {
            status: SubmissionStatus::Pending
        }
    ));
}

#[tokio::test]
async fn rejected_submissions_stay_rejected_while_edited_then_resubmit() {
    let (service, store, sink) = build_service();
    let mut record = record_with(
        "sch-01",
        "cat-enrollment",
        SubmissionStatus::Rejected,
        &[("principal_name", "Leyla Aliyeva")],
    );
    record.rejection_reason = Some("missing counts".to_string());
    store.seed(record);
    let actor = school_admin("sch-01");
    let id = submission_id("sch-01", "cat-enrollment");

    service
        .save_draft(
            &actor,
            school("sch-01"),
            CategoryId("cat-enrollment".to_string()),
            vec![
                draft_entry("student_count", "640"),
                draft_entry("contact_email", "office@sch01.example.org"),
            ],
            now(),
        )
        .await
        .expect("rejected submissions are editable");
    assert_eq!(store.status_of(&id), Some(SubmissionStatus::Rejected));

    let receipt = service
        .submit(&actor, id.clone(), now())
        .await
        .expect("resubmit succeeds");
    assert!(receipt.applied);
    assert_eq!(receipt.new_status, SubmissionStatus::Pending);

    let records = store.records.lock().expect("store mutex poisoned");
    let stored = records.get(&id).expect("record exists");
    assert_eq!(stored.rejection_reason, None);
    drop(records);

    let event = sink.events().pop().expect("one event");
    assert_eq!(event.kind, TransitionAction::Submit);
    assert_eq!(event.old_status, SubmissionStatus::Rejected);
    assert_eq!(event.new_status, SubmissionStatus::Pending);
}

#[tokio::test]
async fn submit_with_validation_errors_is_blocked() {
    let (service, store, sink) = build_service();
    store.seed(record_with(
        "sch-01",
        "cat-enrollment",
        SubmissionStatus::Draft,
        &[("principal_name", "Leyla Aliyeva")],
    ));

    let error = service
        .submit(
            &school_admin("sch-01"),
            submission_id("sch-01", "cat-enrollment"),
            now(),
        )
        .await
        .expect_err("incomplete submission cannot submit");
    assert!(matches!(error, WorkflowError::Validation(_)));
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn approve_emits_exactly_one_notification() {
    let (service, store, sink) = build_service();
    store.seed(record_with(
        "sch-01",
        "cat-enrollment",
        SubmissionStatus::Pending,
        &complete_values(),
    ));
    let id = submission_id("sch-01", "cat-enrollment");

    let receipt = service
        .approve(&sector_admin_alpha(), id.clone(), now())
        .await
        .expect("approve succeeds");
    assert!(receipt.applied);
    assert_eq!(sink.events().len(), 1);

    // Replaying the approve is a success without a second event.
    let replay = service
        .approve(&sector_admin_alpha(), id, now())
        .await
        .expect("replay is a no-op");
    assert!(!replay.applied);
    assert_eq!(replay.new_status, SubmissionStatus::Approved);
    assert_eq!(sink.events().len(), 1);
}

#[tokio::test]
async fn notification_failure_never_fails_the_transition() {
    let store = Arc::new(MemoryStore::default());
    store.seed(record_with(
        "sch-01",
        "cat-enrollment",
        SubmissionStatus::Pending,
        &complete_values(),
    ));
    let service = service_with(store.clone(), Arc::new(DeadSink), catalog(), directory());
    let id = submission_id("sch-01", "cat-enrollment");

    let receipt = service
        .approve(&sector_admin_alpha(), id.clone(), now())
        .await
        .expect("transition survives a dead sink");
    assert!(receipt.applied);
    assert_eq!(store.status_of(&id), Some(SubmissionStatus::Approved));
}

#[tokio::test]
async fn concurrent_status_change_surfaces_as_a_conflict() {
    let inner = MemoryStore::default();
    inner.seed(record_with(
        "sch-01",
        "cat-enrollment",
        SubmissionStatus::Pending,
        &complete_values(),
    ));
    let service = service_with(
        Arc::new(ConflictingStore { inner }),
        Arc::new(RecordingSink::default()),
        catalog(),
        directory(),
    );

    let error = service
        .approve(
            &sector_admin_alpha(),
            submission_id("sch-01", "cat-enrollment"),
            now(),
        )
        .await
        .expect_err("conflict surfaces");
    assert!(matches!(error, WorkflowError::Conflict { .. }));
}

#[tokio::test]
async fn store_outage_propagates_as_unavailable() {
    let service = service_with(
        Arc::new(UnavailableStore),
        Arc::new(RecordingSink::default()),
        catalog(),
        directory(),
    );

    let error = service
        .approve(
            &superadmin(),
            submission_id("sch-01", "cat-enrollment"),
            now(),
        )
        .await
        .expect_err("outage surfaces");
    assert!(matches!(error, WorkflowError::Unavailable(_)));
}

#[tokio::test]
async fn reopen_returns_an_approved_submission_to_draft() {
    let (service, store, _sink) = build_service();
    store.seed(record_with(
        "sch-01",
        "cat-enrollment",
        SubmissionStatus::Approved,
        &complete_values(),
    ));
    let id = submission_id("sch-01", "cat-enrollment");

    let denied = service
        .reopen(&sector_admin_alpha(), id.clone(), now())
        .await
        .expect_err("reviewers cannot reopen");
    assert!(matches!(denied, WorkflowError::PermissionDenied { .. }));

    let receipt = service
        .reopen(&superadmin(), id.clone(), now())
        .await
        .expect("superadmin reopens");
    assert!(receipt.applied);
    assert_eq!(store.status_of(&id), Some(SubmissionStatus::Draft));
}

#[tokio::test]
async fn list_is_scoped_to_the_actor() {
    let (service, store, _sink) = build_service();
    store.seed(record_with(
        "sch-01",
        "cat-enrollment",
        SubmissionStatus::Pending,
        &complete_values(),
    ));
    store.seed(record_with(
        "sch-03",
        "cat-enrollment",
        SubmissionStatus::Pending,
        &complete_values(),
    ));

    let alpha = service
        .list(&sector_admin_alpha(), SubmissionFilter::default())
        .await
        .expect("list succeeds");
    assert_eq!(alpha.len(), 1);
    assert_eq!(alpha[0].id.school, school("sch-01"));

    let all = service
        .list(&superadmin(), SubmissionFilter::default())
        .await
        .expect("list succeeds");
    assert_eq!(all.len(), 2);

    let own = service
        .list(&school_admin("sch-03"), SubmissionFilter::default())
        .await
        .expect("list succeeds");
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].id.school, school("sch-03"));
}

#[tokio::test]
async fn list_filter_outside_scope_answers_empty() {
    let (service, store, _sink) = build_service();
    store.seed(record_with(
        "sch-01",
        "cat-enrollment",
        SubmissionStatus::Pending,
        &complete_values(),
    ));

    let views = service
        .list(
            &sector_admin_alpha(),
            SubmissionFilter {
                school: Some(school("sch-03")),
                ..SubmissionFilter::default()
            },
        )
        .await
        .expect("list succeeds");
    assert!(views.is_empty());
}

#[tokio::test]
async fn validate_now_reports_without_mutating() {
    let (service, store, _sink) = build_service();
    store.seed(record_with(
        "sch-01",
        "cat-enrollment",
        SubmissionStatus::Draft,
        &[("principal_name", "Leyla Aliyeva")],
    ));

    let report = service
        .validate_now(&school("sch-01"), &CategoryId("cat-enrollment".to_string()))
        .await
        .expect("validates");
    assert_eq!(report.errors.len(), 2);
    assert_eq!(
        store.status_of(&submission_id("sch-01", "cat-enrollment")),
        Some(SubmissionStatus::Draft)
    );
}

#[tokio::test]
async fn dashboard_rolls_up_by_sector_and_region() {
    let (service, store, _sink) = build_service();
    store.seed(record_with(
        "sch-01",
        "cat-enrollment",
        SubmissionStatus::Approved,
        &complete_values(),
    ));
    store.seed(record_with(
        "sch-02",
        "cat-enrollment",
        SubmissionStatus::Pending,
        &[("principal_name", "Rustam Karimov")],
    ));
    store.seed(record_with(
        "sch-03",
        "cat-enrollment",
        SubmissionStatus::Draft,
        &[],
    ));

    let view = service
        .dashboard(&superadmin(), today())
        .await
        .expect("dashboard computes");

    assert_eq!(view.overall.total, 3);
    assert_eq!(view.overall.approved, 1);
    assert_eq!(view.overall.pending, 1);
    assert_eq!(view.overall.draft, 1);

    assert_eq!(view.sectors.len(), 2);
    let alpha = view
        .sectors
        .iter()
        .find(|sector| sector.sector.0 == "s-alpha")
        .expect("s-alpha present");
    // sch-01 at 100, sch-02 at 33: unweighted mean rounds to 67.
    assert_eq!(alpha.schools_count, 2);
    assert_eq!(alpha.completion, 67);

    assert_eq!(view.regions.len(), 1);
    // (67 + 0) / 2 sectors.
    assert_eq!(view.regions[0].completion, 34);

    // The enrollment deadline (2026-03-04) is two days out from the fixture
    // clock: due soon.
    assert_eq!(view.deadlines.len(), 1);
}

#[tokio::test]
async fn dashboard_is_scope_filtered_too() {
    let (service, store, _sink) = build_service();
    store.seed(record_with(
        "sch-01",
        "cat-enrollment",
        SubmissionStatus::Approved,
        &complete_values(),
    ));
    store.seed(record_with(
        "sch-03",
        "cat-enrollment",
        SubmissionStatus::Pending,
        &complete_values(),
    ));

    let view = service
        .dashboard(&sector_admin_alpha(), today())
        .await
        .expect("dashboard computes");
    assert_eq!(view.overall.total, 1);
    assert_eq!(view.sectors.len(), 1);
    assert_eq!(view.sectors[0].sector.0, "s-alpha");
}
