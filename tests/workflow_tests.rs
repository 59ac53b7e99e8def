//! End-to-end letter workflow against the in-memory stores.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use eoffice_server::letter::models::{LetterStatus, StepStatus, SubmitLetterRequest};
use eoffice_server::workflow::{
    ApprovalEngine, CounterKey, InMemoryCounterStore, InMemoryDirectory,
    InMemoryLetterRepository, LetterType, NumberingEngine, PersonProfile, WorkflowError,
};

struct Fixture {
    engine: ApprovalEngine,
    counters: Arc<InMemoryCounterStore>,
}

fn person(id: &str, name: &str, title: &str) -> PersonProfile {
    PersonProfile {
        id: id.to_string(),
        name: name.to_string(),
        job_title: title.to_string(),
        unit_code: "KB".to_string(),
        ..Default::default()
    }
}

fn fixture() -> Fixture {
    let directory = Arc::new(InMemoryDirectory::new());
    directory.insert_person(person("maker", "Rina", "Guru"));
    directory.insert_person(person("rev-1", "Budi", "Wakil Kepala"));
    directory.insert_person(person("rev-2", "Sari", "Bendahara"));
    directory.insert_person(PersonProfile {
        prefix_title: "Dr.".into(),
        suffix_title: "M.Pd.".into(),
        employee_id: "19800101".into(),
        ..person("head", "Siti Aminah", "Kepala Sekolah")
    });
    directory.insert_letter_type(LetterType {
        code: "SK".into(),
        format_code: "SK".into(),
        requires_committee_code: false,
    });
    directory.insert_letter_type(LetterType {
        code: "ST".into(),
        format_code: "ST".into(),
        requires_committee_code: true,
    });

    let counters = Arc::new(InMemoryCounterStore::new());
    let engine = ApprovalEngine::new(
        Arc::new(InMemoryLetterRepository::new()),
        directory.clone(),
        directory,
        NumberingEngine::new(counters.clone(), 64),
        "MIJ",
        7,
    );
    Fixture { engine, counters }
}

fn request(reviewers: &[&str]) -> SubmitLetterRequest {
    SubmitLetterRequest {
        maker_id: "maker".into(),
        approver_id: "head".into(),
        reviewer_ids: reviewers.iter().map(|r| r.to_string()).collect(),
        unit_code: "KB".into(),
        letter_type: "SK".into(),
        subject: "Undangan Rapat Wali Murid".into(),
        recipient_title: "Bapak/Ibu".into(),
        recipient_name: "Wali Murid".into(),
        body: "<p>Dengan hormat,</p>".into(),
        ..Default::default()
    }
}

fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 11, day, 3, 0, 0).unwrap()
}

#[tokio::test]
async fn test_full_approval_assigns_first_number() {
    let f = fixture();
    let letter = f.engine.submit(request(&["rev-1", "rev-2"]), at(24)).await.unwrap();
    assert_eq!(letter.status, LetterStatus::Proses);
    assert_eq!(letter.approver.name, "Dr. Siti Aminah M.Pd.");
    assert_eq!(letter.approver.employee_id, "19800101");

    f.engine.paraf(&letter.id, "rev-1", at(25)).await.unwrap();
    f.engine.paraf(&letter.id, "rev-2", at(25)).await.unwrap();
    let outcome = f.engine.approve(&letter.id, "head", at(26)).await.unwrap();

    assert_eq!(outcome.letter_number, "001/SK/KB/MIJ/XI/2025");
    assert_eq!(outcome.sequence, 1);
    assert_eq!(outcome.letter.status, LetterStatus::Approved);
    assert_eq!(outcome.letter.fiscal_year.as_deref(), Some("2025-2026"));
    assert_eq!(outcome.letter.approver.signed_at, Some(at(26)));
    assert_eq!(
        outcome.letter.approved_reviewer_names(),
        vec!["Budi".to_string(), "Sari".to_string()]
    );

    let stored = f.engine.get(&letter.id).await.unwrap();
    assert_eq!(stored.letter_number.as_deref(), Some("001/SK/KB/MIJ/XI/2025"));
}

#[tokio::test]
async fn test_paraf_out_of_turn_is_refused() {
    let f = fixture();
    let letter = f.engine.submit(request(&["rev-1", "rev-2"]), at(24)).await.unwrap();

    let err = f.engine.paraf(&letter.id, "rev-2", at(25)).await.unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::NotReviewerTurn { ref expected, ref actual }
            if expected == "rev-1" && actual == "rev-2"
    ));
    assert!(err.is_precondition());

    let stored = f.engine.get(&letter.id).await.unwrap();
    assert_eq!(stored.current_step, 0);
    assert!(stored.reviewers.iter().all(|r| r.status == StepStatus::Pending));
}

#[tokio::test]
async fn test_approval_with_pending_reviewers_consumes_no_number() {
    let f = fixture();
    let letter = f.engine.submit(request(&["rev-1", "rev-2"]), at(24)).await.unwrap();
    f.engine.paraf(&letter.id, "rev-1", at(25)).await.unwrap();

    let err = f.engine.approve(&letter.id, "head", at(26)).await.unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::ReviewersPending { signed: 1, required: 2 }
    ));
    let key = CounterKey::new("KB", "SK", "2025-2026");
    assert_eq!(f.counters.current(&key), 0);
    assert_eq!(
        f.engine.get(&letter.id).await.unwrap().status,
        LetterStatus::Proses
    );
}

#[tokio::test]
async fn test_wrong_approver_is_refused() {
    let f = fixture();
    let letter = f.engine.submit(request(&[]), at(24)).await.unwrap();
    let err = f.engine.approve(&letter.id, "rev-1", at(26)).await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotAssignedApprover(_)));
}

#[tokio::test]
async fn test_second_approval_is_refused() {
    let f = fixture();
    let letter = f.engine.submit(request(&[]), at(24)).await.unwrap();
    f.engine.approve(&letter.id, "head", at(26)).await.unwrap();

    let err = f.engine.approve(&letter.id, "head", at(27)).await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidState { status: LetterStatus::Approved, .. }));
    let key = CounterKey::new("KB", "SK", "2025-2026");
    assert_eq!(f.counters.current(&key), 1);
}

#[tokio::test]
async fn test_reject_then_resubmit_restarts_chain() {
    let f = fixture();
    let letter = f.engine.submit(request(&["rev-1", "rev-2"]), at(24)).await.unwrap();
    f.engine.paraf(&letter.id, "rev-1", at(25)).await.unwrap();

    let rejected = f
        .engine
        .reject(&letter.id, "rev-2", "Perbaiki tanggal rapat", at(25))
        .await
        .unwrap();
    assert_eq!(rejected.status, LetterStatus::Revision);
    assert_eq!(rejected.approver.status, StepStatus::Revision);
    assert_eq!(rejected.revision_note.as_deref(), Some("Perbaiki tanggal rapat"));
    assert_eq!(rejected.rejected_by.as_deref(), Some("rev-2"));

    let err = f.engine.paraf(&letter.id, "rev-2", at(25)).await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidState { .. }));

    let mut again = request(&["rev-1", "rev-2"]);
    again.id = Some(letter.id.clone());
    again.subject = "Undangan Rapat Wali Murid (Revisi)".into();
    let resubmitted = f.engine.submit(again, at(26)).await.unwrap();

    assert_eq!(resubmitted.id, letter.id);
    assert_eq!(resubmitted.status, LetterStatus::Proses);
    assert_eq!(resubmitted.current_step, 0);
    assert!(resubmitted.revision_note.is_none());
    assert!(resubmitted.reviewers.iter().all(|r| r.status == StepStatus::Pending));
    assert_eq!(resubmitted.created_at, at(24));
}

#[tokio::test]
async fn test_committee_code_required_by_letter_type() {
    let f = fixture();
    let mut req = request(&[]);
    req.letter_type = "ST".into();
    let letter = f.engine.submit(req, at(24)).await.unwrap();

    let err = f.engine.approve(&letter.id, "head", at(26)).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));

    let mut req = request(&[]);
    req.letter_type = "ST".into();
    req.committee_code = Some("PPDB".into());
    req.unit_code = "MIJ".into();
    let letter = f.engine.submit(req, at(24)).await.unwrap();
    let outcome = f.engine.approve(&letter.id, "head", at(26)).await.unwrap();
    assert_eq!(outcome.letter_number, "001/ST/Pan.PPDB/MIJ/XI/2025");
}

#[tokio::test]
async fn test_manual_format_code() {
    let f = fixture();
    let mut req = request(&[]);
    req.letter_type = "manual".into();
    req.manual_format_code = Some("SP".into());
    let letter = f.engine.submit(req, at(24)).await.unwrap();
    let outcome = f.engine.approve(&letter.id, "head", at(26)).await.unwrap();
    assert_eq!(outcome.letter_number, "001/SP/KB/MIJ/XI/2025");
}

#[tokio::test]
async fn test_unknown_approver_and_letter() {
    let f = fixture();
    let mut req = request(&[]);
    req.approver_id = "nobody".into();
    let err = f.engine.submit(req, at(24)).await.unwrap_err();
    assert!(matches!(err, WorkflowError::PersonNotFound(ref id) if id == "nobody"));

    let err = f.engine.paraf("missing", "rev-1", at(24)).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_missing_subject_is_validation_error() {
    let f = fixture();
    let mut req = request(&[]);
    req.subject = "  ".into();
    let err = f.engine.submit(req, at(24)).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));
}
