//! Approval engine: submission, paraf, approval with numbering, rejection.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use super::directory::{IdentityDirectory, LetterTypeDirectory, PersonProfile};
use super::numbering::{resolve_format, NumberingEngine};
use super::store::LetterRepository;
use super::validation::validate_submission;
use super::WorkflowError;
use crate::calendar::local_date;
use crate::letter::models::{
    CreationMode, LetterDraft, LetterStatus, Maker, ReviewerStep, Signatory, StepStatus,
    SubmitLetterRequest, UPLOAD_BODY_MARKER,
};

#[derive(Debug, Clone)]
pub struct ApprovalOutcome {
    pub letter_number: String,
    pub sequence: u64,
    pub letter: LetterDraft,
}

pub struct ApprovalEngine {
    letters: Arc<dyn LetterRepository>,
    people: Arc<dyn IdentityDirectory>,
    letter_types: Arc<dyn LetterTypeDirectory>,
    numbering: NumberingEngine,
    root_unit_code: String,
    utc_offset_hours: i32,
    // Serialises load-modify-save per letter within this process.
    letter_locks: LockMap,
}

impl ApprovalEngine {
    pub fn new(
        letters: Arc<dyn LetterRepository>,
        people: Arc<dyn IdentityDirectory>,
        letter_types: Arc<dyn LetterTypeDirectory>,
        numbering: NumberingEngine,
        root_unit_code: impl Into<String>,
        utc_offset_hours: i32,
    ) -> Self {
        Self {
            letters,
            people,
            letter_types,
            numbering,
            root_unit_code: root_unit_code.into(),
            utc_offset_hours,
            letter_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root_unit_code(&self) -> &str {
        &self.root_unit_code
    }

    pub fn utc_offset_hours(&self) -> i32 {
        self.utc_offset_hours
    }

    pub async fn get(&self, letter_id: &str) -> Result<LetterDraft, WorkflowError> {
        self.letters
            .get(letter_id)
            .await?
            .ok_or_else(|| WorkflowError::LetterNotFound(letter_id.to_string()))
    }

    pub async fn person(&self, person_id: &str) -> Result<PersonProfile, WorkflowError> {
        self.people
            .find_person(person_id)
            .await?
            .ok_or_else(|| WorkflowError::PersonNotFound(person_id.to_string()))
    }

    /// Signatory snapshot for `person_id`.
    pub async fn signatory(&self, person_id: &str) -> Result<Signatory, WorkflowError> {
        let profile = self.person(person_id).await?;
        Ok(Signatory {
            id: profile.id.clone(),
            name: profile.display_name(),
            title: profile.display_title(),
            employee_id: profile.signer_id(),
            status: StepStatus::Pending,
            signed_at: None,
        })
    }

    /// Create a letter, or update one sent back for revision. Either way the
    /// letter enters review at the first reviewer.
    pub async fn submit(
        &self,
        req: SubmitLetterRequest,
        now: DateTime<Utc>,
    ) -> Result<LetterDraft, WorkflowError> {
        validate_submission(&req).map_err(WorkflowError::Validation)?;

        let maker_profile = self.person(&req.maker_id).await?;
        let maker = Maker {
            id: maker_profile.id.clone(),
            unit: maker_profile.unit_code.clone(),
            name: maker_profile.display_name(),
            title: maker_profile.display_title(),
        };
        let approver = self.signatory(&req.approver_id).await?;

        let mut reviewers = Vec::with_capacity(req.reviewer_ids.len());
        for reviewer_id in &req.reviewer_ids {
            let profile = self.person(reviewer_id).await?;
            reviewers.push(ReviewerStep::pending(reviewer_id.clone(), profile.display_name()));
        }

        let body = match req.mode {
            CreationMode::Upload => UPLOAD_BODY_MARKER.to_string(),
            CreationMode::Web => req.body,
        };

        let (mut letter, _guard) = match req.id.as_deref().filter(|id| !id.trim().is_empty()) {
            Some(id) => {
                let guard = self.lock(id).await;
                let existing = self.get(id).await?;
                (existing, Some(guard))
            }
            None => {
                let id = Uuid::new_v4().to_string();
                let letter = LetterDraft {
                    id,
                    status: LetterStatus::Proses,
                    created_at: now,
                    updated_at: now,
                    ..LetterDraft::default()
                };
                (letter, None)
            }
        };

        letter.unit_code = req.unit_code.trim().to_string();
        letter.letter_type = req.letter_type.trim().to_string();
        letter.manual_format_code = req.manual_format_code;
        letter.committee_code = req.committee_code;
        letter.subject = req.subject.trim().to_string();
        letter.recipient_title = req.recipient_title;
        letter.recipient_name = req.recipient_name;
        letter.body = body;
        letter.cc = req.cc.into_iter().filter(|c| !c.trim().is_empty()).collect();
        letter.attachments = req.attachments;
        letter.mode = req.mode;
        letter.upload = req.upload;
        letter.maker = maker;
        letter.approver = approver;
        letter.reviewers = reviewers;
        letter.restart_review(now)?;

        self.letters.save(&letter).await?;
        log::info!(
            "Letter {} submitted by {} with {} reviewer(s)",
            letter.id,
            letter.maker.id,
            letter.reviewers.len()
        );
        Ok(letter)
    }

    pub async fn paraf(
        &self,
        letter_id: &str,
        reviewer_id: &str,
        now: DateTime<Utc>,
    ) -> Result<LetterDraft, WorkflowError> {
        let _guard = self.lock(letter_id).await;
        let mut letter = self.get(letter_id).await?;
        letter.record_paraf(reviewer_id, now)?;
        self.letters.save(&letter).await?;
        log::info!(
            "Paraf by {} on letter {} ({}/{})",
            reviewer_id,
            letter_id,
            letter.current_step,
            letter.reviewers.len()
        );
        Ok(letter)
    }

    /// Approve a letter and assign its number.
    ///
    /// Every precondition is checked before the counter is touched, so a
    /// refused approval never consumes a sequence value.
    pub async fn approve(
        &self,
        letter_id: &str,
        approver_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ApprovalOutcome, WorkflowError> {
        let _guard = self.lock(letter_id).await;
        let mut letter = self.get(letter_id).await?;
        letter.check_approvable(approver_id)?;

        let format = resolve_format(&letter, self.letter_types.as_ref()).await?;
        let date = local_date(now, self.utc_offset_hours);
        let (number, fiscal) = self
            .numbering
            .issue(&letter.unit_code, &format, &self.root_unit_code, date)
            .await?;

        let formatted = number.to_string();
        letter.mark_approved(formatted.clone(), number.sequence, fiscal.bucket(), now)?;
        self.letters.save(&letter).await?;

        log::info!("Letter {} approved as {}", letter_id, formatted);
        Ok(ApprovalOutcome {
            letter_number: formatted,
            sequence: number.sequence,
            letter,
        })
    }

    pub async fn reject(
        &self,
        letter_id: &str,
        actor_id: &str,
        note: &str,
        now: DateTime<Utc>,
    ) -> Result<LetterDraft, WorkflowError> {
        let _guard = self.lock(letter_id).await;
        let mut letter = self.get(letter_id).await?;
        letter.mark_revision(actor_id, note, now)?;
        self.letters.save(&letter).await?;
        log::info!("Letter {} returned for revision by {}", letter_id, actor_id);
        Ok(letter)
    }

    async fn lock(&self, letter_id: &str) -> LetterGuard<'_> {
        let lock = self
            .letter_locks
            .lock()
            .entry(letter_id.to_string())
            .or_default()
            .clone();
        let mut guard = LetterGuard {
            locks: &self.letter_locks,
            held: None,
        };
        guard.held = Some(lock.lock_owned().await);
        guard
    }
}

type LockMap = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Holds one letter's lock. On release, every entry nobody else holds or
/// waits on is dropped from the map, so it stays as small as the set of
/// letters in flight.
struct LetterGuard<'a> {
    locks: &'a LockMap,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for LetterGuard<'_> {
    fn drop(&mut self) {
        self.held.take();
        self.locks.lock().retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}
