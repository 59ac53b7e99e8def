//! State transitions on a single letter.
//!
//! Every check runs before the first mutation, so a rejected transition
//! leaves the letter exactly as it was.

use chrono::{DateTime, Utc};

use super::WorkflowError;
use crate::letter::models::{LetterDraft, LetterStatus, StepStatus};

impl LetterDraft {
    /// Number of reviewers who have signed off.
    pub fn signed_reviewers(&self) -> usize {
        self.reviewers
            .iter()
            .filter(|r| r.status == StepStatus::Approved)
            .count()
    }

    pub fn ready_for_approval(&self) -> bool {
        self.current_step == self.reviewers.len()
    }

    /// Record `reviewer_id`'s paraf. Only the reviewer at `current_step` may act.
    pub fn record_paraf(&mut self, reviewer_id: &str, at: DateTime<Utc>) -> Result<(), WorkflowError> {
        if self.status != LetterStatus::Proses {
            return Err(WorkflowError::InvalidState {
                status: self.status,
                action: "paraf",
            });
        }

        let expected = self.reviewers.get(self.current_step).ok_or_else(|| {
            WorkflowError::NotReviewerTurn {
                expected: String::new(),
                actual: reviewer_id.to_string(),
            }
        })?;
        if expected.reviewer_id != reviewer_id {
            return Err(WorkflowError::NotReviewerTurn {
                expected: expected.reviewer_id.clone(),
                actual: reviewer_id.to_string(),
            });
        }

        let step = &mut self.reviewers[self.current_step];
        step.status = StepStatus::Approved;
        step.approved_at = Some(at);
        self.current_step += 1;
        self.updated_at = at;
        Ok(())
    }

    /// Check that `approver_id` may approve this letter now.
    pub fn check_approvable(&self, approver_id: &str) -> Result<(), WorkflowError> {
        if self.status != LetterStatus::Proses {
            return Err(WorkflowError::InvalidState {
                status: self.status,
                action: "approve",
            });
        }
        if !self.ready_for_approval() {
            return Err(WorkflowError::ReviewersPending {
                signed: self.current_step.min(self.reviewers.len()),
                required: self.reviewers.len(),
            });
        }
        if self.approver.id != approver_id {
            return Err(WorkflowError::NotAssignedApprover(approver_id.to_string()));
        }
        Ok(())
    }

    /// Write the issued number and mark the letter approved. Numbering fields
    /// are written once; a letter that already carries a number is refused.
    pub fn mark_approved(
        &mut self,
        number: String,
        sequence: u64,
        fiscal_year: String,
        at: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        if self.letter_number.is_some() || self.status == LetterStatus::Approved {
            return Err(WorkflowError::InvalidState {
                status: self.status,
                action: "number",
            });
        }
        self.letter_number = Some(number);
        self.sequence = Some(sequence);
        self.fiscal_year = Some(fiscal_year);
        self.status = LetterStatus::Approved;
        self.approver.status = StepStatus::Approved;
        self.approver.signed_at = Some(at);
        self.revision_note = None;
        self.updated_at = at;
        Ok(())
    }

    /// Send the letter back to its maker. The reviewer chain is left as is.
    pub fn mark_revision(
        &mut self,
        actor_id: &str,
        note: &str,
        at: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        if self.status != LetterStatus::Proses {
            return Err(WorkflowError::InvalidState {
                status: self.status,
                action: "reject",
            });
        }
        self.status = LetterStatus::Revision;
        self.approver.status = StepStatus::Revision;
        self.revision_note = Some(note.trim().to_string());
        self.rejected_by = Some(actor_id.to_string());
        self.updated_at = at;
        Ok(())
    }

    /// Put a letter back into review after the maker's edits. The chain
    /// restarts from the first reviewer.
    pub fn restart_review(&mut self, at: DateTime<Utc>) -> Result<(), WorkflowError> {
        if self.status == LetterStatus::Approved {
            return Err(WorkflowError::InvalidState {
                status: self.status,
                action: "resubmit",
            });
        }
        for step in &mut self.reviewers {
            step.status = StepStatus::Pending;
            step.approved_at = None;
        }
        self.current_step = 0;
        self.status = LetterStatus::Proses;
        self.approver.status = StepStatus::Pending;
        self.approver.signed_at = None;
        self.revision_note = None;
        self.rejected_by = None;
        self.updated_at = at;
        Ok(())
    }
}
