//! Letter workflow: reviewer chain, approval, and letter numbering.
//!
//! - `lifecycle` - pure state transitions on a `LetterDraft`
//! - `numbering` - format resolution and transactional sequence allocation
//! - `approval` - the engine tying lookups, transitions and numbering together
//! - `store` / `directory` - collaborator traits with in-memory implementations
//! - `validation` - field-level validation of submitted drafts

pub mod approval;
pub mod directory;
pub mod lifecycle;
pub mod numbering;
pub mod store;
pub mod validation;

pub use approval::{ApprovalEngine, ApprovalOutcome};
pub use directory::{
    CachedLetterTypes, CachedPeople, IdentityDirectory, InMemoryDirectory, LetterType,
    LetterTypeDirectory, PersonProfile,
};
pub use numbering::{CounterKey, LetterNumber, NumberingEngine, ResolvedFormat};
pub use store::{CounterStore, InMemoryCounterStore, InMemoryLetterRepository, LetterRepository};

use crate::letter::models::LetterStatus;
use thiserror::Error;

/// Failures reported by persistence collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A concurrent writer won; the whole operation may be retried.
    #[error("concurrent update conflict")]
    Conflict,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("letter '{0}' not found")]
    LetterNotFound(String),
    #[error("person '{0}' not found")]
    PersonNotFound(String),
    #[error("letter type '{0}' not found")]
    UnknownLetterType(String),
    #[error("{signed} of {required} reviewers have signed off")]
    ReviewersPending { signed: usize, required: usize },
    #[error("it is not '{actual}' turn to paraf (expected '{expected}')")]
    NotReviewerTurn { expected: String, actual: String },
    #[error("'{0}' is not the assigned approver")]
    NotAssignedApprover(String),
    #[error("cannot {action} a letter in status {status:?}")]
    InvalidState {
        status: LetterStatus,
        action: &'static str,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("counter still contended after {attempts} attempts")]
    ContentionExhausted { attempts: u32 },
    #[error("{0}")]
    Validation(String),
}

impl WorkflowError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::LetterNotFound(_) | Self::PersonNotFound(_) | Self::UnknownLetterType(_)
        )
    }

    /// Precondition violations: the request was well-formed but the letter is
    /// not in a state that permits it.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::ReviewersPending { .. }
                | Self::NotReviewerTurn { .. }
                | Self::NotAssignedApprover(_)
                | Self::InvalidState { .. }
        )
    }
}
