//! Letter numbers: format resolution, counter keys, and sequence allocation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};

use super::directory::LetterTypeDirectory;
use super::store::CounterStore;
use super::{StoreError, WorkflowError};
use crate::calendar::{to_roman, FiscalYear};
use crate::letter::models::LetterDraft;

/// Number shown on every letter that has not been approved yet.
pub const DRAFT_NUMBER_PLACEHOLDER: &str = "Draft/......../........";
/// Number stamped onto upload-mode previews.
pub const PREVIEW_STAMP_NUMBER: &str = "Draft/Preview/...";
/// `letter_type` value selecting the manual format code.
pub const MANUAL_LETTER_TYPE: &str = "manual";

const BASE_BACKOFF_MS: u64 = 5;
const MAX_BACKOFF_MS: u64 = 200;

/// Format code for a letter, with the committee segment if its type needs one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFormat {
    pub code: String,
    pub committee: Option<String>,
}

impl ResolvedFormat {
    pub fn plain(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            committee: None,
        }
    }

    /// "SK" or "ST/Pan.PPDB".
    pub fn segment(&self) -> String {
        match &self.committee {
            Some(c) => format!("{}/Pan.{}", self.code, c),
            None => self.code.clone(),
        }
    }
}

/// Pick the format code for `letter`: the manual code when one is given,
/// otherwise the letter type's code.
pub async fn resolve_format(
    letter: &LetterDraft,
    letter_types: &dyn LetterTypeDirectory,
) -> Result<ResolvedFormat, WorkflowError> {
    let manual = letter
        .manual_format_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    if letter.letter_type.eq_ignore_ascii_case(MANUAL_LETTER_TYPE) || manual.is_some() {
        return manual
            .map(ResolvedFormat::plain)
            .ok_or_else(|| WorkflowError::Validation("manual format code is empty".into()));
    }

    let letter_type = letter_types
        .find_letter_type(&letter.letter_type)
        .await?
        .ok_or_else(|| WorkflowError::UnknownLetterType(letter.letter_type.clone()))?;

    let committee = if letter_type.requires_committee_code {
        let code = letter
            .committee_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                WorkflowError::Validation(format!(
                    "letter type '{}' requires a committee code",
                    letter_type.code
                ))
            })?;
        Some(code.to_string())
    } else {
        None
    };

    Ok(ResolvedFormat {
        code: letter_type.format_code,
        committee,
    })
}

/// Identity of one sequence counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    pub unit: String,
    pub format: String,
    pub fiscal_year: String,
}

impl CounterKey {
    pub fn new(unit: &str, format: &str, fiscal_year: &str) -> Self {
        Self {
            unit: sanitize_key_segment(unit),
            format: sanitize_key_segment(format),
            fiscal_year: sanitize_key_segment(fiscal_year),
        }
    }

    pub fn id(&self) -> String {
        format!("count_{}_{}_{}", self.unit, self.format, self.fiscal_year)
    }
}

/// Replace anything outside `[A-Za-z0-9._-]` so slashes in format codes
/// cannot leak into the key.
pub fn sanitize_key_segment(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// An issued letter number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LetterNumber {
    pub sequence: u64,
    pub format: ResolvedFormat,
    pub unit_code: String,
    pub root_code: String,
    pub month: u32,
    pub year: i32,
}

impl fmt::Display for LetterNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}/{}", self.sequence, self.format.segment())?;
        let unit = self.unit_code.trim();
        if !unit.is_empty() && !unit.eq_ignore_ascii_case(self.root_code.trim()) {
            write!(f, "/{}", unit)?;
        }
        write!(
            f,
            "/{}/{}/{}",
            self.root_code,
            to_roman(self.month),
            self.year
        )
    }
}

/// Allocates sequence values, retrying whole attempts on contention.
pub struct NumberingEngine {
    counters: Arc<dyn CounterStore>,
    max_attempts: u32,
}

impl NumberingEngine {
    pub fn new(counters: Arc<dyn CounterStore>, max_attempts: u32) -> Self {
        Self {
            counters,
            max_attempts: max_attempts.max(1),
        }
    }

    pub async fn next_sequence(&self, key: &CounterKey) -> Result<u64, WorkflowError> {
        for attempt in 1..=self.max_attempts {
            match self.counters.try_increment(key).await {
                Ok(value) => return Ok(value),
                Err(StoreError::Conflict) => {
                    log::debug!(
                        "Counter {} contended (attempt {}/{})",
                        key.id(),
                        attempt,
                        self.max_attempts
                    );
                    let backoff = BASE_BACKOFF_MS
                        .saturating_mul(1u64 << attempt.min(6))
                        .min(MAX_BACKOFF_MS);
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        log::warn!(
            "Counter {} still contended after {} attempts",
            key.id(),
            self.max_attempts
        );
        Err(WorkflowError::ContentionExhausted {
            attempts: self.max_attempts,
        })
    }

    /// Allocate the next number for `unit`/`format` on local date `date`.
    pub async fn issue(
        &self,
        unit_code: &str,
        format: &ResolvedFormat,
        root_code: &str,
        date: NaiveDate,
    ) -> Result<(LetterNumber, FiscalYear), WorkflowError> {
        let fiscal = FiscalYear::containing(date);
        let key = CounterKey::new(unit_code, &format.segment(), &fiscal.bucket());
        let sequence = self.next_sequence(&key).await?;

        Ok((
            LetterNumber {
                sequence,
                format: format.clone(),
                unit_code: unit_code.to_string(),
                root_code: root_code.to_string(),
                month: date.month(),
                year: date.year(),
            },
            fiscal,
        ))
    }
}
