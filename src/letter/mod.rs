//! Letter API: request/response models, HTTP handlers and the public
//! verification record.

pub mod handlers;
pub mod models;

use crate::document::is_preview_id;
use crate::document::markup::strip_tags;
use models::{LetterDraft, VerificationRecord};

const SNIPPET_CHARS: usize = 150;

/// Public facts about a stored letter. Returns `None` for the preview
/// sentinels, which never name a real letter.
pub fn verification_record(letter: &LetterDraft) -> Option<VerificationRecord> {
    if is_preview_id(&letter.id) {
        return None;
    }
    Some(VerificationRecord {
        id: letter.id.clone(),
        letter_number: letter.letter_number.clone(),
        status: letter.status,
        created_at: letter.created_at,
        subject: letter.subject.clone(),
        recipient_title: letter.recipient_title.clone(),
        recipient_name: letter.recipient_name.clone(),
        maker_unit: letter.maker.unit.clone(),
        approver_name: letter.approver.name.clone(),
        approver_title: letter.approver.title.clone(),
        signed_at: letter.approver.signed_at,
        body_snippet: body_snippet(&letter.body),
    })
}

/// First characters of the body with markup removed, always followed by "...".
pub fn body_snippet(body: &str) -> String {
    let mut snippet: String = strip_tags(body).chars().take(SNIPPET_CHARS).collect();
    snippet.push_str("...");
    snippet
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::LetterStatus;

    #[test]
    fn test_snippet_strips_and_truncates() {
        let body = format!("<p>Dengan <b>hormat</b> kami,</p><p>{}</p>", "x".repeat(300));
        let snippet = body_snippet(&body);
        assert!(snippet.starts_with("Dengan hormat kami, xxx"));
        assert!(snippet.ends_with("..."));
        assert_eq!(snippet.chars().count(), SNIPPET_CHARS + 3);
    }

    #[test]
    fn test_short_body_still_gets_ellipsis() {
        assert_eq!(body_snippet("<p>Singkat</p>"), "Singkat...");
    }

    #[test]
    fn test_sentinels_have_no_record() {
        let mut letter = LetterDraft {
            id: "PREVIEW".into(),
            status: LetterStatus::Approved,
            ..LetterDraft::default()
        };
        assert!(verification_record(&letter).is_none());
        letter.id = "PREVIEW_QR".into();
        assert!(verification_record(&letter).is_none());
        letter.id = "abc".into();
        assert_eq!(verification_record(&letter).unwrap().status, LetterStatus::Approved);
    }
}
