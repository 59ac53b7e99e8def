use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body text stored for letters authored by uploading an existing PDF.
pub const UPLOAD_BODY_MARKER: &str = "Dokumen Upload PDF (Lihat File Asli)";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum LetterStatus {
    /// Never persisted; used for preview renders only.
    #[default]
    Draft,
    Proses,
    Revision,
    Approved,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CreationMode {
    #[default]
    Web,
    Upload,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepStatus {
    #[default]
    Pending,
    Approved,
    Revision,
}

/// One entry in the paraf chain.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
pub struct ReviewerStep {
    pub reviewer_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
}

impl ReviewerStep {
    pub fn pending(reviewer_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            reviewer_id: reviewer_id.into(),
            name: name.into(),
            status: StepStatus::Pending,
            approved_at: None,
        }
    }
}

/// Display snapshot of the person who drafted the letter.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, ToSchema)]
pub struct Maker {
    pub id: String,
    pub unit: String,
    pub name: String,
    pub title: String,
}

/// Final signatory of the letter.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, ToSchema)]
pub struct Signatory {
    pub id: String,
    pub name: String,
    pub title: String,
    /// Printed as "NIP. ..." under the signature.
    #[serde(default)]
    pub employee_id: String,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default)]
    pub signed_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OverlayKind {
    Qr,
    #[serde(alias = "nomor")]
    Number,
}

/// A stamp position captured on the on-screen preview.
///
/// Coordinates are in preview pixels at the reference render width, origin
/// top-left. Missing sizes default to an 80px box.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
pub struct OverlayPlacement {
    #[serde(alias = "pageIndex")]
    pub page_index: i64,
    #[serde(alias = "type")]
    pub kind: OverlayKind,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub w: Option<f64>,
    #[serde(default)]
    pub h: Option<f64>,
}

/// An attachment PDF, either a bare base64/data-URI string or an object
/// carrying it under `data`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(untagged)]
pub enum AttachmentPayload {
    Inline(String),
    Wrapped {
        data: String,
        #[serde(default)]
        name: Option<String>,
    },
}

impl AttachmentPayload {
    pub fn data(&self) -> &str {
        match self {
            Self::Inline(data) => data,
            Self::Wrapped { data, .. } => data,
        }
    }
}

/// Source PDF and stamp positions for upload-mode letters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
pub struct UploadedSource {
    #[serde(alias = "fileBase64")]
    pub file_base64: String,
    #[serde(default, alias = "stamps")]
    pub placements: Vec<OverlayPlacement>,
    #[serde(default, alias = "renderWidth")]
    pub render_width: Option<f64>,
}

/// A letter from first draft to approval.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, ToSchema)]
pub struct LetterDraft {
    pub id: String,
    pub unit_code: String,
    /// Letter-type code, or `manual` when `manual_format_code` is used.
    pub letter_type: String,
    #[serde(default)]
    pub manual_format_code: Option<String>,
    #[serde(default)]
    pub committee_code: Option<String>,
    pub subject: String,
    #[serde(default)]
    pub recipient_title: String,
    #[serde(default)]
    pub recipient_name: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentPayload>,
    #[serde(default)]
    pub mode: CreationMode,
    #[serde(default)]
    pub upload: Option<UploadedSource>,
    pub maker: Maker,
    pub approver: Signatory,
    #[serde(default)]
    pub reviewers: Vec<ReviewerStep>,
    #[serde(default)]
    pub current_step: usize,
    pub status: LetterStatus,
    #[serde(default)]
    pub letter_number: Option<String>,
    #[serde(default)]
    pub sequence: Option<u64>,
    #[serde(default)]
    pub fiscal_year: Option<String>,
    #[serde(default)]
    pub revision_note: Option<String>,
    #[serde(default)]
    pub rejected_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LetterDraft {
    pub fn is_approved(&self) -> bool {
        self.status == LetterStatus::Approved
    }

    /// Names of reviewers whose paraf is recorded, in chain order.
    pub fn approved_reviewer_names(&self) -> Vec<String> {
        self.reviewers
            .iter()
            .filter(|r| r.status == StepStatus::Approved)
            .map(|r| {
                if r.name.trim().is_empty() {
                    r.reviewer_id.clone()
                } else {
                    r.name.clone()
                }
            })
            .collect()
    }
}

/// Create or resubmit a letter.
#[derive(Deserialize, Debug, Clone, Default, ToSchema)]
pub struct SubmitLetterRequest {
    /// Existing letter id when resubmitting.
    #[serde(default)]
    pub id: Option<String>,
    pub maker_id: String,
    pub approver_id: String,
    #[serde(default)]
    pub reviewer_ids: Vec<String>,
    pub unit_code: String,
    pub letter_type: String,
    #[serde(default)]
    pub manual_format_code: Option<String>,
    #[serde(default)]
    pub committee_code: Option<String>,
    pub subject: String,
    #[serde(default)]
    pub recipient_title: String,
    #[serde(default)]
    pub recipient_name: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentPayload>,
    #[serde(default)]
    pub mode: CreationMode,
    #[serde(default)]
    pub upload: Option<UploadedSource>,
}

/// Render a letter that has not been stored.
#[derive(Deserialize, Debug, Clone, Default, ToSchema)]
pub struct PreviewRequest {
    #[serde(default)]
    pub approver_id: Option<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub recipient_title: String,
    #[serde(default)]
    pub recipient_name: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentPayload>,
    #[serde(default)]
    pub mode: CreationMode,
    #[serde(default)]
    pub upload: Option<UploadedSource>,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct ParafRequest {
    pub reviewer_id: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct ApproveRequest {
    pub approver_id: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct RejectRequest {
    pub actor_id: String,
    #[serde(default)]
    pub note: String,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct SubmitResponse {
    pub success: bool,
    pub id: String,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ApproveResponse {
    pub success: bool,
    pub nomor: String,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct LetterResponse {
    pub success: bool,
    pub data: LetterDraft,
}

/// Publicly visible facts about a letter, served to QR scans.
#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct VerificationRecord {
    pub id: String,
    pub letter_number: Option<String>,
    pub status: LetterStatus,
    pub created_at: DateTime<Utc>,
    pub subject: String,
    pub recipient_title: String,
    pub recipient_name: String,
    pub maker_unit: String,
    pub approver_name: String,
    pub approver_title: String,
    pub signed_at: Option<DateTime<Utc>>,
    pub body_snippet: String,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct VerificationResponse {
    pub success: bool,
    pub data: VerificationRecord,
}
