//! Field validation for submitted letters.
//!
//! Messages are in Indonesian because they are shown to the letter's maker
//! as-is.

use std::fmt;

use base64::Engine as _;

use crate::document::pdf::strip_data_uri;
use crate::letter::models::{CreationMode, SubmitLetterRequest};

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn empty_field(field: &str, label: &str) -> Self {
        Self::new(field, format!("{} tidak boleh kosong", label)).with_suggestion(format!(
            "Mohon isi {} dengan data yang valid",
            label.to_lowercase()
        ))
    }

    pub fn invalid_pdf(field: &str) -> Self {
        Self::new(field, "Berkas bukan PDF yang valid")
            .with_suggestion("Unggah ulang dokumen dalam format PDF")
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.field, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, ". {}", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Default)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn add(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn to_message(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn into_result(self) -> Result<(), String> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self.to_message())
        }
    }
}

pub fn validate_required(value: &str, field: &str, label: &str, errors: &mut ValidationErrors) {
    if value.trim().is_empty() {
        errors.add(ValidationError::empty_field(field, label));
    }
}

/// Check that a base64 or data-URI payload decodes to something starting
/// with the PDF signature.
pub fn validate_pdf_payload(value: &str, field: &str, errors: &mut ValidationErrors) {
    let encoded = strip_data_uri(value);
    if encoded.trim().is_empty() {
        errors.add(ValidationError::empty_field(field, "Dokumen PDF"));
        return;
    }
    let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    match base64::engine::general_purpose::STANDARD.decode(cleaned) {
        Ok(bytes) if bytes.starts_with(b"%PDF") => {}
        _ => errors.add(ValidationError::invalid_pdf(field)),
    }
}

pub fn validate_submission(req: &SubmitLetterRequest) -> Result<(), String> {
    let mut errors = ValidationErrors::new();

    validate_required(&req.subject, "subject", "Perihal", &mut errors);
    validate_required(&req.unit_code, "unit_code", "Kode Unit", &mut errors);
    validate_required(&req.letter_type, "letter_type", "Jenis Surat", &mut errors);
    validate_required(&req.maker_id, "maker_id", "Pembuat", &mut errors);
    validate_required(&req.approver_id, "approver_id", "Penandatangan", &mut errors);

    if req.mode == CreationMode::Upload {
        match &req.upload {
            Some(upload) => validate_pdf_payload(&upload.file_base64, "upload.file_base64", &mut errors),
            None => errors.add(ValidationError::empty_field("upload", "Dokumen PDF")),
        }
    }

    if req.reviewer_ids.iter().any(|r| r.trim().is_empty()) {
        errors.add(ValidationError::new("reviewer_ids", "ID pemaraf tidak boleh kosong"));
    }

    errors.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::letter::models::UploadedSource;

    fn request() -> SubmitLetterRequest {
        SubmitLetterRequest {
            maker_id: "m".into(),
            approver_id: "a".into(),
            unit_code: "KB".into(),
            letter_type: "SK".into(),
            subject: "Undangan".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_web_submission() {
        assert!(validate_submission(&request()).is_ok());
    }

    #[test]
    fn test_missing_subject_is_reported() {
        let mut req = request();
        req.subject = "   ".into();
        let err = validate_submission(&req).unwrap_err();
        assert!(err.contains("[subject] Perihal tidak boleh kosong"));
    }

    #[test]
    fn test_upload_requires_pdf_signature() {
        let mut req = request();
        req.mode = CreationMode::Upload;
        req.upload = Some(UploadedSource {
            file_base64: base64::engine::general_purpose::STANDARD.encode(b"hello"),
            placements: vec![],
            render_width: None,
        });
        assert!(validate_submission(&req).unwrap_err().contains("upload.file_base64"));

        req.upload = Some(UploadedSource {
            file_base64: format!(
                "data:application/pdf;base64,{}",
                base64::engine::general_purpose::STANDARD.encode(b"%PDF-1.7 rest")
            ),
            placements: vec![],
            render_width: None,
        });
        assert!(validate_submission(&req).is_ok());
    }

    #[test]
    fn test_errors_accumulate() {
        let req = SubmitLetterRequest::default();
        let mut errors = ValidationErrors::new();
        validate_required(&req.subject, "subject", "Perihal", &mut errors);
        validate_required(&req.unit_code, "unit_code", "Kode Unit", &mut errors);
        assert_eq!(errors.len(), 2);
    }
}
