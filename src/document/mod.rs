//! Document generation: rendering web-authored letters and stamping uploaded
//! PDFs, plus the shared attachment merger.
//!
//! - `renderer` / `engine` - Typst template rendering with shrink-to-fit
//! - `stamper` - QR, number and caption overlays on an existing PDF
//! - `merge` - appending attachment PDFs
//! - `geometry`, `layout`, `markup`, `metrics`, `qr`, `pdf` - building blocks

pub mod common;
pub mod engine;
pub mod geometry;
pub mod layout;
pub mod markup;
pub mod merge;
pub mod metrics;
pub mod pdf;
pub mod qr;
pub mod renderer;
pub mod stamper;

pub use engine::TypstRenderEngine;
pub use renderer::{RenderRequest, TemplateRenderer};
pub use stamper::{OverlayStamper, StampJob, StampReport, StampedDocument};

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

use crate::calendar::format_indonesian_date;
use crate::letter::models::{CreationMode, LetterDraft};
use crate::workflow::numbering::PREVIEW_STAMP_NUMBER;
use common::download_filename;
use merge::append_to_bytes;
use qr::load_logo;
use renderer::display_number;

/// Printed on approved letters next to the QR code.
pub const DISCLAIMER: &str = "Dokumen ini telah ditandatangani secara elektronik dan dapat diverifikasi keasliannya melalui pindai QR Code.";

/// Verification id used for web previews. Never a real letter.
pub const PREVIEW_ID: &str = "PREVIEW";
/// Verification id used for upload previews. Never a real letter.
pub const PREVIEW_QR_ID: &str = "PREVIEW_QR";

const LOGO_FILE: &str = "logo.png";
const FONTS_DIR: &str = "fonts";

/// Ids that only ever appear in draft renders.
pub fn is_preview_id(id: &str) -> bool {
    id == PREVIEW_ID || id == PREVIEW_QR_ID
}

/// Errors that can occur during document generation.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("source document is empty")]
    EmptySource,
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("invalid PDF: {0}")]
    InvalidPdf(String),
    #[error("letter subject is required")]
    MissingSubject,
    #[error("failed to load Typst template: {0}")]
    TemplateIo(#[source] std::io::Error),
    #[error("failed to create temporary directory: {0}")]
    TempDir(#[source] std::io::Error),
    #[error("failed to write Typst source: {0}")]
    WriteSource(#[source] std::io::Error),
    #[error("Typst CLI execution failed: {0}")]
    RenderIo(#[source] std::io::Error),
    #[error("Typst CLI exited with status {code}: {stderr}")]
    RenderExit { code: i32, stderr: String },
    #[error("failed to read generated PDF: {0}")]
    ReadOutput(#[source] std::io::Error),
    #[error("QR generation failed: {0}")]
    Qr(String),
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("PDF structure error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("failed to write PDF: {0}")]
    Save(#[source] std::io::Error),
}

/// Result of a successful document generation.
#[derive(Debug)]
pub struct GeneratedDocument {
    pub filename: String,
    pub pdf: Vec<u8>,
    pub tanggal: String,
    /// Present for uploaded documents.
    pub stamp_report: Option<StampReport>,
}

#[derive(Debug, Clone)]
pub struct DocumentSettings {
    pub assets_dir: PathBuf,
    pub typst_bin: PathBuf,
    pub verify_base_url: String,
    pub place_name: String,
}

/// Picks the renderer or the stamper for a letter and finishes the document.
pub struct DocumentService {
    renderer: TemplateRenderer,
    stamper: OverlayStamper,
    verify_base_url: String,
}

impl DocumentService {
    pub fn new(settings: &DocumentSettings) -> Result<Self, DocumentError> {
        let logo = load_logo(&settings.assets_dir.join(LOGO_FILE));
        let engine = TypstRenderEngine::new(
            settings.typst_bin.clone(),
            Some(settings.assets_dir.join(FONTS_DIR)),
        );
        let renderer = TemplateRenderer::new(
            &settings.assets_dir,
            engine,
            logo.clone(),
            settings.place_name.clone(),
        )?;

        Ok(Self {
            renderer,
            stamper: OverlayStamper::new(logo),
            verify_base_url: settings.verify_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn verification_url(&self, letter_id: &str) -> String {
        format!("{}/verify/{}", self.verify_base_url, letter_id)
    }

    /// The current rendering of a stored letter: final once approved, a
    /// draft with the placeholder number and no QR before that.
    pub fn render_letter(
        &self,
        letter: &LetterDraft,
        date: NaiveDate,
    ) -> Result<GeneratedDocument, DocumentError> {
        let approved = letter.is_approved();
        let verification_url = approved.then(|| self.verification_url(&letter.id));
        let number = display_number(approved, letter.letter_number.as_deref());

        match letter.mode {
            CreationMode::Web => {
                self.render_web(letter, approved, number, verification_url.as_deref(), date)
            }
            CreationMode::Upload => {
                self.render_upload(letter, approved, number, verification_url.as_deref(), date)
            }
        }
    }

    /// A draft render of a letter that has not been stored.
    pub fn render_preview(
        &self,
        letter: &LetterDraft,
        date: NaiveDate,
    ) -> Result<GeneratedDocument, DocumentError> {
        let url = self.verification_url(PREVIEW_ID);
        match letter.mode {
            CreationMode::Web => self.render_web(letter, false, display_number(false, None), None, date),
            CreationMode::Upload => {
                self.render_upload(letter, false, PREVIEW_STAMP_NUMBER, Some(&url), date)
            }
        }
    }

    fn render_web(
        &self,
        letter: &LetterDraft,
        approved: bool,
        number: &str,
        verification_url: Option<&str>,
        date: NaiveDate,
    ) -> Result<GeneratedDocument, DocumentError> {
        let pdf = self.renderer.render(&RenderRequest {
            letter,
            approved,
            letter_number: Some(number),
            verification_url,
            date,
        })?;
        let (pdf, report) = append_to_bytes(pdf, &letter.attachments)?;
        if report.skipped > 0 {
            log::warn!(
                "Letter {}: {} attachment(s) skipped",
                letter.id,
                report.skipped
            );
        }

        Ok(GeneratedDocument {
            filename: download_filename(&letter.subject),
            pdf,
            tanggal: format_indonesian_date(date),
            stamp_report: None,
        })
    }

    fn render_upload(
        &self,
        letter: &LetterDraft,
        approved: bool,
        number: &str,
        verification_url: Option<&str>,
        date: NaiveDate,
    ) -> Result<GeneratedDocument, DocumentError> {
        let upload = letter.upload.as_ref().ok_or(DocumentError::EmptySource)?;
        let paraf = letter.approved_reviewer_names();
        let stamped = self.stamper.stamp(&StampJob {
            source: &upload.file_base64,
            letter_number: number,
            verification_url,
            placements: &upload.placements,
            render_width: upload.render_width,
            attachments: &letter.attachments,
            paraf: &paraf,
            approved,
        })?;

        Ok(GeneratedDocument {
            filename: download_filename(&letter.subject),
            pdf: stamped.pdf,
            tanggal: format_indonesian_date(date),
            stamp_report: Some(stamped.report),
        })
    }
}
