//! Stamping uploaded PDFs.
//!
//! Overlays are appended as new content streams; the original page content
//! is never rewritten. Only a source document that cannot be decoded or
//! loaded fails the job. Individual placements, the QR code and attachments
//! are skipped with a warning when they cannot be applied.

use image::DynamicImage;
use lopdf::content::Operation;
use lopdf::{Document, Object, ObjectId};

use super::geometry::{
    effective_reference_width, map_placement, number_baseline, number_font_size, PageBox, PdfRect,
};
use super::merge::append_attachments;
use super::metrics::text_width;
use super::pdf::{
    add_page_resource, add_standard_font, append_content, decode_pdf_payload, image_xobject,
    load_pdf, page_box, page_ids, save_pdf, win_ansi_string,
};
use super::qr::{render_qr_or_skip, STAMP_QR_SIZE};
use super::{DocumentError, DISCLAIMER};
use crate::letter::models::{AttachmentPayload, OverlayKind, OverlayPlacement};

const BOLD_FONT: &str = "EoHelvB";
const REGULAR_FONT: &str = "EoHelv";
const QR_IMAGE: &str = "EoQr";

const PARAF_CAPTION_SIZE: f64 = 7.0;
const PARAF_CAPTION_Y: f64 = 18.0;
const DISCLAIMER_SIZE: f64 = 6.5;
const DISCLAIMER_Y: f64 = 10.0;
const DRAFT_BANNER: &str = "DRAFT \u{2014} PREVIEW MODE";
const DRAFT_BANNER_SIZE: f64 = 24.0;
const DRAFT_BANNER_OFFSET: f64 = 40.0;

/// Everything needed to stamp one uploaded document.
#[derive(Debug, Clone, Copy)]
pub struct StampJob<'a> {
    /// Base64 or data-URI encoded source PDF.
    pub source: &'a str,
    pub letter_number: &'a str,
    /// QR payload; `None` leaves `qr` placements unstamped.
    pub verification_url: Option<&'a str>,
    pub placements: &'a [OverlayPlacement],
    pub render_width: Option<f64>,
    pub attachments: &'a [AttachmentPayload],
    pub paraf: &'a [String],
    pub approved: bool,
}

/// What was applied and what was skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StampReport {
    pub stamped: usize,
    pub skipped: usize,
    pub attachments_merged: usize,
    pub attachments_skipped: usize,
}

#[derive(Debug)]
pub struct StampedDocument {
    pub pdf: Vec<u8>,
    pub report: StampReport,
}

struct Resources {
    bold_font: ObjectId,
    regular_font: ObjectId,
    qr: Option<ObjectId>,
}

pub struct OverlayStamper {
    logo: Option<DynamicImage>,
}

impl OverlayStamper {
    pub fn new(logo: Option<DynamicImage>) -> Self {
        Self { logo }
    }

    pub fn stamp(&self, job: &StampJob<'_>) -> Result<StampedDocument, DocumentError> {
        let bytes = decode_pdf_payload(job.source)?;
        let mut doc = load_pdf(&bytes)?;
        let pages = page_ids(&doc);
        let reference_width = effective_reference_width(job.render_width);

        let resources = Resources {
            bold_font: add_standard_font(&mut doc, "Helvetica-Bold"),
            regular_font: add_standard_font(&mut doc, "Helvetica"),
            qr: job.verification_url.and_then(|url| self.embed_qr(&mut doc, url)),
        };

        let mut report = StampReport::default();
        for (index, placement) in job.placements.iter().enumerate() {
            let page_id = usize::try_from(placement.page_index)
                .ok()
                .and_then(|i| pages.get(i).copied());
            let Some(page_id) = page_id else {
                log::warn!(
                    "Placement #{} targets page {} of a {}-page document, skipping",
                    index,
                    placement.page_index,
                    pages.len()
                );
                report.skipped += 1;
                continue;
            };

            match stamp_placement(&mut doc, page_id, placement, reference_width, job, &resources) {
                Ok(true) => report.stamped += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    log::warn!("Placement #{} could not be stamped: {}", index, e);
                    report.skipped += 1;
                }
            }
        }

        if let Some(first) = pages.first().copied() {
            let result = if job.approved {
                draw_approval_captions(&mut doc, first, job.paraf, &resources)
            } else {
                draw_draft_banner(&mut doc, first, &resources)
            };
            if let Err(e) = result {
                log::warn!("First-page captions could not be drawn: {}", e);
            }
        }

        let merge = append_attachments(&mut doc, job.attachments)?;
        report.attachments_merged = merge.merged;
        report.attachments_skipped = merge.skipped;

        if report.skipped > 0 {
            log::warn!(
                "Stamped {} placement(s), skipped {}",
                report.stamped,
                report.skipped
            );
        }

        Ok(StampedDocument {
            pdf: save_pdf(&mut doc)?,
            report,
        })
    }

    fn embed_qr(&self, doc: &mut Document, url: &str) -> Option<ObjectId> {
        let image = render_qr_or_skip(url, STAMP_QR_SIZE, self.logo.as_ref())?;
        match image_xobject(&image) {
            Ok(stream) => Some(doc.add_object(stream)),
            Err(e) => {
                log::warn!("QR image could not be embedded: {}", e);
                None
            }
        }
    }
}

/// Returns `Ok(false)` when the placement was skipped without error.
fn stamp_placement(
    doc: &mut Document,
    page_id: ObjectId,
    placement: &OverlayPlacement,
    reference_width: f64,
    job: &StampJob<'_>,
    resources: &Resources,
) -> Result<bool, DocumentError> {
    let page = page_box(doc, page_id);
    let Some(rect) = map_placement(placement, page, reference_width) else {
        log::warn!(
            "Placement on page {} maps to non-finite coordinates, skipping",
            placement.page_index
        );
        return Ok(false);
    };

    match placement.kind {
        OverlayKind::Qr => {
            let Some(qr) = resources.qr else {
                log::debug!("No QR target, leaving QR box on page {} empty", placement.page_index);
                return Ok(false);
            };
            add_page_resource(doc, page_id, "XObject", QR_IMAGE, qr)?;
            append_content(doc, page_id, image_operations(QR_IMAGE, &rect))?;
        }
        OverlayKind::Number => {
            add_page_resource(doc, page_id, "Font", BOLD_FONT, resources.bold_font)?;
            let size = number_font_size(rect.height);
            let ops = text_operations(
                BOLD_FONT,
                size,
                rect.x,
                number_baseline(&rect),
                job.letter_number,
                None,
            );
            append_content(doc, page_id, ops)?;
        }
    }
    Ok(true)
}

fn draw_approval_captions(
    doc: &mut Document,
    page_id: ObjectId,
    paraf: &[String],
    resources: &Resources,
) -> Result<(), DocumentError> {
    let page = page_box(doc, page_id);
    add_page_resource(doc, page_id, "Font", REGULAR_FONT, resources.regular_font)?;

    let mut ops = Vec::new();
    if !paraf.is_empty() {
        let caption = format!("Paraf: {}", paraf.join(", "));
        ops.extend(centered_text(&page, &caption, PARAF_CAPTION_SIZE, PARAF_CAPTION_Y));
    }
    ops.extend(centered_text(&page, DISCLAIMER, DISCLAIMER_SIZE, DISCLAIMER_Y));
    append_content(doc, page_id, ops)
}

fn draw_draft_banner(
    doc: &mut Document,
    page_id: ObjectId,
    resources: &Resources,
) -> Result<(), DocumentError> {
    let page = page_box(doc, page_id);
    add_page_resource(doc, page_id, "Font", BOLD_FONT, resources.bold_font)?;

    let width = text_width(DRAFT_BANNER, DRAFT_BANNER_SIZE, true);
    let x = page.x + (page.width - width) / 2.0;
    let y = page.y + page.height - DRAFT_BANNER_OFFSET;
    let ops = text_operations(
        BOLD_FONT,
        DRAFT_BANNER_SIZE,
        x,
        y,
        DRAFT_BANNER,
        Some([1.0, 0.0, 0.0]),
    );
    append_content(doc, page_id, ops)
}

fn centered_text(page: &PageBox, text: &str, size: f64, y: f64) -> Vec<Operation> {
    let width = text_width(text, size, false);
    let x = page.x + ((page.width - width) / 2.0).max(0.0);
    text_operations(REGULAR_FONT, size, x, page.y + y, text, None)
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

fn image_operations(name: &str, rect: &PdfRect) -> Vec<Operation> {
    vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                real(rect.width),
                real(0.0),
                real(0.0),
                real(rect.height),
                real(rect.x),
                real(rect.y),
            ],
        ),
        Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
        Operation::new("Q", vec![]),
    ]
}

fn text_operations(
    font: &str,
    size: f64,
    x: f64,
    y: f64,
    text: &str,
    rgb: Option<[f64; 3]>,
) -> Vec<Operation> {
    let [r, g, b] = rgb.unwrap_or([0.0, 0.0, 0.0]);
    vec![
        Operation::new("q", vec![]),
        Operation::new("rg", vec![real(r), real(g), real(b)]),
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![Object::Name(font.as_bytes().to_vec()), real(size)]),
        Operation::new("Td", vec![real(x), real(y)]),
        Operation::new("Tj", vec![win_ansi_string(text)]),
        Operation::new("ET", vec![]),
        Operation::new("Q", vec![]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::merge::tests::{encode, fixture_pdf, page_labels};
    use lopdf::content::Content;

    fn placement(page_index: i64, kind: OverlayKind, x: f64, y: f64) -> OverlayPlacement {
        OverlayPlacement {
            page_index,
            kind,
            x,
            y,
            w: Some(100.0),
            h: Some(30.0),
        }
    }

    fn job<'a>(source: &'a str, placements: &'a [OverlayPlacement]) -> StampJob<'a> {
        StampJob {
            source,
            letter_number: "001/SK/MIJ/XI/2025",
            verification_url: Some("https://eoffice.mij.sch.id/verify/abc"),
            placements,
            render_width: Some(600.0),
            attachments: &[],
            paraf: &[],
            approved: true,
        }
    }

    fn source_pdf(pages: u32) -> String {
        encode(&fixture_pdf(pages, "Src")).data().to_string()
    }

    fn operations(pdf: &[u8], page: usize) -> Vec<Operation> {
        let mut doc = Document::load_mem(pdf).unwrap();
        doc.decompress();
        let id = page_ids(&doc)[page];
        Content::decode(&doc.get_page_content(id).unwrap())
            .unwrap()
            .operations
    }

    fn as_f64(obj: &Object) -> f64 {
        match obj {
            Object::Real(r) => *r as f64,
            Object::Integer(i) => *i as f64,
            other => panic!("not a number: {other:?}"),
        }
    }

    #[test]
    fn test_empty_source_is_fatal() {
        let stamper = OverlayStamper::new(None);
        assert!(matches!(
            stamper.stamp(&job("", &[])),
            Err(DocumentError::EmptySource)
        ));
    }

    #[test]
    fn test_number_is_drawn_at_mapped_position() {
        let source = source_pdf(1);
        let placements = [placement(0, OverlayKind::Number, 60.0, 100.0)];
        let stamped = OverlayStamper::new(None).stamp(&job(&source, &placements)).unwrap();
        assert_eq!(stamped.report.stamped, 1);

        let ops = operations(&stamped.pdf, 0);
        let td = ops
            .iter()
            .zip(ops.iter().skip(1))
            .find(|(_, next)| {
                next.operator == "Tj"
                    && matches!(&next.operands[0], Object::String(s, _) if s.starts_with(b"001/"))
            })
            .map(|(td, _)| td)
            .unwrap();
        let scale = 612.0 / 600.0;
        assert!((as_f64(&td.operands[0]) - 60.0 * scale).abs() < 0.01);
        let expected_y = 792.0 - 100.0 * scale - 30.0 * scale + 30.0 * scale * 0.2;
        assert!((as_f64(&td.operands[1]) - expected_y).abs() < 0.01);
    }

    #[test]
    fn test_qr_is_painted_with_scaled_matrix() {
        let source = source_pdf(1);
        let placements = [placement(0, OverlayKind::Qr, 0.0, 0.0)];
        let stamped = OverlayStamper::new(None).stamp(&job(&source, &placements)).unwrap();
        let ops = operations(&stamped.pdf, 0);
        let cm = ops.iter().find(|op| op.operator == "cm").unwrap();
        let scale = 612.0 / 600.0;
        assert!((as_f64(&cm.operands[0]) - 100.0 * scale).abs() < 0.01);
        assert!((as_f64(&cm.operands[5]) - (792.0 - 30.0 * scale)).abs() < 0.01);
        assert!(ops.iter().any(|op| op.operator == "Do"));
    }

    #[test]
    fn test_out_of_range_pages_are_skipped() {
        let source = source_pdf(2);
        let placements = [
            placement(5, OverlayKind::Number, 0.0, 0.0),
            placement(-1, OverlayKind::Number, 0.0, 0.0),
            placement(1, OverlayKind::Number, 0.0, 0.0),
        ];
        let stamped = OverlayStamper::new(None).stamp(&job(&source, &placements)).unwrap();
        assert_eq!(stamped.report.stamped, 1);
        assert_eq!(stamped.report.skipped, 2);
    }

    #[test]
    fn test_without_qr_target_qr_boxes_stay_empty() {
        let source = source_pdf(1);
        let placements = [placement(0, OverlayKind::Qr, 0.0, 0.0)];
        let mut j = job(&source, &placements);
        j.verification_url = None;
        let stamped = OverlayStamper::new(None).stamp(&j).unwrap();
        assert_eq!(stamped.report.stamped, 0);
        assert!(!operations(&stamped.pdf, 0).iter().any(|op| op.operator == "Do"));
    }

    #[test]
    fn test_draft_banner_is_red() {
        let source = source_pdf(1);
        let mut j = job(&source, &[]);
        j.approved = false;
        let stamped = OverlayStamper::new(None).stamp(&j).unwrap();
        let ops = operations(&stamped.pdf, 0);
        let rg = ops.iter().find(|op| op.operator == "rg").unwrap();
        assert_eq!(as_f64(&rg.operands[0]), 1.0);
        assert!(ops.iter().any(|op| {
            op.operator == "Tj"
                && matches!(&op.operands[0], Object::String(s, _) if s.starts_with(b"DRAFT \x97"))
        }));
    }

    #[test]
    fn test_approved_captions_name_reviewers() {
        let source = source_pdf(1);
        let paraf = vec!["Budi".to_string(), "Sari".to_string()];
        let mut j = job(&source, &[]);
        j.paraf = &paraf;
        let stamped = OverlayStamper::new(None).stamp(&j).unwrap();
        let texts: Vec<Vec<u8>> = operations(&stamped.pdf, 0)
            .into_iter()
            .filter(|op| op.operator == "Tj")
            .filter_map(|op| match &op.operands[0] {
                Object::String(s, _) => Some(s.clone()),
                _ => None,
            })
            .collect();
        assert!(texts.contains(&b"Paraf: Budi, Sari".to_vec()));
        assert!(texts.iter().any(|t| t.starts_with(b"Dokumen ini telah ditandatangani")));
    }

    #[test]
    fn test_attachments_are_appended_after_stamping() {
        let source = source_pdf(1);
        let attachments = vec![encode(&fixture_pdf(1, "Lamp")), AttachmentPayload::Inline(String::new())];
        let mut j = job(&source, &[]);
        j.attachments = &attachments;
        let stamped = OverlayStamper::new(None).stamp(&j).unwrap();
        assert_eq!(stamped.report.attachments_merged, 1);
        assert_eq!(stamped.report.attachments_skipped, 1);
        assert_eq!(page_labels(&stamped.pdf), vec!["Src-Page-1", "Lamp-Page-1"]);
    }
}
