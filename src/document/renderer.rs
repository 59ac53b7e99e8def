//! Template renderer for letters authored in the web editor.
//!
//! The letter is laid out by the `surat_dinas.typ` template. This module
//! picks the font size with the shrink-to-fit estimator, turns the body
//! markup into Typst content and writes the entry source that calls the
//! template.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use chrono::NaiveDate;
use image::{DynamicImage, ImageReader};

use super::common::{escape_typst_string, typst_str};
use super::engine::{BundleFile, TypstRenderEngine};
use super::layout::{page_width_pt, shrink_to_fit, FitResult, LayoutInput};
use super::markup::{parse_markup, Block, Run};
use super::qr::{encode_png, render_qr_or_skip, TEMPLATE_QR_SIZE};
use super::{DocumentError, DISCLAIMER};
use crate::calendar::{format_dual_date, DualDate};
use crate::letter::models::LetterDraft;
use crate::workflow::numbering::DRAFT_NUMBER_PLACEHOLDER;

pub const TEMPLATE_FILE: &str = "surat_dinas.typ";
const KOP_FILE: &str = "kop.png";
const FOOTER_FILE: &str = "footer.png";
const QR_FILE: &str = "qr.png";

/// Letterhead or footer artwork.
#[derive(Debug, Clone)]
struct Artwork {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
}

impl Artwork {
    fn load(path: &Path) -> Option<Self> {
        let bytes = fs::read(path).ok()?;
        let (width, height) = ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .ok()?
            .into_dimensions()
            .map_err(|e| log::warn!("Ignoring unreadable artwork {}: {}", path.display(), e))
            .ok()?;
        Some(Self {
            bytes,
            width,
            height,
        })
    }

    /// Height in points when stretched across the full page width.
    fn full_width_height(&self) -> f64 {
        if self.width == 0 {
            return 0.0;
        }
        page_width_pt() * self.height as f64 / self.width as f64
    }
}

/// One letter to render.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub letter: &'a LetterDraft,
    pub approved: bool,
    /// Ignored unless `approved`.
    pub letter_number: Option<&'a str>,
    /// QR payload; only drawn when approved.
    pub verification_url: Option<&'a str>,
    pub date: NaiveDate,
}

pub struct TemplateRenderer {
    template: String,
    engine: TypstRenderEngine,
    kop: Option<Artwork>,
    footer: Option<Artwork>,
    logo: Option<DynamicImage>,
    place_name: String,
}

impl TemplateRenderer {
    /// Load the template and artwork from `assets_dir`. The template is
    /// required; artwork that is missing is simply left out.
    pub fn new(
        assets_dir: &Path,
        engine: TypstRenderEngine,
        logo: Option<DynamicImage>,
        place_name: impl Into<String>,
    ) -> Result<Self, DocumentError> {
        let template_path = assets_dir.join(TEMPLATE_FILE);
        let template = fs::read_to_string(&template_path).map_err(DocumentError::TemplateIo)?;

        let kop = Artwork::load(&assets_dir.join(KOP_FILE));
        let footer = Artwork::load(&assets_dir.join(FOOTER_FILE));
        if kop.is_none() {
            log::info!("No letterhead artwork in {}", assets_dir.display());
        }

        Ok(Self {
            template,
            engine,
            kop,
            footer,
            logo,
            place_name: place_name.into(),
        })
    }

    pub fn render(&self, request: &RenderRequest<'_>) -> Result<Vec<u8>, DocumentError> {
        let letter = request.letter;
        if letter.subject.trim().is_empty() {
            return Err(DocumentError::MissingSubject);
        }

        let blocks = parse_markup(&letter.body);
        let paraf = letter.approved_reviewer_names();
        let fit = shrink_to_fit(&LayoutInput {
            header_height: self.kop.as_ref().map(Artwork::full_width_height).unwrap_or(0.0),
            subject: &letter.subject,
            recipient_title: &letter.recipient_title,
            recipient_name: &letter.recipient_name,
            blocks: &blocks,
            cc: &letter.cc,
            signer_title: &letter.approver.title,
            signer_name: &letter.approver.name,
            paraf: &paraf,
            approved: request.approved,
        });
        if !fit.fits {
            log::warn!(
                "Letter {} still estimated at {:.0}pt at {}pt, rendering at the floor size",
                letter.id,
                fit.estimated_height,
                fit.font_size
            );
        } else {
            log::debug!(
                "Letter {} fits at {}pt after {} step(s)",
                letter.id,
                fit.font_size,
                fit.iterations
            );
        }

        let mut files = vec![BundleFile::new(TEMPLATE_FILE, self.template.as_bytes())];
        if let Some(kop) = &self.kop {
            files.push(BundleFile::new(KOP_FILE, kop.bytes.clone()));
        }
        if let Some(footer) = &self.footer {
            files.push(BundleFile::new(FOOTER_FILE, footer.bytes.clone()));
        }

        let qr_png = match (request.approved, request.verification_url) {
            (true, Some(url)) => render_qr_or_skip(url, TEMPLATE_QR_SIZE, self.logo.as_ref())
                .map(|img| encode_png(&img))
                .transpose()
                .unwrap_or_else(|e| {
                    log::warn!("QR could not be encoded: {}", e);
                    None
                }),
            _ => None,
        };
        let has_qr = qr_png.is_some();
        if let Some(png) = qr_png {
            files.push(BundleFile::new(QR_FILE, png));
        }

        let source = entry_source(&SourceParams {
            letter,
            blocks: &blocks,
            paraf: &paraf,
            fit: &fit,
            date: format_dual_date(request.date),
            place_name: &self.place_name,
            number: display_number(request.approved, request.letter_number),
            has_kop: self.kop.is_some(),
            has_footer: self.footer.is_some(),
            has_qr,
            approved: request.approved,
        });

        self.engine.render(&source, &files)
    }
}

/// The number printed in the letter: the assigned number once approved,
/// the draft placeholder otherwise.
pub fn display_number<'a>(approved: bool, letter_number: Option<&'a str>) -> &'a str {
    match letter_number {
        Some(number) if approved && !number.trim().is_empty() => number,
        _ => DRAFT_NUMBER_PLACEHOLDER,
    }
}

/// Value of the "Lampiran" row.
pub fn attachment_label(count: usize) -> &'static str {
    if count > 0 {
        "1 (satu) Berkas"
    } else {
        "-"
    }
}

struct SourceParams<'a> {
    letter: &'a LetterDraft,
    blocks: &'a [Block],
    paraf: &'a [String],
    fit: &'a FitResult,
    date: DualDate,
    place_name: &'a str,
    number: &'a str,
    has_kop: bool,
    has_footer: bool,
    has_qr: bool,
    approved: bool,
}

fn optional_file(present: bool, name: &str) -> String {
    if present {
        typst_str(name)
    } else {
        "none".to_string()
    }
}

/// A Typst array literal; single-element arrays need the trailing comma.
fn typst_array(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|i| typst_str(i)).collect();
    match quoted.len() {
        0 => "()".to_string(),
        1 => format!("({},)", quoted[0]),
        _ => format!("({})", quoted.join(", ")),
    }
}

fn entry_source(p: &SourceParams<'_>) -> String {
    let letter = p.letter;
    format!(
        r#"#import "{template}": surat_dinas

#surat_dinas(
  base-size: {size}pt,
  kop: {kop},
  footer: {footer},
  place-name: {place},
  hijri: ({hijri_date}, {hijri_year}),
  masehi: ({masehi_date}, {masehi_year}),
  nomor: {nomor},
  lampiran: {lampiran},
  perihal: {perihal},
  tujuan-jabatan: {tujuan_jabatan},
  tujuan-nama: {tujuan_nama},
  body: [
{body}
  ],
  tembusan: {tembusan},
  signer-title: {signer_title},
  signer-name: {signer_name},
  signer-id: {signer_id},
  qr: {qr},
  paraf: {paraf},
  approved: {approved},
  disclaimer: {disclaimer},
)
"#,
        template = TEMPLATE_FILE,
        size = p.fit.font_size,
        kop = optional_file(p.has_kop, KOP_FILE),
        footer = optional_file(p.has_footer, FOOTER_FILE),
        place = typst_str(p.place_name),
        hijri_date = typst_str(&p.date.hijri.date),
        hijri_year = typst_str(&p.date.hijri.year),
        masehi_date = typst_str(&p.date.gregorian.date),
        masehi_year = typst_str(&p.date.gregorian.year),
        nomor = typst_str(p.number),
        lampiran = typst_str(attachment_label(letter.attachments.len())),
        perihal = typst_str(&letter.subject),
        tujuan_jabatan = typst_str(&letter.recipient_title),
        tujuan_nama = typst_str(&letter.recipient_name),
        body = body_markup(p.blocks),
        tembusan = typst_array(&letter.cc),
        signer_title = typst_str(&letter.approver.title),
        signer_name = typst_str(&letter.approver.name),
        signer_id = typst_str(non_empty_or_dash(&letter.approver.employee_id)),
        qr = optional_file(p.has_qr, QR_FILE),
        paraf = typst_array(p.paraf),
        approved = p.approved,
        disclaimer = typst_str(DISCLAIMER),
    )
}

fn non_empty_or_dash(value: &str) -> &str {
    if value.trim().is_empty() {
        "-"
    } else {
        value
    }
}

fn run_markup(run: &Run) -> String {
    let mut expr = format!("\"{}\"", escape_typst_string(&run.text));
    if run.underline {
        expr = format!("underline({expr})");
    }
    if run.italic {
        expr = format!("emph({expr})");
    }
    if run.bold {
        expr = format!("strong({expr})");
    }
    format!("#{expr}")
}

fn runs_markup(runs: &[Run]) -> String {
    runs.iter().map(run_markup).collect()
}

/// Typst markup for the body. All text goes through string literals so
/// nothing in it is interpreted as markup.
pub fn body_markup(blocks: &[Block]) -> String {
    let mut out = String::new();
    let mut previous_was_item = false;

    for block in blocks {
        let is_item = matches!(block, Block::ListItem { .. });
        if !out.is_empty() {
            out.push_str(if is_item && previous_was_item { "\n" } else { "\n\n" });
        }
        match block {
            Block::Paragraph(runs) => out.push_str(&runs_markup(runs)),
            Block::ListItem {
                ordered,
                number,
                depth,
                runs,
            } => {
                out.push_str(&"  ".repeat(*depth));
                if *ordered {
                    out.push_str(&format!("{number}. "));
                } else {
                    out.push_str("- ");
                }
                out.push_str(&runs_markup(runs));
            }
        }
        previous_was_item = is_item;
    }
    out
}
