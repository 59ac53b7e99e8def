//! Page geometry of the rendered letter and the shrink-to-fit pass.
//!
//! The height of the laid-out letter is estimated from the parsed body and
//! Helvetica metrics. When it exceeds the safe height the base font size is
//! stepped down until it fits or reaches the floor; the chosen size is then
//! handed to the template.

use super::markup::{Block, Run};
use super::metrics::text_width;

const PT_PER_MM: f64 = 72.0 / 25.4;

pub const PAGE_WIDTH_MM: f64 = 215.0;
pub const PAGE_HEIGHT_MM: f64 = 330.0;
pub const SIDE_PADDING_MM: f64 = 25.0;
pub const BOTTOM_PADDING_MM: f64 = 30.0;
pub const TOP_PADDING_PT: f64 = 4.0;

pub const BASE_FONT_SIZE: f64 = 12.0;
pub const MIN_FONT_SIZE: f64 = 9.0;
pub const FONT_STEP: f64 = 0.5;
/// (BASE_FONT_SIZE - MIN_FONT_SIZE) / FONT_STEP
pub const MAX_SHRINK_STEPS: usize = 6;

/// Tallest the content may be, letterhead and bottom padding included,
/// before it collides with the footer artwork.
pub const SAFE_CONTENT_HEIGHT_PT: f64 = 862.5;

/// Baseline-to-baseline distance as a multiple of the font size. Matches the
/// template's `leading: 0.65em` over a 0.7em cap height.
pub const LINE_PITCH: f64 = 1.35;
/// Space between body paragraphs, in em. Matches `par(spacing: ...)`.
pub const PARAGRAPH_SPACING: f64 = 0.8;
/// First-line indent of body paragraphs.
pub const FIRST_LINE_INDENT_PT: f64 = 30.0;
/// Extra left indent per list level.
pub const LIST_INDENT_PT: f64 = 24.0;

const BLOCK_GAP_PT: f64 = 11.0;
const META_LABEL_WIDTH_MM: f64 = 26.0;
const SIGNATURE_GAP_PT: f64 = 15.0;
const CC_SPACER_PT: f64 = 94.0;
const SIGNATURE_BOX_PT: f64 = 64.0;
const COLUMN_GUTTER_PT: f64 = 10.0;

pub fn mm(value: f64) -> f64 {
    value * PT_PER_MM
}

pub fn page_width_pt() -> f64 {
    mm(PAGE_WIDTH_MM)
}

pub fn page_height_pt() -> f64 {
    mm(PAGE_HEIGHT_MM)
}

pub fn content_width_pt() -> f64 {
    mm(PAGE_WIDTH_MM - 2.0 * SIDE_PADDING_MM)
}

/// What the estimator needs to know about a letter.
#[derive(Debug, Clone, Copy)]
pub struct LayoutInput<'a> {
    pub header_height: f64,
    pub subject: &'a str,
    pub recipient_title: &'a str,
    pub recipient_name: &'a str,
    pub blocks: &'a [Block],
    pub cc: &'a [String],
    pub signer_title: &'a str,
    pub signer_name: &'a str,
    pub paraf: &'a [String],
    pub approved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitResult {
    pub font_size: f64,
    pub estimated_height: f64,
    pub iterations: usize,
    pub fits: bool,
}

/// Largest font size, in `FONT_STEP` decrements from `BASE_FONT_SIZE`, at
/// which the letter fits; `MIN_FONT_SIZE` when nothing does.
pub fn shrink_to_fit(input: &LayoutInput<'_>) -> FitResult {
    let mut font_size = BASE_FONT_SIZE;
    let mut iterations = 0;

    loop {
        let estimated_height = estimate_height(input, font_size);
        let fits = estimated_height <= SAFE_CONTENT_HEIGHT_PT;
        if fits || iterations >= MAX_SHRINK_STEPS || font_size <= MIN_FONT_SIZE {
            return FitResult {
                font_size,
                estimated_height,
                iterations,
                fits,
            };
        }
        font_size = (font_size - FONT_STEP).max(MIN_FONT_SIZE);
        iterations += 1;
    }
}

/// Estimated height in points of the letter laid out at `size`.
pub fn estimate_height(input: &LayoutInput<'_>, size: f64) -> f64 {
    let line = size * LINE_PITCH;
    let width = content_width_pt();
    let mut height = input.header_height.max(0.0) + TOP_PADDING_PT;

    // Hijri and Gregorian rows with the rule between them.
    height += 2.0 * line + 5.0 + BLOCK_GAP_PT;

    let subject_lines = wrap_text(input.subject, size, true, width - mm(META_LABEL_WIDTH_MM), 0.0);
    height += (2 + subject_lines) as f64 * line + 0.8 * size + BLOCK_GAP_PT;

    let title_lines = wrap_text(input.recipient_title, size, true, width, 0.0);
    let name_lines = wrap_text(input.recipient_name, size, false, width, 0.0);
    height += (2 + title_lines + name_lines) as f64 * line + BLOCK_GAP_PT;

    for (i, block) in input.blocks.iter().enumerate() {
        let lines = match block {
            Block::Paragraph(runs) => {
                let indent = if i == 0 { 0.0 } else { FIRST_LINE_INDENT_PT };
                wrap_runs(runs, size, width, indent)
            }
            Block::ListItem { depth, runs, .. } => {
                let indent = LIST_INDENT_PT * (*depth + 1) as f64;
                wrap_runs(runs, size, width - indent, 0.0)
            }
        };
        height += lines as f64 * line + PARAGRAPH_SPACING * size;
    }

    let column = (width - COLUMN_GUTTER_PT) / 2.0;
    let cc_column = if input.cc.is_empty() {
        0.0
    } else {
        let cc_lines: usize = input
            .cc
            .iter()
            .map(|c| wrap_text(c, size, false, column - LIST_INDENT_PT, 0.0))
            .sum();
        CC_SPACER_PT + (1 + cc_lines) as f64 * line
    };
    let signer_lines = wrap_text(input.signer_title, size, true, column, 0.0)
        + wrap_text(input.signer_name, size, true, column, 0.0);
    let signature_column = (2 + signer_lines) as f64 * line + SIGNATURE_BOX_PT;
    height += SIGNATURE_GAP_PT + cc_column.max(signature_column);

    if !input.paraf.is_empty() {
        let caption = format!("Paraf: {}", input.paraf.join(", "));
        let small = size * 0.75;
        height += 6.0 + wrap_text(&caption, small, false, width, 0.0) as f64 * small * LINE_PITCH;
    }
    if input.approved {
        let small = size * 0.7;
        height += 4.0
            + wrap_text(super::DISCLAIMER, small, false, width, 0.0) as f64 * small * LINE_PITCH;
    }

    height + mm(BOTTOM_PADDING_MM)
}

/// Greedy word wrap of styled runs; returns the line count (at least 1).
pub fn wrap_runs(runs: &[Run], size: f64, width: f64, first_indent: f64) -> usize {
    let words = runs
        .iter()
        .flat_map(|r| r.text.split_whitespace().map(move |w| (w, r.bold)));
    wrap_words(words, size, width, first_indent)
}

fn wrap_text(text: &str, size: f64, bold: bool, width: f64, first_indent: f64) -> usize {
    wrap_words(text.split_whitespace().map(|w| (w, bold)), size, width, first_indent)
}

fn wrap_words<'a>(
    words: impl Iterator<Item = (&'a str, bool)>,
    size: f64,
    width: f64,
    first_indent: f64,
) -> usize {
    let width = width.max(size);
    let space = text_width(" ", size, false);
    let mut lines = 1;
    let mut used = first_indent;
    let mut empty = true;

    for (word, bold) in words {
        let w = text_width(word, size, bold);
        if empty {
            used += w;
            empty = false;
        } else if used + space + w <= width {
            used += space + w;
        } else {
            lines += 1;
            used = w;
        }
        // Words wider than the line overflow onto following lines.
        while used > width {
            lines += 1;
            used -= width;
        }
    }
    lines
}
