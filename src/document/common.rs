//! Shared helpers for document generation.

use std::path::Path;

const MAX_FILENAME_STEM: usize = 30;
const FALLBACK_FILENAME: &str = "surat.pdf";

/// Escape special characters for Typst string literals.
pub fn escape_typst_string(value: &str) -> String {
    value
        .replace('\\', r"\\")
        .replace('"', r#"\""#)
        .replace('\r', "")
        .replace('\n', r"\n")
}

/// A quoted Typst string literal.
pub fn typst_str(value: &str) -> String {
    format!("\"{}\"", escape_typst_string(value))
}

/// Download name derived from a letter subject: only `[A-Za-z0-9-_ ]`
/// survive, the result is trimmed and cut to 30 characters.
pub fn download_filename(subject: &str) -> String {
    let cleaned: String = subject
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ' '))
        .collect();
    let stem: String = cleaned.trim().chars().take(MAX_FILENAME_STEM).collect();
    let stem = stem.trim_end();

    if stem.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        format!("{stem}.pdf")
    }
}

/// Bundled assets directory (template, letterhead artwork, fonts).
pub fn get_static_dir() -> &'static Path {
    Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/static"))
}
