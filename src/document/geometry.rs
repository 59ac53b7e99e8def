//! Mapping preview-space placements onto PDF page space.
//!
//! Placements are captured on a preview canvas `reference_width` pixels wide
//! with the origin at the top-left. PDF user space has its origin at the
//! bottom-left of the MediaBox.

use crate::letter::models::OverlayPlacement;

/// Reference width used when the client sends none, or an implausible one.
pub const DEFAULT_REFERENCE_WIDTH: f64 = 600.0;
/// Reference widths at or below this are treated as missing.
pub const MIN_REFERENCE_WIDTH: f64 = 50.0;
/// Box side used when a placement has no size.
pub const DEFAULT_BOX_SIZE: f64 = 80.0;

pub const MIN_NUMBER_FONT_SIZE: f64 = 8.0;
pub const MAX_NUMBER_FONT_SIZE: f64 = 72.0;
const NUMBER_FONT_RATIO: f64 = 0.65;
const NUMBER_BASELINE_INSET: f64 = 0.2;

/// A page's MediaBox in PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PageBox {
    pub fn sized(width: f64, height: f64) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
        }
    }
}

/// A rectangle in PDF user space, origin bottom-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PdfRect {
    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }
}

pub fn effective_reference_width(render_width: Option<f64>) -> f64 {
    match render_width {
        Some(w) if w.is_finite() && w > MIN_REFERENCE_WIDTH => w,
        _ => DEFAULT_REFERENCE_WIDTH,
    }
}

/// Scale a placement by `page.width / reference_width` and flip its y axis.
/// Returns `None` when any resulting coordinate is not finite.
pub fn map_placement(
    placement: &OverlayPlacement,
    page: PageBox,
    reference_width: f64,
) -> Option<PdfRect> {
    let scale = page.width / reference_width;
    let width = placement.w.unwrap_or(DEFAULT_BOX_SIZE) * scale;
    let height = placement.h.unwrap_or(DEFAULT_BOX_SIZE) * scale;
    let x = page.x + placement.x * scale;
    let y = page.y + page.height - placement.y * scale - height;

    let rect = PdfRect {
        x,
        y,
        width,
        height,
    };
    rect.is_finite().then_some(rect)
}

/// Font size for a number stamped into a box `box_height` points tall.
pub fn number_font_size(box_height: f64) -> f64 {
    (box_height * NUMBER_FONT_RATIO)
        .floor()
        .clamp(MIN_NUMBER_FONT_SIZE, MAX_NUMBER_FONT_SIZE)
}

/// Baseline that roughly centres a single text line in `rect`.
pub fn number_baseline(rect: &PdfRect) -> f64 {
    rect.y + rect.height * NUMBER_BASELINE_INSET
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::letter::models::OverlayKind;

    fn placement(x: f64, y: f64, w: f64, h: f64) -> OverlayPlacement {
        OverlayPlacement {
            page_index: 0,
            kind: OverlayKind::Qr,
            x,
            y,
            w: Some(w),
            h: Some(h),
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_reference_width_fallback() {
        assert_eq!(effective_reference_width(None), 600.0);
        assert_eq!(effective_reference_width(Some(50.0)), 600.0);
        assert_eq!(effective_reference_width(Some(f64::NAN)), 600.0);
        assert_eq!(effective_reference_width(Some(800.0)), 800.0);
    }

    #[test]
    fn test_scale_by_page_width_over_reference() {
        let page = PageBox::sized(612.0, 792.0);
        let rect = map_placement(&placement(100.0, 50.0, 80.0, 40.0), page, 600.0).unwrap();
        let s = 612.0 / 600.0;
        assert!(close(rect.x, 100.0 * s));
        assert!(close(rect.width, 80.0 * s));
        assert!(close(rect.height, 40.0 * s));
        assert!(close(rect.y, 792.0 - 50.0 * s - 40.0 * s));
    }

    #[test]
    fn test_reference_width_invariance() {
        let page = PageBox::sized(595.0, 842.0);
        let a = map_placement(&placement(120.0, 300.0, 80.0, 80.0), page, 600.0).unwrap();
        let b = map_placement(&placement(240.0, 600.0, 160.0, 160.0), page, 1200.0).unwrap();
        assert!(close(a.x, b.x) && close(a.y, b.y));
        assert!(close(a.width, b.width) && close(a.height, b.height));
    }

    #[test]
    fn test_y_flip_top_and_bottom() {
        let page = PageBox::sized(600.0, 900.0);
        let top = map_placement(&placement(0.0, 0.0, 80.0, 80.0), page, 600.0).unwrap();
        assert!(close(top.y, 900.0 - 80.0));

        let bottom = map_placement(&placement(0.0, 900.0 - 80.0, 80.0, 80.0), page, 600.0).unwrap();
        assert!(close(bottom.y, 0.0));
    }

    #[test]
    fn test_media_box_origin_is_respected() {
        let page = PageBox {
            x: 10.0,
            y: 20.0,
            width: 600.0,
            height: 900.0,
        };
        let rect = map_placement(&placement(0.0, 0.0, 80.0, 80.0), page, 600.0).unwrap();
        assert!(close(rect.x, 10.0));
        assert!(close(rect.y, 20.0 + 900.0 - 80.0));
    }

    #[test]
    fn test_missing_size_defaults_to_80() {
        let mut p = placement(0.0, 0.0, 0.0, 0.0);
        p.w = None;
        p.h = None;
        let rect = map_placement(&p, PageBox::sized(600.0, 900.0), 600.0).unwrap();
        assert!(close(rect.width, 80.0) && close(rect.height, 80.0));
    }

    #[test]
    fn test_non_finite_is_skipped() {
        let page = PageBox::sized(600.0, 900.0);
        assert!(map_placement(&placement(f64::MAX, 0.0, 80.0, 80.0), page, 1e-300).is_none());
        assert!(map_placement(&placement(f64::INFINITY, 0.0, 80.0, 80.0), page, 600.0).is_none());
    }

    #[test]
    fn test_number_font_size_clamped() {
        assert_eq!(number_font_size(20.0), 13.0);
        assert_eq!(number_font_size(5.0), 8.0);
        assert_eq!(number_font_size(500.0), 72.0);
    }
}
