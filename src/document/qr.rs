//! Verification QR codes with a centred logo.

use std::io::Cursor;
use std::path::Path;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Luma, Rgba, RgbaImage, RgbImage};
use qrcode::{EcLevel, QrCode};

use super::DocumentError;

/// Side of the logo relative to the QR canvas.
pub const LOGO_RATIO: f64 = 0.23;
/// White border around the logo, in pixels at a 300px canvas.
const LOGO_PADDING_AT_300: f64 = 3.0;
/// Canvas side for QR codes stamped onto uploaded PDFs.
pub const STAMP_QR_SIZE: u32 = 300;
/// Canvas side for QR codes placed in rendered letters.
pub const TEMPLATE_QR_SIZE: u32 = 200;

/// Render `data` as a square QR code `size` pixels wide with a one-module
/// quiet zone. Error correction is at level H so the logo can cover the
/// centre without breaking decoding.
pub fn render_qr(data: &str, size: u32, logo: Option<&DynamicImage>) -> Result<RgbImage, DocumentError> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::H)
        .map_err(|e| DocumentError::Qr(e.to_string()))?;

    let modules = code.width() as u32 + 2;
    let module_px = (size / modules).max(1);
    let symbol = code
        .render::<Luma<u8>>()
        .quiet_zone(false)
        .module_dimensions(module_px, module_px)
        .build();

    let side = size.max(symbol.width() + 2 * module_px);
    let mut canvas = RgbaImage::from_pixel(side, side, Rgba([255, 255, 255, 255]));
    let offset = ((side - symbol.width()) / 2) as i64;
    let symbol = DynamicImage::ImageLuma8(symbol).to_rgba8();
    imageops::overlay(&mut canvas, &symbol, offset, offset);

    let mut canvas = if side != size {
        imageops::resize(&canvas, size, size, FilterType::Nearest)
    } else {
        canvas
    };

    if let Some(logo) = logo {
        overlay_logo(&mut canvas, logo);
    }

    Ok(DynamicImage::ImageRgba8(canvas).to_rgb8())
}

/// Paint `logo` in the centre of `canvas` over a white padding square.
pub fn overlay_logo(canvas: &mut RgbaImage, logo: &DynamicImage) {
    let size = canvas.width().min(canvas.height());
    let logo_side = ((size as f64) * LOGO_RATIO).round() as u32;
    if logo_side == 0 {
        return;
    }
    let padding = ((size as f64) * LOGO_PADDING_AT_300 / 300.0).ceil() as u32;
    let pos = (size - logo_side) / 2;

    let backing_side = logo_side + 2 * padding;
    let backing = RgbaImage::from_pixel(backing_side, backing_side, Rgba([255, 255, 255, 255]));
    let backing_pos = pos.saturating_sub(padding) as i64;
    imageops::overlay(canvas, &backing, backing_pos, backing_pos);

    let scaled = logo
        .resize_exact(logo_side, logo_side, FilterType::Lanczos3)
        .to_rgba8();
    imageops::overlay(canvas, &scaled, pos as i64, pos as i64);
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, DocumentError> {
    let mut buffer = Vec::new();
    image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
    Ok(buffer)
}

/// Load the QR logo; a missing or unreadable file means no logo.
pub fn load_logo(path: &Path) -> Option<DynamicImage> {
    if !path.exists() {
        log::debug!("QR logo not found at {}", path.display());
        return None;
    }
    match std::fs::read(path).map_err(|e| e.to_string()).and_then(|bytes| {
        image::load_from_memory(&bytes).map_err(|e| e.to_string())
    }) {
        Ok(image) => Some(image),
        Err(e) => {
            log::warn!("Ignoring unreadable QR logo {}: {}", path.display(), e);
            None
        }
    }
}

/// Render a QR code, falling back to no logo and then to no QR at all.
/// QR failures never abort a document.
pub fn render_qr_or_skip(data: &str, size: u32, logo: Option<&DynamicImage>) -> Option<RgbImage> {
    match render_qr(data, size, logo) {
        Ok(image) => Some(image),
        Err(e) if logo.is_some() => {
            log::warn!("QR with logo failed ({}), retrying without logo", e);
            render_qr(data, size, None)
                .map_err(|e| log::warn!("QR generation failed: {}", e))
                .ok()
        }
        Err(e) => {
            log::warn!("QR generation failed: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qr_has_requested_size() {
        let img = render_qr("https://eoffice.mij.sch.id/verify/abc", 300, None).unwrap();
        assert_eq!(img.dimensions(), (300, 300));
        // Quiet zone corner is white.
        assert_eq!(img.get_pixel(0, 0).0, [255, 255, 255]);
    }

    #[test]
    fn test_qr_contains_dark_modules() {
        let img = render_qr("PREVIEW", 200, None).unwrap();
        assert!(img.pixels().any(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn test_logo_is_centred_on_white_backing() {
        let logo = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let img = render_qr("https://eoffice.mij.sch.id/verify/abc", 300, Some(&logo)).unwrap();
        assert_eq!(img.get_pixel(150, 150).0, [255, 0, 0]);

        let logo_side = (300.0 * LOGO_RATIO).round() as u32;
        let pos = (300 - logo_side) / 2;
        // Inside the padding ring, just outside the logo.
        assert_eq!(img.get_pixel(pos - 1, 150).0, [255, 255, 255]);
    }

    #[test]
    fn test_png_encoding_has_signature() {
        let img = render_qr("x", 50, None).unwrap();
        let png = encode_png(&img).unwrap();
        assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[test]
    fn test_missing_logo_is_none() {
        assert!(load_logo(Path::new("/definitely/not/here.png")).is_none());
    }
}
