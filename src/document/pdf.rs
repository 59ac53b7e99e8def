//! Low-level `lopdf` helpers shared by the stamper and the merger.

use std::io::Write;

use base64::Engine as _;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::RgbImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use super::geometry::PageBox;
use super::DocumentError;

const MAX_TREE_DEPTH: usize = 32;
const FALLBACK_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Strip a `data:...;base64,` prefix, if present.
pub fn strip_data_uri(value: &str) -> &str {
    let trimmed = value.trim();
    if trimmed.starts_with("data:") {
        match trimmed.find(',') {
            Some(idx) => &trimmed[idx + 1..],
            None => "",
        }
    } else {
        trimmed
    }
}

/// Decode a base64 (or data-URI) payload that must contain a PDF.
pub fn decode_pdf_payload(value: &str) -> Result<Vec<u8>, DocumentError> {
    let encoded: String = strip_data_uri(value)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if encoded.is_empty() {
        return Err(DocumentError::EmptySource);
    }
    let bytes = base64::engine::general_purpose::STANDARD.decode(encoded)?;
    if !bytes.starts_with(b"%PDF") {
        return Err(DocumentError::InvalidPdf(
            "missing %PDF signature".to_string(),
        ));
    }
    Ok(bytes)
}

pub fn load_pdf(bytes: &[u8]) -> Result<Document, DocumentError> {
    if bytes.is_empty() {
        return Err(DocumentError::EmptySource);
    }
    let doc = Document::load_mem(bytes).map_err(|e| DocumentError::InvalidPdf(e.to_string()))?;
    if doc.get_pages().is_empty() {
        return Err(DocumentError::InvalidPdf("document has no pages".to_string()));
    }
    Ok(doc)
}

pub fn save_pdf(doc: &mut Document) -> Result<Vec<u8>, DocumentError> {
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).map_err(DocumentError::Save)?;
    Ok(buffer)
}

/// Page ids in page order.
pub fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().values().copied().collect()
}

/// Look up `key` on a page, walking up `Parent` links for inheritable
/// attributes (MediaBox, Resources, CropBox, Rotate).
pub fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let dict = doc.get_dictionary(current).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
    }
    None
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

fn as_number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// The page's MediaBox, normalised so width and height are positive.
pub fn page_box(doc: &Document, page_id: ObjectId) -> PageBox {
    let values = inherited_attribute(doc, page_id, b"MediaBox").and_then(|obj| {
        match resolve(doc, &obj) {
            Object::Array(arr) if arr.len() == 4 => {
                let nums: Vec<f64> = arr
                    .iter()
                    .filter_map(|o| as_number(resolve(doc, o)))
                    .collect();
                (nums.len() == 4).then(|| [nums[0], nums[1], nums[2], nums[3]])
            }
            _ => None,
        }
    });
    let [x0, y0, x1, y1] = values.unwrap_or(FALLBACK_MEDIA_BOX);
    PageBox {
        x: x0.min(x1),
        y: y0.min(y1),
        width: (x1 - x0).abs(),
        height: (y1 - y0).abs(),
    }
}

/// The resources a page actually uses, as an owned dictionary.
fn effective_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    match inherited_attribute(doc, page_id, b"Resources") {
        Some(Object::Dictionary(dict)) => dict,
        Some(Object::Reference(id)) => doc
            .get_dictionary(id)
            .cloned()
            .unwrap_or_else(|_| Dictionary::new()),
        _ => Dictionary::new(),
    }
}

/// Register `target` as `/category/name` in the page's own Resources. Inherited
/// or shared resource dictionaries are copied onto the page first, so other
/// pages are left untouched.
pub fn add_page_resource(
    doc: &mut Document,
    page_id: ObjectId,
    category: &str,
    name: &str,
    target: ObjectId,
) -> Result<(), DocumentError> {
    let mut resources = effective_resources(doc, page_id);
    let mut entries = match resources.get(category.as_bytes()) {
        Ok(Object::Dictionary(dict)) => dict.clone(),
        Ok(Object::Reference(id)) => doc
            .get_dictionary(*id)
            .cloned()
            .unwrap_or_else(|_| Dictionary::new()),
        _ => Dictionary::new(),
    };
    entries.set(name, Object::Reference(target));
    resources.set(category, Object::Dictionary(entries));

    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Resources", Object::Dictionary(resources));
    Ok(())
}

/// Append drawing operations after the page's existing content. The existing
/// content is bracketed in `q`/`Q` so whatever graphics state it leaves behind
/// does not leak into the overlay.
pub fn append_content(
    doc: &mut Document,
    page_id: ObjectId,
    operations: Vec<Operation>,
) -> Result<(), DocumentError> {
    let encoded = Content { operations }.encode()?;
    let overlay_id = doc.add_object(Stream::new(Dictionary::new(), encoded));

    let existing = doc.get_dictionary(page_id)?.get(b"Contents").ok().cloned();
    let mut contents = match existing {
        Some(Object::Reference(id)) => match doc.get_object(id) {
            Ok(Object::Array(arr)) => arr.clone(),
            _ => vec![Object::Reference(id)],
        },
        Some(Object::Array(arr)) => arr,
        _ => Vec::new(),
    };

    if !contents.is_empty() {
        let save_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        let restore_id = doc.add_object(Stream::new(Dictionary::new(), b"\nQ\n".to_vec()));
        contents.insert(0, Object::Reference(save_id));
        contents.push(Object::Reference(restore_id));
    }
    contents.push(Object::Reference(overlay_id));

    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Contents", Object::Array(contents));
    Ok(())
}

/// Add one of the 14 standard Type1 fonts with WinAnsi encoding.
pub fn add_standard_font(doc: &mut Document, base_font: &str) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base_font,
        "Encoding" => "WinAnsiEncoding",
    })
}

/// An RGB image XObject, Flate-compressed.
pub fn image_xobject(image: &RgbImage) -> Result<Stream, DocumentError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(image.as_raw()).map_err(DocumentError::Save)?;
    let compressed = encoder.finish().map_err(DocumentError::Save)?;

    let mut stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => image.width() as i64,
            "Height" => image.height() as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        },
        compressed,
    );
    stream.allows_compression = false;
    Ok(stream)
}

/// Encode text for a WinAnsi-encoded standard font. Characters outside the
/// code page become `?`.
pub fn win_ansi_string(text: &str) -> Object {
    let bytes = text
        .chars()
        .map(|c| match c {
            '\u{20AC}' => 0x80,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            c if (c as u32) < 0x80 => c as u8,
            c if (0xA0..=0xFF).contains(&(c as u32)) => c as u32 as u8,
            _ => b'?',
        })
        .collect();
    Object::String(bytes, StringFormat::Literal)
}
