//! Appending attachment PDFs after a base document.
//!
//! Objects of each attachment are imported with their ids shifted past the
//! base document's highest id, then the attachment's pages are appended to
//! the base page tree. The tree is flattened into the root `Pages` node, so
//! inheritable attributes are copied onto every page first.

use std::collections::BTreeMap;

use lopdf::{Document, Object, ObjectId};

use super::pdf::{decode_pdf_payload, inherited_attribute, load_pdf, page_ids, save_pdf};
use super::DocumentError;
use crate::letter::models::AttachmentPayload;

const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"Resources", b"CropBox", b"Rotate"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub merged: usize,
    pub skipped: usize,
}

/// Append every decodable attachment to `pdf`. Returns the input unchanged
/// when there is nothing to append.
pub fn append_to_bytes(
    pdf: Vec<u8>,
    attachments: &[AttachmentPayload],
) -> Result<(Vec<u8>, MergeReport), DocumentError> {
    if attachments.is_empty() {
        return Ok((pdf, MergeReport::default()));
    }
    let mut doc = load_pdf(&pdf)?;
    let report = append_attachments(&mut doc, attachments)?;
    if report.merged == 0 {
        return Ok((pdf, report));
    }
    Ok((save_pdf(&mut doc)?, report))
}

/// Append the pages of each attachment, in order, after the pages of `base`.
/// Attachments that fail to decode or load are logged and skipped.
pub fn append_attachments(
    base: &mut Document,
    attachments: &[AttachmentPayload],
) -> Result<MergeReport, DocumentError> {
    let mut report = MergeReport::default();
    let mut loaded = Vec::with_capacity(attachments.len());

    for (index, attachment) in attachments.iter().enumerate() {
        match decode_pdf_payload(attachment.data()).and_then(|bytes| load_pdf(&bytes)) {
            Ok(doc) => loaded.push(doc),
            Err(e) => {
                log::warn!("Skipping attachment #{}: {}", index + 1, e);
                report.skipped += 1;
            }
        }
    }
    if loaded.is_empty() {
        return Ok(report);
    }

    let pages_id = root_pages_id(base)?;
    materialize_inherited(base);
    let mut kids = page_ids(base);

    for mut source in loaded {
        materialize_inherited(&mut source);
        let source_pages = page_ids(&source);
        let offset = base.max_id;

        let remapped: BTreeMap<ObjectId, Object> = source
            .objects
            .into_iter()
            .map(|(id, object)| ((id.0 + offset, id.1), remap_object_refs(object, offset)))
            .collect();
        base.objects.extend(remapped);

        kids.extend(source_pages.iter().map(|id| (id.0 + offset, id.1)));
        base.max_id = base.max_id.max(source.max_id + offset);
        report.merged += 1;
    }

    update_page_tree(base, pages_id, &kids)?;
    base.prune_objects();
    Ok(report)
}

fn root_pages_id(doc: &Document) -> Result<ObjectId, DocumentError> {
    let pages = doc.catalog()?.get(b"Pages")?.as_reference()?;
    Ok(pages)
}

/// Copy inherited attributes onto each page so pages survive re-parenting.
fn materialize_inherited(doc: &mut Document) {
    for page_id in page_ids(doc) {
        let missing: Vec<(&[u8], Object)> = INHERITABLE
            .iter()
            .filter(|key| {
                doc.get_dictionary(page_id)
                    .map(|d| !d.has(key))
                    .unwrap_or(false)
            })
            .filter_map(|key| inherited_attribute(doc, page_id, key).map(|value| (*key, value)))
            .collect();

        if let Ok(page) = doc.get_object_mut(page_id).and_then(Object::as_dict_mut) {
            for (key, value) in missing {
                page.set(key.to_vec(), value);
            }
        }
    }
}

fn remap_object_refs(obj: Object, offset: u32) -> Object {
    match obj {
        Object::Reference(id) => Object::Reference((id.0 + offset, id.1)),
        Object::Array(arr) => {
            Object::Array(arr.into_iter().map(|o| remap_object_refs(o, offset)).collect())
        }
        Object::Dictionary(mut dict) => {
            for (_, value) in dict.iter_mut() {
                *value = remap_object_refs(std::mem::replace(value, Object::Null), offset);
            }
            Object::Dictionary(dict)
        }
        Object::Stream(mut stream) => {
            for (_, value) in stream.dict.iter_mut() {
                *value = remap_object_refs(std::mem::replace(value, Object::Null), offset);
            }
            Object::Stream(stream)
        }
        other => other,
    }
}

fn update_page_tree(
    doc: &mut Document,
    pages_id: ObjectId,
    kids: &[ObjectId],
) -> Result<(), DocumentError> {
    for page_id in kids {
        doc.get_object_mut(*page_id)?
            .as_dict_mut()?
            .set("Parent", Object::Reference(pages_id));
    }

    let pages = doc.get_object_mut(pages_id)?.as_dict_mut()?;
    pages.set(
        "Kids",
        Object::Array(kids.iter().map(|id| Object::Reference(*id)).collect()),
    );
    pages.set("Count", Object::Integer(kids.len() as i64));
    Ok(())
}
