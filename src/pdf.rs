//! Page-level edits of PDF documents.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use failure::Fail;
use lopdf::{Document, Object, ObjectId};
use tracing::debug;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Bound on page tree depth while looking up inherited attributes.
const MAX_TREE_DEPTH: usize = 64;

#[derive(Debug, Fail)]
pub enum PdfError {
    #[fail(display = "failed to load {:?}: {}", path, reason)]
    Load { path: PathBuf, reason: String },
    #[fail(display = "failed to save {:?}: {}", path, reason)]
    Save { path: PathBuf, reason: String },
    #[fail(display = "malformed document: {}", reason)]
    Structure { reason: String },
    #[fail(display = "rotation angle {} is not a multiple of 90 degrees", angle)]
    InvalidAngle { angle: i64 },
}

fn structure<E: ToString>(e: E) -> PdfError {
    PdfError::Structure { reason: e.to_string() }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Direction {
    /// Clockwise
    #[default]
    Cw,
    /// Counter-clockwise
    Ccw,
}

/// Clockwise rotation in `0..360` for `angle` degrees in `direction`.
pub fn rotation(direction: Direction, angle: i64) -> Result<i64, PdfError> {
    if angle % 90 != 0 {
        return Err(PdfError::InvalidAngle { angle });
    }
    let turn = angle.rem_euclid(360);
    Ok(match direction {
        Direction::Cw => turn,
        Direction::Ccw => (360 - turn) % 360,
    })
}

pub fn load(path: &Path) -> Result<Document, PdfError> {
    Document::load(path).map_err(|e| PdfError::Load {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

pub fn save(doc: &mut Document, path: &Path) -> Result<(), PdfError> {
    doc.save(path).map(drop).map_err(|e| PdfError::Save {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

pub fn page_count(doc: &Document) -> usize {
    doc.get_pages().len()
}

/// Looks `key` up on the page and then up its `Parent` chain.
fn inherited(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn pages_root(doc: &Document) -> Result<ObjectId, PdfError> {
    let catalog_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(structure)?;
    doc.get_dictionary(catalog_id)
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)
        .map_err(structure)
}

/// Rebuilds the page tree so it holds exactly the pages at `indices`
/// (zero-based), in that order.
///
/// A page listed more than once is copied into an independent page object.
/// Inherited attributes are copied onto every kept page since the pages are
/// re-parented directly under the root.
pub fn extract_pages(doc: &mut Document, indices: &[usize]) -> Result<(), PdfError> {
    let root_id = pages_root(doc)?;
    let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();

    let mut placed = HashSet::new();
    let mut kids = Vec::with_capacity(indices.len());
    for &index in indices {
        let page_id = *pages.get(index).ok_or_else(|| {
            structure(format!("page index {} is past the last of {} pages", index, pages.len()))
        })?;

        let mut page = doc.get_dictionary(page_id).map_err(structure)?.clone();
        for key in INHERITABLE {
            if !page.has(key) {
                if let Some(value) = inherited(doc, page_id, key) {
                    page.set(key, value);
                }
            }
        }
        page.set("Parent", Object::Reference(root_id));

        let id = if placed.insert(page_id) {
            doc.objects.insert(page_id, Object::Dictionary(page));
            page_id
        } else {
            doc.add_object(page)
        };
        kids.push(Object::Reference(id));
    }

    let count = kids.len() as i64;
    let root = doc
        .get_object_mut(root_id)
        .and_then(|object| object.as_dict_mut())
        .map_err(structure)?;
    root.set("Kids", Object::Array(kids));
    root.set("Count", count);

    // Outline and labels describe the old pagination.
    if let Ok(catalog_id) = doc.trailer.get(b"Root").and_then(Object::as_reference) {
        if let Ok(catalog) = doc.get_object_mut(catalog_id).and_then(|object| object.as_dict_mut()) {
            catalog.remove(b"Outlines");
            catalog.remove(b"PageLabels");
        }
    }

    let pruned = doc.prune_objects();
    debug!("kept {} page(s), pruned {} object(s)", count, pruned.len());
    Ok(())
}

/// Adds `degrees` (clockwise, multiple of 90) to the rotation of every page.
pub fn rotate_pages(doc: &mut Document, degrees: i64) -> Result<(), PdfError> {
    if degrees % 90 != 0 {
        return Err(PdfError::InvalidAngle { angle: degrees });
    }

    let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
    for page_id in pages {
        let current = inherited(doc, page_id, b"Rotate")
            .and_then(|rotate| rotate.as_i64().ok())
            .unwrap_or(0);
        let rotated = (current.rem_euclid(360) + degrees.rem_euclid(360)) % 360;

        doc.get_object_mut(page_id)
            .and_then(|object| object.as_dict_mut())
            .map_err(structure)?
            .set("Rotate", rotated);
    }
    Ok(())
}
