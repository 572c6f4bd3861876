//! PDF validation and merging.
//!
//! Validation is "does it load": a file that `lopdf` can parse is treated
//! as a usable page. Merging concatenates the page trees of several
//! documents into one, keeping the input order.

use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::BTreeMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Guard against malformed, cyclic `Parent` chains.
const MAX_TREE_DEPTH: usize = 64;

/// Open `path` as a PDF and return its page count.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub fn validate(path: &Path) -> Result<usize, lopdf::Error> {
    let document = Document::load(path)?;
    let pages = document.get_pages().len();
    debug!(pages, "PDF opened");
    Ok(pages)
}

/// Copy inheritable attributes from the page's ancestors into `page`.
fn flatten_inherited(document: &Document, page: &mut Dictionary) {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;
    while let Some(parent_id) = parent {
        if depth >= MAX_TREE_DEPTH {
            break;
        }
        depth += 1;
        let Ok(node) = document.get_dictionary(parent_id) else {
            break;
        };
        for key in INHERITABLE {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key.to_vec(), value.clone());
                }
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
}

fn type_of(object: &Object) -> Option<&[u8]> {
    let dict = match object {
        Object::Dictionary(dict) => dict,
        Object::Stream(stream) => &stream.dict,
        _ => return None,
    };
    dict.get(b"Type").and_then(Object::as_name).ok()
}

/// Merge `inputs` in order into a single PDF at `output`.
///
/// The first input's catalog and root page node are kept; every page is
/// re-parented under that node. Returns the number of pages written.
///
/// # Errors
///
/// Fails without writing anything when `inputs` is empty, when an input
/// cannot be loaded, or when no page tree is found.
#[instrument(level = "info", skip_all, fields(inputs = inputs.len(), output = %output.display()))]
pub fn merge(inputs: &[PathBuf], output: &Path) -> Result<usize, Box<dyn Error>> {
    if inputs.is_empty() {
        return Err("no PDF files to merge".into());
    }

    let mut max_id = 1;
    let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for input in inputs {
        let mut document = Document::load(input)?;
        document.renumber_objects_with(max_id);
        max_id = document.max_id + 1;

        for (_, page_id) in document.get_pages() {
            let mut page = document.get_dictionary(page_id)?.clone();
            flatten_inherited(&document, &mut page);
            pages.push((page_id, page));
        }
        objects.extend(document.objects);
    }

    let mut merged = Document::with_version("1.5");
    let mut catalog: Option<(ObjectId, Dictionary)> = None;
    let mut page_root: Option<(ObjectId, Dictionary)> = None;

    for (object_id, object) in objects {
        match type_of(&object) {
            Some(b"Catalog") => {
                if catalog.is_none() {
                    catalog = Some((object_id, object.as_dict()?.clone()));
                }
            }
            Some(b"Pages") => {
                if page_root.is_none() {
                    page_root = Some((object_id, object.as_dict()?.clone()));
                }
            }
            // Pages are re-inserted below; outlines point at dropped page ids.
            Some(b"Page") | Some(b"Outlines") | Some(b"Outline") => {}
            Some(b"XRef") | Some(b"ObjStm") => {}
            _ => {
                merged.objects.insert(object_id, object);
            }
        }
    }

    let (catalog_id, mut catalog) = catalog.ok_or("no document catalog found")?;
    let (root_id, mut root) = page_root.ok_or("no page tree found")?;

    let page_count = pages.len();
    let mut kids = Vec::with_capacity(page_count);
    for (page_id, mut page) in pages {
        page.set("Parent", root_id);
        merged.objects.insert(page_id, Object::Dictionary(page));
        kids.push(Object::Reference(page_id));
    }

    root.remove(b"Parent");
    root.set("Count", page_count as i64);
    root.set("Kids", kids);
    merged.objects.insert(root_id, Object::Dictionary(root));

    catalog.set("Pages", root_id);
    catalog.remove(b"Outlines");
    merged.objects.insert(catalog_id, Object::Dictionary(catalog));
    merged.trailer.set("Root", catalog_id);

    merged.max_id = merged.objects.keys().map(|(id, _)| *id).max().unwrap_or(0);
    merged.renumber_objects();
    merged.compress();
    merged.save(output)?;

    info!(pages = page_count, "Merged PDF written");
    Ok(page_count)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use lopdf::{Document, Object, Stream, dictionary};

    /// A minimal PDF with `pages` blank pages, each drawing its index.
    pub fn sample_pdf(pages: usize) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();
        for i in 0..pages {
            let content = format!("BT /F1 12 Tf 72 720 Td (page {i}) Tj ET");
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }
        let pages_dict = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }
}
