//! Bookmark management built on top of `lopdf`.
//!
//! [`build_outline`] mirrors the body part tree into an [`Outline`] once page offsets are final;
//! [`apply_outline`] writes it into the assembled document as a nested `/Outlines` tree.

use std::collections::HashMap;

use log::debug;
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};

use crate::model::{DocumentParts, PartId};

/// Errors that can occur while embedding bookmarks into the assembled document.
#[derive(Debug)]
pub enum BookmarkError {
    /// A PDF object could not be read or updated.
    Pdf(lopdf::Error),
    /// A required catalog entry was missing from the document trailer.
    MissingCatalog,
    /// The catalog object was not a dictionary, preventing outline injection.
    InvalidCatalog,
    /// A bookmark points at a page the document does not have.
    MissingPage {
        /// Title of the bookmark whose destination is missing.
        title: String,
        /// The requested (1-indexed) page number that could not be resolved.
        page_number: usize,
    },
}

impl From<lopdf::Error> for BookmarkError {
    fn from(err: lopdf::Error) -> Self {
        Self::Pdf(err)
    }
}

impl std::fmt::Display for BookmarkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pdf(err) => write!(f, "Failed to update PDF objects: {err}"),
            Self::MissingCatalog => write!(f, "PDF catalog entry is missing"),
            Self::InvalidCatalog => write!(f, "PDF catalog entry is not a dictionary"),
            Self::MissingPage { title, page_number } => write!(
                f,
                "Bookmark '{}' refers to missing page {}",
                title, page_number
            ),
        }
    }
}

impl std::error::Error for BookmarkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Pdf(err) => Some(err),
            Self::MissingCatalog | Self::InvalidCatalog | Self::MissingPage { .. } => None,
        }
    }
}

/// A bookmark and the 1-indexed page it opens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutlineNode {
    pub title: String,
    pub page: usize,
    pub children: Vec<usize>,
}

/// Bookmark tree stored as an arena; children are indices into [`Outline::nodes`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Outline {
    nodes: Vec<OutlineNode>,
    roots: Vec<usize>,
}

impl Outline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a node as the last child of `parent` (or as the last root) and returns its index.
    pub fn push(&mut self, parent: Option<usize>, title: impl Into<String>, page: usize) -> usize {
        let index = self.nodes.len();
        self.nodes.push(OutlineNode {
            title: title.into(),
            page,
            children: Vec::new(),
        });
        match parent.and_then(|parent| self.nodes.get_mut(parent)) {
            Some(parent) => parent.children.push(index),
            None => self.roots.push(index),
        }
        index
    }

    pub fn nodes(&self) -> &[OutlineNode] {
        &self.nodes
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn node(&self, index: usize) -> Option<&OutlineNode> {
        self.nodes.get(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn descendants(&self, index: usize) -> usize {
        self.nodes[index]
            .children
            .iter()
            .map(|child| 1 + self.descendants(*child))
            .sum()
    }
}

/// Mirrors the body parts into an outline. Parts without an assigned start page are skipped.
///
/// A node opens `start_page` plus the page index of the part's own anchor (0 when layout did not
/// record it) and hangs below the node of its parent part, or at the root.
pub fn build_outline(parts: &DocumentParts) -> Outline {
    let mut outline = Outline::new();
    let mut nodes: HashMap<PartId, usize> = HashMap::new();

    for (id, part) in parts.body.iter() {
        let Some(start) = part.start_page() else {
            debug!("Part '{}' has no page offset; no bookmark", part.id());
            continue;
        };
        let page = start + part.anchor_page_index().unwrap_or(0);
        let parent = part.parent().and_then(|parent| nodes.get(&parent).copied());
        nodes.insert(id, outline.push(parent, part.name(), page));
    }

    outline
}

/// Writes `outline` into `document` as its `/Outlines` tree.
///
/// `page_ids` lists the document's page objects in order; bookmark page `n` opens
/// `page_ids[n - 1]`. The catalog is switched to `/PageMode /UseOutlines`.
pub fn apply_outline(
    document: &mut Document,
    outline: &Outline,
    page_ids: &[ObjectId],
) -> Result<(), BookmarkError> {
    if outline.is_empty() {
        return Ok(());
    }

    let catalog_id = document
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| BookmarkError::MissingCatalog)?;

    let outlines_id = document.new_object_id();
    let object_ids: Vec<ObjectId> = (0..outline.len())
        .map(|_| document.new_object_id())
        .collect();

    for (index, node) in outline.nodes().iter().enumerate() {
        let page_ref = node
            .page
            .checked_sub(1)
            .and_then(|page| page_ids.get(page))
            .copied()
            .ok_or_else(|| BookmarkError::MissingPage {
                title: node.title.clone(),
                page_number: node.page,
            })?;

        let mut dictionary = Dictionary::new();
        dictionary.set("Title", text_string(&node.title));
        dictionary.set(
            "Dest",
            Object::Array(vec![
                Object::Reference(page_ref),
                Object::Name("Fit".into()),
            ]),
        );
        if let (Some(first), Some(last)) = (node.children.first(), node.children.last()) {
            dictionary.set("First", Object::Reference(object_ids[*first]));
            dictionary.set("Last", Object::Reference(object_ids[*last]));
            dictionary.set("Count", Object::Integer(outline.descendants(index) as i64));
        }
        document
            .objects
            .insert(object_ids[index], Object::Dictionary(dictionary));
    }

    link_siblings(document, outlines_id, outline.roots(), &object_ids)?;
    for (index, node) in outline.nodes().iter().enumerate() {
        if !node.children.is_empty() {
            link_siblings(document, object_ids[index], &node.children, &object_ids)?;
        }
    }

    let mut root = Dictionary::new();
    root.set("Type", Object::Name("Outlines".into()));
    root.set("Count", Object::Integer(outline.len() as i64));
    if let (Some(first), Some(last)) = (outline.roots().first(), outline.roots().last()) {
        root.set("First", Object::Reference(object_ids[*first]));
        root.set("Last", Object::Reference(object_ids[*last]));
    }
    document.objects.insert(outlines_id, Object::Dictionary(root));

    let catalog = document
        .get_object_mut(catalog_id)
        .map_err(|_| BookmarkError::MissingCatalog)?
        .as_dict_mut()
        .map_err(|_| BookmarkError::InvalidCatalog)?;
    catalog.set("Outlines", Object::Reference(outlines_id));
    catalog.set("PageMode", Object::Name("UseOutlines".into()));

    debug!("Wrote {} bookmark(s)", outline.len());
    Ok(())
}

fn link_siblings(
    document: &mut Document,
    parent_id: ObjectId,
    siblings: &[usize],
    object_ids: &[ObjectId],
) -> Result<(), BookmarkError> {
    for (position, index) in siblings.iter().enumerate() {
        let item = document.get_object_mut(object_ids[*index])?.as_dict_mut()?;
        item.set("Parent", Object::Reference(parent_id));
        if position > 0 {
            item.set("Prev", Object::Reference(object_ids[siblings[position - 1]]));
        }
        if let Some(next) = siblings.get(position + 1) {
            item.set("Next", Object::Reference(object_ids[*next]));
        }
    }
    Ok(())
}

/// Encodes `text` as a PDF text string: a literal for ASCII, UTF-16BE with a byte order mark
/// otherwise.
pub(crate) fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::string_literal(text);
    }

    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn document_with_pages(count: usize) -> (Document, Vec<ObjectId>) {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        let page_ids: Vec<ObjectId> = (0..count)
            .map(|_| {
                document.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                })
            })
            .collect();
        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
                "Count" => count as i64,
            }),
        );
        let catalog = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        document.trailer.set("Root", catalog);
        (document, page_ids)
    }

    fn sample_outline() -> Outline {
        let mut outline = Outline::new();
        let a = outline.push(None, "A", 3);
        outline.push(Some(a), "B", 4);
        outline.push(Some(a), "C", 6);
        outline.push(None, "D", 7);
        outline
    }

    #[test]
    fn nested_outline_links_siblings_and_children() {
        let (mut document, page_ids) = document_with_pages(7);
        apply_outline(&mut document, &sample_outline(), &page_ids).unwrap();

        let catalog_id = document.trailer.get(b"Root").unwrap().as_reference().unwrap();
        let catalog = document.get_dictionary(catalog_id).unwrap();
        assert_eq!(catalog.get(b"PageMode").unwrap().as_name().unwrap(), b"UseOutlines");

        let outlines_id = catalog.get(b"Outlines").unwrap().as_reference().unwrap();
        let outlines = document.get_dictionary(outlines_id).unwrap();
        assert_eq!(outlines.get(b"Count").unwrap().as_i64().unwrap(), 4);

        let first = outlines.get(b"First").unwrap().as_reference().unwrap();
        let a = document.get_dictionary(first).unwrap();
        assert_eq!(a.get(b"Count").unwrap().as_i64().unwrap(), 2);
        let dest = a.get(b"Dest").unwrap().as_array().unwrap();
        assert_eq!(dest[0].as_reference().unwrap(), page_ids[2]);

        let b_id = a.get(b"First").unwrap().as_reference().unwrap();
        let b = document.get_dictionary(b_id).unwrap();
        assert_eq!(b.get(b"Parent").unwrap().as_reference().unwrap(), first);
        let c_id = b.get(b"Next").unwrap().as_reference().unwrap();
        assert_eq!(a.get(b"Last").unwrap().as_reference().unwrap(), c_id);

        let d_id = a.get(b"Next").unwrap().as_reference().unwrap();
        let d = document.get_dictionary(d_id).unwrap();
        assert_eq!(d.get(b"Prev").unwrap().as_reference().unwrap(), first);
        assert!(d.get(b"Next").is_err());
    }

    #[test]
    fn destination_beyond_last_page_is_an_error() {
        let (mut document, page_ids) = document_with_pages(5);
        let err = apply_outline(&mut document, &sample_outline(), &page_ids).unwrap_err();
        assert!(matches!(
            err,
            BookmarkError::MissingPage { page_number: 6, .. }
        ));
    }

    #[test]
    fn non_ascii_titles_use_utf16() {
        assert!(matches!(
            text_string("Intro"),
            Object::String(bytes, StringFormat::Literal) if bytes == b"Intro"
        ));
        match text_string("Übersicht") {
            Object::String(bytes, StringFormat::Hexadecimal) => {
                assert_eq!(&bytes[..4], &[0xFE, 0xFF, 0x00, 0xDC]);
            }
            other => panic!("unexpected object {other:?}"),
        }
    }
}
