//! The layout engine seam: turning a prepared HTML document into fixed-size pages.
//!
//! [`LayoutEngine`] is the only thing the rest of the pipeline knows about layout. The crate ships
//! [`GenpdfLayoutEngine`], which renders through `genpdf`; tests use a deterministic engine from
//! `test_support`.

mod convert;
mod engine;
mod theme;

use std::fmt;

use kuchiki::NodeRef;
use lopdf::{Document, Object, ObjectId};

use crate::model::{Anchor, Page};

pub use engine::GenpdfLayoutEngine;
pub use theme::{PageMargins, StyleRules, Theme, COVER_STRUCT_STYLESHEET, PAGE_STRUCT_STYLESHEET};

/// Errors raised while laying out a document.
#[derive(Debug)]
pub enum LayoutError {
    /// `genpdf` failed to render the document.
    Render(genpdf::error::Error),
    /// The rendered PDF could not be read back.
    Pdf(lopdf::Error),
    /// A page of the rendered PDF has no usable `MediaBox`.
    MissingMediaBox(ObjectId),
    /// The document produced no pages at all.
    NoPages,
    /// Engine specific failure.
    Engine(String),
}

impl From<genpdf::error::Error> for LayoutError {
    fn from(err: genpdf::error::Error) -> Self {
        Self::Render(err)
    }
}

impl From<lopdf::Error> for LayoutError {
    fn from(err: lopdf::Error) -> Self {
        Self::Pdf(err)
    }
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Render(err) => write!(f, "Failed to render document: {err}"),
            Self::Pdf(err) => write!(f, "Failed to read rendered PDF: {err}"),
            Self::MissingMediaBox((number, generation)) => write!(
                f,
                "Page object {} {} has no MediaBox",
                number, generation
            ),
            Self::NoPages => write!(f, "Document produced no pages"),
            Self::Engine(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for LayoutError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Render(err) => Some(err),
            Self::Pdf(err) => Some(err),
            Self::MissingMediaBox(_) | Self::NoPages | Self::Engine(_) => None,
        }
    }
}

/// Lays out prepared documents into pages.
///
/// Engines may keep expensive state (loaded fonts) across documents. Everything derived from a
/// single document (resolved styles, recorded anchors, page counters) must be dropped by
/// [`reset`](LayoutEngine::reset), which the renderer calls before every layout.
pub trait LayoutEngine {
    fn layout(&mut self, document: &NodeRef) -> Result<LaidOutDocument, LayoutError>;

    fn reset(&mut self);
}

impl<E: LayoutEngine + ?Sized> LayoutEngine for &mut E {
    fn layout(&mut self, document: &NodeRef) -> Result<LaidOutDocument, LayoutError> {
        (**self).layout(document)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

impl<E: LayoutEngine + ?Sized> LayoutEngine for Box<E> {
    fn layout(&mut self, document: &NodeRef) -> Result<LaidOutDocument, LayoutError> {
        (**self).layout(document)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// The result of laying out one document: a standalone PDF, its pages and recorded anchors.
#[derive(Clone, Debug)]
pub struct LaidOutDocument {
    document: Document,
    pages: Vec<Page>,
    anchors: Vec<Anchor>,
}

impl LaidOutDocument {
    /// Parses rendered PDF bytes.
    pub fn from_pdf_bytes(bytes: &[u8], anchors: Vec<Anchor>) -> Result<Self, LayoutError> {
        let document = Document::load_mem(bytes)?;
        Self::from_document(document, anchors)
    }

    /// Wraps an in-memory PDF, reading each page's size from its (possibly inherited) `MediaBox`.
    pub fn from_document(document: Document, anchors: Vec<Anchor>) -> Result<Self, LayoutError> {
        let mut pages = Vec::new();
        for page_id in document.get_pages().into_values() {
            let (width, height) = media_box_size(&document, page_id)
                .ok_or(LayoutError::MissingMediaBox(page_id))?;
            pages.push(Page::new(width, height, page_id));
        }

        if pages.is_empty() {
            return Err(LayoutError::NoPages);
        }

        Ok(Self {
            document,
            pages,
            anchors,
        })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    /// Page index of the first anchor called `name`.
    pub fn anchor_page_index(&self, name: &str) -> Option<usize> {
        self.anchors
            .iter()
            .find(|anchor| anchor.name() == name)
            .map(Anchor::page_index)
    }
}

pub(crate) fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

/// Walks up the page tree until a `MediaBox` is found.
pub(crate) fn media_box_size(document: &Document, page_id: ObjectId) -> Option<(f32, f32)> {
    let mut current = Some(page_id);
    let mut depth = 0;

    while let Some(id) = current {
        let dictionary = document.get_object(id).ok()?.as_dict().ok()?;
        if let Ok(media_box) = dictionary.get(b"MediaBox") {
            let media_box = match media_box {
                Object::Reference(reference) => document.get_object(*reference).ok()?,
                other => other,
            };
            let values = media_box
                .as_array()
                .ok()?
                .iter()
                .map(number)
                .collect::<Option<Vec<f32>>>()?;
            if values.len() != 4 {
                return None;
            }
            return Some(((values[2] - values[0]).abs(), (values[3] - values[1]).abs()));
        }

        depth += 1;
        if depth > 64 {
            return None;
        }
        current = dictionary
            .get(b"Parent")
            .and_then(Object::as_reference)
            .ok();
    }

    None
}
