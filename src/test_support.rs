//! Deterministic collaborators for tests: a layout engine with fixed page counts and an
//! in-memory content fetcher.
//!
//! Every page produced by [`FixedLayoutEngine`] carries a `/AssemblyMarker (part#index)` entry so
//! tests can check which page ended up where in the assembled document.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use kuchiki::NodeRef;
use lopdf::{dictionary, Document, Object, ObjectId};

use crate::fetch::{ContentFetcher, DocumentFormat, FetchError};
use crate::html::attribute;
use crate::layout::{LaidOutDocument, LayoutEngine, LayoutError};
use crate::model::Anchor;

/// Page dictionary key holding the test marker.
pub const MARKER_KEY: &str = "AssemblyMarker";

/// A4 in points.
pub const PAGE_SIZE: (f32, f32) = (595.0, 842.0);

type TocPages = Box<dyn Fn(usize, usize) -> usize>;

/// Layout engine whose page counts are configured up front.
///
/// Documents are recognised by their markup: the cover by `.cover`, the TOC by `#toc`, body
/// parts by the `a[name]` anchor the renderer inserts.
pub struct FixedLayoutEngine {
    body_pages: HashMap<String, usize>,
    anchor_pages: HashMap<String, usize>,
    default_pages: usize,
    cover_pages: usize,
    cover_size: (f32, f32),
    toc_pages: TocPages,
    failing: HashSet<String>,
    needs_reset: bool,
    layouts: usize,
    resets: usize,
    toc_documents: Vec<String>,
}

impl Default for FixedLayoutEngine {
    fn default() -> Self {
        Self {
            body_pages: HashMap::new(),
            anchor_pages: HashMap::new(),
            default_pages: 1,
            cover_pages: 1,
            cover_size: PAGE_SIZE,
            toc_pages: Box::new(|_, _| 1),
            failing: HashSet::new(),
            needs_reset: false,
            layouts: 0,
            resets: 0,
            toc_documents: Vec::new(),
        }
    }
}

impl FixedLayoutEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lays out the body part `id` into `pages` pages.
    pub fn with_part(mut self, id: &str, pages: usize) -> Self {
        self.body_pages.insert(id.to_string(), pages);
        self
    }

    /// Records the anchor of part `id` on its part-local page `index`.
    pub fn with_anchor_page(mut self, id: &str, index: usize) -> Self {
        self.anchor_pages.insert(id.to_string(), index);
        self
    }

    pub fn with_cover_pages(mut self, pages: usize) -> Self {
        self.cover_pages = pages;
        self
    }

    pub fn with_cover_size(mut self, width: f32, height: f32) -> Self {
        self.cover_size = (width, height);
        self
    }

    /// TOC page count as a function of the row count and the highest page number printed.
    pub fn with_toc_pages(mut self, pages: impl Fn(usize, usize) -> usize + 'static) -> Self {
        self.toc_pages = Box::new(pages);
        self
    }

    /// Makes the layout of part `id` fail.
    pub fn failing_on(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    pub fn layouts(&self) -> usize {
        self.layouts
    }

    pub fn resets(&self) -> usize {
        self.resets
    }

    /// Serialised TOC documents in the order they were laid out.
    pub fn toc_documents(&self) -> &[String] {
        &self.toc_documents
    }
}

impl LayoutEngine for FixedLayoutEngine {
    fn layout(&mut self, document: &NodeRef) -> Result<LaidOutDocument, LayoutError> {
        if self.needs_reset {
            return Err(LayoutError::Engine(
                "layout called without resetting the previous document".to_string(),
            ));
        }
        self.needs_reset = true;
        self.layouts += 1;

        if document.select_first(".cover").is_ok() {
            let (width, height) = self.cover_size;
            return blank_layout("cover", self.cover_pages, width, height, Vec::new());
        }

        if document.select_first("#toc").is_ok() {
            self.toc_documents.push(document.to_string());
            let rows = document.select("#toc table").map(Iterator::count).unwrap_or(0);
            let last_page = document
                .select("td.toc-page")
                .map(|cells| {
                    cells
                        .filter_map(|cell| cell.as_node().text_contents().trim().parse().ok())
                        .max()
                        .unwrap_or(0)
                })
                .unwrap_or(0);
            let pages = (self.toc_pages)(rows, last_page);
            return blank_layout("toc", pages, PAGE_SIZE.0, PAGE_SIZE.1, Vec::new());
        }

        let id = document
            .select_first("a[name]")
            .ok()
            .and_then(|anchor| attribute(anchor.as_node(), "name"))
            .ok_or_else(|| LayoutError::Engine("document has no part anchor".to_string()))?;
        if self.failing.contains(&id) {
            return Err(LayoutError::Engine(format!("layout of '{}' failed", id)));
        }

        let pages = self.body_pages.get(&id).copied().unwrap_or(self.default_pages);
        let anchor = self.anchor_pages.get(&id).copied().unwrap_or(0);
        blank_layout(
            &id,
            pages,
            PAGE_SIZE.0,
            PAGE_SIZE.1,
            vec![Anchor::new(id.clone(), anchor)],
        )
    }

    fn reset(&mut self) {
        self.needs_reset = false;
        self.resets += 1;
    }
}

/// A laid-out document of `pages` empty pages whose size is inherited from the page tree root.
pub fn blank_layout(
    marker: &str,
    pages: usize,
    width: f32,
    height: f32,
    anchors: Vec<Anchor>,
) -> Result<LaidOutDocument, LayoutError> {
    LaidOutDocument::from_document(blank_document(marker, pages, width, height), anchors)
}

/// An in-memory PDF with `pages` marked, empty pages.
pub fn blank_document(marker: &str, pages: usize, width: f32, height: f32) -> Document {
    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();

    let kids: Vec<Object> = (0..pages)
        .map(|index| {
            let content = document.add_object(lopdf::Stream::new(
                dictionary! {},
                format!("% {} page {}\n", marker, index).into_bytes(),
            ));
            let page: ObjectId = document.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content,
                MARKER_KEY => Object::string_literal(format!("{}#{}", marker, index)),
            });
            page.into()
        })
        .collect();

    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
            "MediaBox" => vec![0.into(), 0.into(), Object::Real(width.into()), Object::Real(height.into())],
            "Resources" => dictionary! {},
        }),
    );
    let catalog = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog);
    document
}

/// Markers of every page of `document`, in page order.
pub fn page_markers(document: &Document) -> Vec<String> {
    document
        .get_pages()
        .into_values()
        .map(|page_id| {
            document
                .get_dictionary(page_id)
                .and_then(|page| page.get(MARKER_KEY.as_bytes()))
                .and_then(Object::as_str)
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                .unwrap_or_default()
        })
        .collect()
}

/// Content fetcher serving pages from memory.
#[derive(Debug, Default)]
pub struct MapFetcher {
    pages: HashMap<String, String>,
    denied: bool,
    requests: RefCell<Vec<(String, String)>>,
}

impl MapFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, page_id: &str, html: &str) -> Self {
        self.pages.insert(page_id.to_string(), html.to_string());
        self
    }

    /// Denies access to every package.
    pub fn denying(mut self) -> Self {
        self.denied = true;
        self
    }

    /// `(page_id, language)` of every request, in order.
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.borrow().clone()
    }
}

impl ContentFetcher for MapFetcher {
    fn fetch(
        &self,
        package: &str,
        page_id: &str,
        language: &str,
        _format: DocumentFormat,
    ) -> Result<String, FetchError> {
        self.requests
            .borrow_mut()
            .push((page_id.to_string(), language.to_string()));
        if self.denied {
            return Err(FetchError::AccessDenied {
                package: package.to_string(),
            });
        }
        self.pages
            .get(page_id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                page_id: page_id.to_string(),
                language: language.to_string(),
            })
    }
}
