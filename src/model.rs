//! Data structures describing the summary tree and the parts rendered from it.

use kuchiki::traits::TendrilSink;
use kuchiki::NodeRef;
use log::warn;
use lopdf::ObjectId;

use crate::layout::LaidOutDocument;

/// A node of the summary tree: one page of documentation and its sub-pages.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SummaryEntry {
    page_id: String,
    name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    language: String,
    #[cfg_attr(feature = "serde", serde(default))]
    children: Vec<SummaryEntry>,
}

impl SummaryEntry {
    /// Creates a leaf entry pointing at `page_id`.
    pub fn new(
        page_id: impl Into<String>,
        name: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            page_id: page_id.into(),
            name: name.into(),
            language: language.into(),
            children: Vec::new(),
        }
    }

    /// Appends a child entry and returns the updated entry.
    pub fn with_child(mut self, child: SummaryEntry) -> Self {
        self.children.push(child);
        self
    }

    /// Appends several child entries and returns the updated entry.
    pub fn with_children(mut self, children: impl IntoIterator<Item = SummaryEntry>) -> Self {
        self.children.extend(children);
        self
    }

    /// Id of the page this entry refers to.
    pub fn page_id(&self) -> &str {
        &self.page_id
    }

    /// Display name used in the TOC and the outline.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Language of the referenced page. Empty means "the document language".
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Ordered child entries.
    pub fn children(&self) -> &[SummaryEntry] {
        &self.children
    }

    fn from_list_item(item: &NodeRef, default_language: &str) -> Option<Self> {
        let anchor = item.select_first("a[href]").ok()?;
        let attributes = anchor.attributes.borrow();
        let href = attributes.get("href").unwrap_or_default();
        let page_id = href.split(".html").next().unwrap_or_default().to_string();
        let language = attributes
            .get("reference-language")
            .filter(|value| !value.is_empty())
            .unwrap_or(default_language)
            .to_string();
        drop(attributes);

        let name = collapse_whitespace(&anchor.as_node().text_contents());
        let mut entry = SummaryEntry::new(page_id, name, language);

        let sublists: Vec<NodeRef> = element_children(item, "ul").collect();
        if sublists.len() == 1 {
            for child in element_children(&sublists[0], "li") {
                match SummaryEntry::from_list_item(&child, default_language) {
                    Some(parsed) => entry.children.push(parsed),
                    None => warn!("Skipping summary item without a link under '{}'", entry.name),
                }
            }
        }

        Some(entry)
    }
}

/// The document to assemble: a title, the owning package and the root summary entries.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SummaryDocument {
    title: String,
    package: String,
    language: String,
    summary: Vec<SummaryEntry>,
}

impl SummaryDocument {
    /// Creates an empty document.
    pub fn new(
        title: impl Into<String>,
        package: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            package: package.into(),
            language: language.into(),
            summary: Vec::new(),
        }
    }

    /// Appends a root entry and returns the updated document.
    pub fn with_entry(mut self, entry: SummaryEntry) -> Self {
        self.summary.push(entry);
        self
    }

    /// Parses a package TOC page.
    ///
    /// The title comes from `<head><title>`, root entries from `nav > ul > li`. Each item's first
    /// link gives the page id (the `href` up to `.html`) and the name; a `reference-language`
    /// attribute on the link overrides `language`. A single nested `ul` holds the children.
    pub fn parse_toc_html(html: &str, package: &str, language: &str) -> Self {
        let document = kuchiki::parse_html().one(html);
        let title = document
            .select_first("head > title")
            .map(|title| collapse_whitespace(&title.as_node().text_contents()))
            .unwrap_or_default();

        let mut parsed = SummaryDocument::new(title, package, language);
        if let Ok(items) = document.select("nav > ul > li") {
            for item in items {
                match SummaryEntry::from_list_item(item.as_node(), language) {
                    Some(entry) => parsed.summary.push(entry),
                    None => warn!("Skipping top-level summary item without a link"),
                }
            }
        }
        parsed
    }

    /// Title of the assembled document.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Package the pages belong to.
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Default language of the pages.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Root summary entries in document order.
    pub fn summary(&self) -> &[SummaryEntry] {
        &self.summary
    }

    /// Whether the summary has no entries at all.
    pub fn is_empty(&self) -> bool {
        self.summary.is_empty()
    }
}

fn element_children<'a>(node: &NodeRef, tag: &'a str) -> impl Iterator<Item = NodeRef> + 'a {
    node.children().filter(move |child| {
        child
            .as_element()
            .map(|element| &*element.name.local == tag)
            .unwrap_or(false)
    })
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Index of a body part inside a [`PartList`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartId(usize);

impl PartId {
    /// Position of the part in the flat pre-order list.
    pub fn index(self) -> usize {
        self.0
    }
}

/// What a part represents in the assembled document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartKind {
    Cover,
    Toc,
    Body,
}

/// One laid-out page: its size in points and the page object inside the part's PDF.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Page {
    width: f32,
    height: f32,
    object_id: ObjectId,
}

impl Page {
    pub fn new(width: f32, height: f32, object_id: ObjectId) -> Self {
        Self {
            width,
            height,
            object_id,
        }
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }
}

/// A named anchor recorded during layout and the part-local page it landed on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Anchor {
    name: String,
    page_index: usize,
}

impl Anchor {
    pub fn new(name: impl Into<String>, page_index: usize) -> Self {
        Self {
            name: name.into(),
            page_index,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Zero-based page index within the part.
    pub fn page_index(&self) -> usize {
        self.page_index
    }
}

/// One rendered unit of the final document: the cover, the TOC or a summary entry.
#[derive(Debug)]
pub struct Part {
    id: String,
    name: String,
    kind: PartKind,
    level: usize,
    parent: Option<PartId>,
    layout: LaidOutDocument,
    start_page: Option<usize>,
}

impl Part {
    /// Creates the cover part.
    pub fn cover(name: impl Into<String>, layout: LaidOutDocument) -> Self {
        Self::new("cover", name, PartKind::Cover, 0, None, layout)
    }

    /// Creates the TOC part.
    pub fn toc(name: impl Into<String>, layout: LaidOutDocument) -> Self {
        Self::new("toc", name, PartKind::Toc, 0, None, layout)
    }

    /// Creates a body part. `level` must be the parent's level plus one (1 for roots).
    pub fn body(
        id: impl Into<String>,
        name: impl Into<String>,
        level: usize,
        parent: Option<PartId>,
        layout: LaidOutDocument,
    ) -> Self {
        Self::new(id, name, PartKind::Body, level, parent, layout)
    }

    fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: PartKind,
        level: usize,
        parent: Option<PartId>,
        layout: LaidOutDocument,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            level,
            parent,
            layout,
            start_page: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PartKind {
        self.kind
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn parent(&self) -> Option<PartId> {
        self.parent
    }

    pub fn layout(&self) -> &LaidOutDocument {
        &self.layout
    }

    pub fn pages(&self) -> &[Page] {
        self.layout.pages()
    }

    pub fn page_count(&self) -> usize {
        self.layout.page_count()
    }

    /// Part-local page index of the anchor named after this part, if layout recorded one.
    pub fn anchor_page_index(&self) -> Option<usize> {
        self.layout.anchor_page_index(&self.id)
    }

    /// Absolute number of the part's first page, once offsets have been assigned.
    pub fn start_page(&self) -> Option<usize> {
        self.start_page
    }

    pub(crate) fn set_start_page(&mut self, page: usize) {
        self.start_page = Some(page);
    }
}

/// Flat arena of body parts in pre-order; parents are referenced by [`PartId`].
#[derive(Debug, Default)]
pub struct PartList {
    parts: Vec<Part>,
}

impl PartList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a part and returns its id.
    pub fn push(&mut self, part: Part) -> PartId {
        debug_assert_eq!(
            part.level,
            self.level_below(part.parent),
            "part level must follow its parent"
        );
        self.parts.push(part);
        PartId(self.parts.len() - 1)
    }

    /// Level a new child of `parent` must carry.
    pub fn level_below(&self, parent: Option<PartId>) -> usize {
        parent
            .and_then(|id| self.parts.get(id.0))
            .map(|part| part.level + 1)
            .unwrap_or(1)
    }

    pub fn get(&self, id: PartId) -> Option<&Part> {
        self.parts.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PartId, &Part)> {
        self.parts
            .iter()
            .enumerate()
            .map(|(index, part)| (PartId(index), part))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Part> {
        self.parts.iter_mut()
    }

    /// Ids of the direct children of `parent` (`None` selects the roots), in order.
    pub fn children_of(&self, parent: Option<PartId>) -> impl Iterator<Item = PartId> + '_ {
        self.iter()
            .filter(move |(_, part)| part.parent == parent)
            .map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Total number of pages across all body parts.
    pub fn page_count(&self) -> usize {
        self.parts.iter().map(Part::page_count).sum()
    }
}

/// Every part of a build in output order: cover, TOC, then the body parts.
#[derive(Debug, Default)]
pub struct DocumentParts {
    pub cover: Option<Part>,
    pub toc: Option<Part>,
    pub body: PartList,
}

impl DocumentParts {
    /// Parts in the order their pages appear in the output.
    pub fn ordered(&self) -> impl Iterator<Item = &Part> {
        self.cover
            .iter()
            .chain(self.toc.iter())
            .chain(self.body.iter().map(|(_, part)| part))
    }

    pub(crate) fn ordered_mut(&mut self) -> impl Iterator<Item = &mut Part> {
        self.cover
            .iter_mut()
            .chain(self.toc.iter_mut())
            .chain(self.body.iter_mut())
    }

    /// Total page count of the assembled document.
    pub fn page_count(&self) -> usize {
        self.ordered().map(Part::page_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOC: &str = r#"<html><head><title>User Guide</title></head><body>
        <nav><ul>
          <li><a href="intro.html">Introduction</a>
            <ul>
              <li><a href="install.html">Install</a></li>
              <li><a href="setup.html" reference-language="it">Setup</a></li>
            </ul>
          </li>
          <li><a href="faq.html#top">  FAQ
          </a></li>
        </ul></nav>
    </body></html>"#;

    #[test]
    fn parses_package_toc() {
        let document = SummaryDocument::parse_toc_html(TOC, "guide", "en");

        assert_eq!(document.title(), "User Guide");
        assert_eq!(document.package(), "guide");
        assert_eq!(document.summary().len(), 2);

        let intro = &document.summary()[0];
        assert_eq!(intro.page_id(), "intro");
        assert_eq!(intro.name(), "Introduction");
        assert_eq!(intro.language(), "en");
        assert_eq!(intro.children().len(), 2);
        assert_eq!(intro.children()[1].page_id(), "setup");
        assert_eq!(intro.children()[1].language(), "it");

        let faq = &document.summary()[1];
        assert_eq!(faq.page_id(), "faq");
        assert_eq!(faq.name(), "FAQ");
        assert!(faq.children().is_empty());
    }

    #[test]
    fn missing_nav_gives_empty_summary() {
        let document = SummaryDocument::parse_toc_html("<p>nothing</p>", "guide", "en");
        assert!(document.is_empty());
        assert_eq!(document.title(), "");
    }
}
