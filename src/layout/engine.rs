use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;

use genpdf::fonts::{FontData, FontFamily};
use genpdf::style::Style;
use genpdf::{Alignment, Element, PaperSize, Size};
use kuchiki::NodeRef;
use log::debug;

use super::convert::Converter;
use super::theme::{builtin_stylesheets, StyleRules, Theme};
use super::{LaidOutDocument, LayoutEngine, LayoutError};
use crate::builder::{PartDocumentBuilder, RunningLine};
use crate::elements::PageTracker;
use crate::fonts;
use crate::html::attribute;
use crate::model::collapse_whitespace;

const HEADER_GAP_MM: i32 = 3;
const FOOTER_HEIGHT_MM: i32 = 8;

/// Layout engine rendering documents with `genpdf`.
///
/// Linked stylesheets are matched by `href` against registered [`StyleRules`]; the running header
/// and footer are taken from `#pdf-header` and `#pdf-footer`.
pub struct GenpdfLayoutEngine {
    font_family: FontFamily<FontData>,
    paper_size: Size,
    stylesheets: BTreeMap<String, StyleRules>,
    base_dir: Option<PathBuf>,
    title: Option<String>,
    tracker: Rc<PageTracker>,
    resolved: Option<(Vec<String>, Theme)>,
}

impl GenpdfLayoutEngine {
    /// Creates an engine with the default font family, see [`fonts::default_font_family`].
    pub fn new() -> Result<Self, genpdf::error::Error> {
        Ok(Self::with_font_family(fonts::default_font_family()?))
    }

    pub fn with_font_family(font_family: FontFamily<FontData>) -> Self {
        Self {
            font_family,
            paper_size: PaperSize::A4.into(),
            stylesheets: builtin_stylesheets(),
            base_dir: None,
            title: None,
            tracker: Rc::new(PageTracker::new()),
            resolved: None,
        }
    }

    pub fn with_paper_size(mut self, paper_size: impl Into<Size>) -> Self {
        self.paper_size = paper_size.into();
        self
    }

    /// Directory relative image sources are resolved against.
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    /// Title stored in the metadata of every laid out document.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Registers (or replaces) the rules used for stylesheets linked as `href`.
    pub fn with_stylesheet(mut self, href: impl Into<String>, rules: StyleRules) -> Self {
        self.stylesheets.insert(href.into(), rules);
        self
    }

    fn theme_for(&mut self, document: &NodeRef) -> Theme {
        let links = stylesheet_links(document);
        if let Some((cached, theme)) = &self.resolved {
            if *cached == links {
                return theme.clone();
            }
        }

        let mut theme = Theme::default();
        for href in &links {
            match self.stylesheets.get(href) {
                Some(rules) => theme.apply(rules),
                None => debug!("No rules registered for stylesheet '{}'", href),
            }
        }
        self.resolved = Some((links, theme.clone()));
        theme
    }
}

impl LayoutEngine for GenpdfLayoutEngine {
    fn layout(&mut self, document: &NodeRef) -> Result<LaidOutDocument, LayoutError> {
        let theme = self.theme_for(document);
        let body = document
            .select_first("body")
            .map_err(|_| LayoutError::Engine("Document has no body".to_owned()))?;

        let content_width = theme.margins.content_width(self.paper_size.width);
        let content = Converter::new(
            &theme,
            &self.tracker,
            self.base_dir.as_deref(),
            content_width,
        )
        .convert(body.as_node())?;

        let mut builder = PartDocumentBuilder::new()
            .with_paper_size(self.paper_size)
            .with_margins(theme.margins)
            .with_font_size(theme.font_size)
            .with_line_spacing(theme.line_spacing)
            .with_page_tracker(Rc::clone(&self.tracker));
        if let Some(title) = &self.title {
            builder = builder.with_title(title.clone());
        }

        let chrome = Style::new()
            .with_font_size(theme.chrome_font_size)
            .with_color(theme.accent_color);
        if let Some(text) = running_text(document, "#pdf-header") {
            builder = builder.with_header(
                RunningLine::new(text, chrome, Alignment::Right),
                HEADER_GAP_MM,
            );
        }
        if let Some(text) = running_text(document, "#pdf-footer") {
            builder = builder.with_footer(
                RunningLine::new(text, chrome, Alignment::Center),
                FOOTER_HEIGHT_MM,
            );
        }

        let mut pdf = builder.build(self.font_family.clone());
        pdf.push(content.styled(Style::new().with_color(theme.text_color)));

        let mut bytes = Vec::new();
        pdf.render(&mut bytes)?;
        LaidOutDocument::from_pdf_bytes(&bytes, self.tracker.take_anchors())
    }

    fn reset(&mut self) {
        self.tracker.reset();
        self.resolved = None;
    }
}

fn stylesheet_links(document: &NodeRef) -> Vec<String> {
    let Ok(links) = document.select("link") else {
        return Vec::new();
    };
    links
        .filter(|link| {
            attribute(link.as_node(), "rel")
                .map(|rel| rel.eq_ignore_ascii_case("stylesheet"))
                .unwrap_or(false)
        })
        .filter_map(|link| attribute(link.as_node(), "href"))
        .collect()
}

fn running_text(document: &NodeRef, selector: &str) -> Option<String> {
    let node = document.select_first(selector).ok()?;
    let text = collapse_whitespace(&node.as_node().text_contents());
    (!text.trim().is_empty()).then_some(text)
}
