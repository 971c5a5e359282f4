//! Turning fetched HTML into laid-out [`Part`]s.
//!
//! Every page goes through the same pipeline: parse, normalise into a full document, sanitise,
//! inject the page chrome, insert the part anchor and lay out with a freshly reset engine.

use kuchiki::NodeRef;
use log::debug;

use crate::html;
use crate::layout::{LaidOutDocument, LayoutEngine, LayoutError};
use crate::model::{Part, PartId};
use crate::templates::Chrome;

/// Renders cover, TOC and body parts through one layout engine.
pub struct PartRenderer<'e> {
    engine: &'e mut dyn LayoutEngine,
    chrome: Chrome,
}

impl<'e> PartRenderer<'e> {
    pub fn new(engine: &'e mut dyn LayoutEngine, chrome: Chrome) -> Self {
        Self { engine, chrome }
    }

    pub fn chrome(&self) -> &Chrome {
        &self.chrome
    }

    /// Builds the document a body or TOC page is laid out from.
    pub fn prepare_page(&self, fragment: &str, anchor: Option<&str>) -> NodeRef {
        let document = prepare(fragment);
        html::inject(
            &document,
            &self.chrome.page_head,
            Some(&self.chrome.header_footer),
        );
        if let Some(name) = anchor {
            html::insert_anchor(&document, name);
        }
        document
    }

    /// Builds the cover document from the cover template.
    pub fn prepare_cover(&self) -> NodeRef {
        let document = prepare(&self.chrome.cover);
        html::inject(&document, &self.chrome.cover_head, None);
        document
    }

    /// Renders the content of one summary entry.
    pub fn render_body(
        &mut self,
        fragment: &str,
        id: &str,
        name: &str,
        level: usize,
        parent: Option<PartId>,
    ) -> Result<Part, LayoutError> {
        let document = self.prepare_page(fragment, Some(id));
        let layout = self.lay_out(&document)?;
        debug!(
            "Rendered part '{}' (level {}) into {} page(s)",
            id,
            level,
            layout.page_count()
        );
        Ok(Part::body(id, name, level, parent, layout))
    }

    /// Renders a generated TOC document.
    pub fn render_toc(&mut self, fragment: &str, name: &str) -> Result<Part, LayoutError> {
        let document = self.prepare_page(fragment, None);
        let layout = self.lay_out(&document)?;
        Ok(Part::toc(name, layout))
    }

    pub fn render_cover(&mut self, name: &str) -> Result<Part, LayoutError> {
        let document = self.prepare_cover();
        let layout = self.lay_out(&document)?;
        debug!("Rendered cover into {} page(s)", layout.page_count());
        Ok(Part::cover(name, layout))
    }

    fn lay_out(&mut self, document: &NodeRef) -> Result<LaidOutDocument, LayoutError> {
        self.engine.reset();
        self.engine.layout(document)
    }
}

fn prepare(fragment: &str) -> NodeRef {
    let document = html::parse(fragment);
    html::normalize(&document);
    html::sanitize(&document);
    document
}
