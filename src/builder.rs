//! Construction of the `genpdf` document a single part is laid out into.
//!
//! The running header and footer are painted by the page decorator, outside the content flow, so
//! every page of a part carries them regardless of where the content breaks.

use std::rc::Rc;

use genpdf::elements::{Paragraph, PaddedElement};
use genpdf::error::{Error, ErrorKind};
use genpdf::fonts::{FontData, FontFamily};
use genpdf::style::{Style, StyledString};
use genpdf::{Alignment, Element, Margins, Mm, PageDecorator, Position, Size};

use crate::elements::PageTracker;

/// One line of running chrome text.
#[derive(Clone, Debug)]
pub struct RunningLine {
    text: String,
    style: Style,
    alignment: Alignment,
}

impl RunningLine {
    pub fn new(text: impl Into<String>, style: Style, alignment: Alignment) -> Self {
        Self {
            text: text.into(),
            style,
            alignment,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    fn paragraph(&self) -> Paragraph {
        let mut paragraph = Paragraph::new(StyledString::new(self.text.clone(), self.style));
        paragraph.set_alignment(self.alignment);
        paragraph
    }
}

/// Builds `genpdf::Document`s for one part: page geometry, default text settings, running
/// header/footer and page tracking.
#[derive(Default)]
pub struct PartDocumentBuilder {
    title: Option<String>,
    paper_size: Option<Size>,
    margins: Option<Margins>,
    font_size: Option<u8>,
    line_spacing: Option<f64>,
    header: Option<(RunningLine, Mm)>,
    footer: Option<(RunningLine, Mm)>,
    tracker: Option<Rc<PageTracker>>,
}

impl PartDocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the title stored in the document metadata.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_paper_size(mut self, paper_size: impl Into<Size>) -> Self {
        self.paper_size = Some(paper_size.into());
        self
    }

    /// Page margins, applied before header and footer take their share.
    pub fn with_margins(mut self, margins: impl Into<Margins>) -> Self {
        self.margins = Some(margins.into());
        self
    }

    pub fn with_font_size(mut self, font_size: u8) -> Self {
        self.font_size = Some(font_size);
        self
    }

    pub fn with_line_spacing(mut self, line_spacing: f64) -> Self {
        self.line_spacing = Some(line_spacing);
        self
    }

    /// Header line followed by `gap` of empty space above the content.
    pub fn with_header(mut self, line: RunningLine, gap: impl Into<Mm>) -> Self {
        self.header = Some((line, gap.into()));
        self
    }

    /// Footer line in a band of `height` at the bottom of the page.
    pub fn with_footer(mut self, line: RunningLine, height: impl Into<Mm>) -> Self {
        self.footer = Some((line, height.into()));
        self
    }

    /// Reports every new page and its content height to `tracker`.
    pub fn with_page_tracker(mut self, tracker: Rc<PageTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn build(self, font_family: FontFamily<FontData>) -> genpdf::Document {
        let mut document = genpdf::Document::new(font_family);
        document.set_minimal_conformance();

        if let Some(title) = self.title {
            document.set_title(title);
        }
        if let Some(paper_size) = self.paper_size {
            document.set_paper_size(paper_size);
        }
        if let Some(font_size) = self.font_size {
            document.set_font_size(font_size);
        }
        if let Some(line_spacing) = self.line_spacing {
            document.set_line_spacing(line_spacing);
        }

        document.set_page_decorator(ChromeDecorator {
            margins: self.margins,
            header: self.header,
            footer: self.footer,
            tracker: self.tracker,
        });
        document
    }
}

struct ChromeDecorator {
    margins: Option<Margins>,
    header: Option<(RunningLine, Mm)>,
    footer: Option<(RunningLine, Mm)>,
    tracker: Option<Rc<PageTracker>>,
}

impl PageDecorator for ChromeDecorator {
    fn decorate_page<'a>(
        &mut self,
        context: &genpdf::Context,
        mut area: genpdf::render::Area<'a>,
        style: Style,
    ) -> Result<genpdf::render::Area<'a>, Error> {
        if let Some(margins) = self.margins {
            area.add_margins(margins);
        }

        if let Some((line, gap)) = &self.header {
            let mut element =
                PaddedElement::new(line.paragraph(), Margins::trbl(0, 0, *gap, 0));
            let result = element.render(context, area.clone(), style)?;
            area.add_offset(Position::new(0, result.size.height));
        }

        if let Some((line, height)) = &self.footer {
            let available = area.size().height;
            if *height > available {
                return Err(Error::new(
                    "Footer height exceeds available space",
                    ErrorKind::InvalidData,
                ));
            }

            let mut band = area.clone();
            band.add_offset(Position::new(0, available - *height));
            let result = line.paragraph().render(context, band, style)?;
            if result.has_more {
                return Err(Error::new(
                    format!("Footer '{}' does not fit into its band", line.text()),
                    ErrorKind::PageSizeExceeded,
                ));
            }
            area.set_height(available - *height);
        }

        if let Some(tracker) = &self.tracker {
            tracker.start_page(area.size().height);
        }

        Ok(area)
    }
}
