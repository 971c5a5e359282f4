//! Element implementations the HTML converter needs on top of `genpdf` primitives.
//!
//! Besides image helpers this module holds the elements that talk to the [`PageTracker`]:
//! [`AnchorMarker`] records on which page a named anchor landed, and [`KeepTogether`] moves a
//! block to the next page when it would otherwise be split.

use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::Rc;

use image::GenericImageView;

use genpdf::elements::{Image, Paragraph};
use genpdf::error::{Context as _, Error};
use genpdf::style::{Style, StyledString};
use genpdf::{render, Alignment, Element, Mm, Position, RenderResult, Scale, Size};

use crate::model::Anchor;

const DEFAULT_IMAGE_DPI: f64 = 300.0;
const MM_PER_INCH: f64 = 25.4;
const DEFAULT_CAPTION_SPACING_MM: f64 = 2.0;

pub(crate) fn mm_from_f64(value: f64) -> Mm {
    Mm::from(printpdf::Mm(value))
}

pub(crate) fn mm_to_f64(value: Mm) -> f64 {
    let mm: printpdf::Mm = value.into();
    mm.0
}

fn estimated_image_size(image: &image::DynamicImage, dpi: f64) -> Size {
    let (px_width, px_height) = image.dimensions();
    let width_mm = MM_PER_INCH * (px_width as f64) / dpi;
    let height_mm = MM_PER_INCH * (px_height as f64) / dpi;
    Size::new(mm_from_f64(width_mm), mm_from_f64(height_mm))
}

/// Loads an image from the given path using the [`image`] crate with descriptive errors.
pub fn decode_image_from_path(path: impl AsRef<Path>) -> Result<image::DynamicImage, Error> {
    let path = path.as_ref();
    let reader = image::io::Reader::open(path)
        .with_context(|| format!("Failed to open image file {}", path.display()))?;
    reader
        .with_guessed_format()
        .context("Unable to determine image format")?
        .decode()
        .with_context(|| format!("Failed to decode image file {}", path.display()))
}

/// Loads the image at `path`, scaled down so it is at most `max_width` wide.
///
/// Returns the image together with the size it will occupy on the page. Alpha channels are
/// flattened because the PDF backend cannot embed them.
pub fn fitted_image(path: impl AsRef<Path>, max_width: Mm) -> Result<(Image, Size), Error> {
    let dynamic = decode_image_from_path(path)?;
    let dynamic = match dynamic {
        image::DynamicImage::ImageRgb8(_) | image::DynamicImage::ImageLuma8(_) => dynamic,
        other => image::DynamicImage::ImageRgb8(other.to_rgb8()),
    };

    let natural = estimated_image_size(&dynamic, DEFAULT_IMAGE_DPI);
    let mut image = Image::from_dynamic_image(dynamic)?;

    let natural_width = mm_to_f64(natural.width);
    let available = mm_to_f64(max_width);
    let scale = if natural_width > available && natural_width > f64::EPSILON {
        available / natural_width
    } else {
        1.0
    };
    image.set_scale(Scale::new(scale, scale));

    let size = Size::new(
        mm_from_f64(natural_width * scale),
        mm_from_f64(mm_to_f64(natural.height) * scale),
    );
    Ok((image, size))
}

/// Page bookkeeping shared between the page decorator and the elements of one document.
///
/// The decorator calls [`start_page`](PageTracker::start_page) for every new page; elements read
/// the current page index and the height of a full content area from it.
#[derive(Debug, Default)]
pub struct PageTracker {
    page: Cell<usize>,
    body_height: Cell<Option<Mm>>,
    anchors: RefCell<Vec<Anchor>>,
}

impl PageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new page whose content area is `body_height` tall.
    pub fn start_page(&self, body_height: Mm) {
        self.page.set(self.page.get() + 1);
        self.body_height.set(Some(body_height));
    }

    /// Zero-based index of the page currently being rendered.
    pub fn page_index(&self) -> usize {
        self.page.get().saturating_sub(1)
    }

    /// Height of the content area of an empty page, once the first page has started.
    pub fn body_height(&self) -> Option<Mm> {
        self.body_height.get()
    }

    /// Records `name` on the current page. Only the first occurrence of a name is kept.
    pub fn record_anchor(&self, name: &str) {
        let mut anchors = self.anchors.borrow_mut();
        if !anchors.iter().any(|anchor| anchor.name() == name) {
            anchors.push(Anchor::new(name, self.page_index()));
        }
    }

    pub fn take_anchors(&self) -> Vec<Anchor> {
        self.anchors.take()
    }

    pub fn reset(&self) {
        self.page.set(0);
        self.body_height.set(None);
        self.anchors.borrow_mut().clear();
    }
}

/// Zero-sized element that records a named anchor on the page it is rendered on.
pub struct AnchorMarker {
    name: String,
    tracker: Rc<PageTracker>,
}

impl AnchorMarker {
    pub fn new(name: impl Into<String>, tracker: Rc<PageTracker>) -> Self {
        Self {
            name: name.into(),
            tracker,
        }
    }
}

impl Element for AnchorMarker {
    fn render(
        &mut self,
        _context: &genpdf::Context,
        _area: render::Area<'_>,
        _style: Style,
    ) -> Result<RenderResult, Error> {
        self.tracker.record_anchor(&self.name);
        Ok(RenderResult::default())
    }
}

/// Owned trait object that can be pushed into `genpdf` layouts, which only accept sized elements.
pub struct BoxedElement(Box<dyn Element>);

impl BoxedElement {
    pub fn new(element: impl Element + 'static) -> Self {
        Self(Box::new(element))
    }
}

impl From<Box<dyn Element>> for BoxedElement {
    fn from(element: Box<dyn Element>) -> Self {
        Self(element)
    }
}

impl Element for BoxedElement {
    fn render(
        &mut self,
        context: &genpdf::Context,
        area: render::Area<'_>,
        style: Style,
    ) -> Result<RenderResult, Error> {
        self.0.render(context, area, style)
    }
}

/// Wraps a block that should not be split across pages.
///
/// `genpdf` cannot measure an element without drawing it, so the height is estimated from the
/// text lines the block contains plus a fixed extra height (images, padding). When the estimate
/// does not fit the remaining area, but would fit an empty page, the block is deferred once to
/// the next page. Blocks taller than a page are rendered in place and split normally.
pub struct KeepTogether {
    inner: Box<dyn Element>,
    lines: Vec<StyledString>,
    extra_height: Mm,
    tracker: Rc<PageTracker>,
    started: bool,
}

impl KeepTogether {
    pub fn new(inner: impl Element + 'static, tracker: Rc<PageTracker>) -> Self {
        Self {
            inner: Box::new(inner),
            lines: Vec::new(),
            extra_height: Mm::default(),
            tracker,
            started: false,
        }
    }

    /// Hard lines of text used to estimate the block height.
    pub fn with_lines(mut self, lines: Vec<StyledString>) -> Self {
        self.lines = lines;
        self
    }

    /// Height added to the text estimate.
    pub fn with_extra_height(mut self, height: Mm) -> Self {
        self.extra_height = height;
        self
    }

    fn estimated_height(&self, context: &genpdf::Context, width: Mm, style: Style) -> Mm {
        let available = mm_to_f64(width).max(1.0);
        let text: f64 = self
            .lines
            .iter()
            .map(|line| {
                let line_style = style.and(line.style);
                let line_width = mm_to_f64(line_style.str_width(&context.font_cache, &line.s));
                let wrapped = (line_width / available).ceil().max(1.0);
                wrapped * mm_to_f64(line_style.line_height(&context.font_cache))
            })
            .sum();
        mm_from_f64(text + mm_to_f64(self.extra_height))
    }
}

impl Element for KeepTogether {
    fn render(
        &mut self,
        context: &genpdf::Context,
        area: render::Area<'_>,
        style: Style,
    ) -> Result<RenderResult, Error> {
        if !self.started {
            self.started = true;
            if let Some(full) = self.tracker.body_height() {
                let available = area.size().height;
                let consumed = mm_to_f64(full) - mm_to_f64(available);
                let line = mm_to_f64(style.line_height(&context.font_cache));
                let estimate = self.estimated_height(context, area.size().width, style);
                if consumed > line && estimate > available && estimate <= full {
                    let mut result = RenderResult::default();
                    result.has_more = true;
                    return Ok(result);
                }
            }
        }
        self.inner.render(context, area, style)
    }
}

fn default_caption_spacing() -> Mm {
    mm_from_f64(DEFAULT_CAPTION_SPACING_MM)
}

/// An image with its caption stacked underneath.
pub struct CaptionedImage {
    image: Image,
    caption: Paragraph,
    spacing: Mm,
}

impl CaptionedImage {
    /// Centres both the image and the caption.
    pub fn new(mut image: Image, mut caption: Paragraph) -> Self {
        image.set_alignment(Alignment::Center);
        caption.set_alignment(Alignment::Center);
        Self {
            image,
            caption,
            spacing: default_caption_spacing(),
        }
    }
}

impl Element for CaptionedImage {
    fn render(
        &mut self,
        context: &genpdf::Context,
        mut area: render::Area<'_>,
        style: Style,
    ) -> Result<RenderResult, Error> {
        let mut result = RenderResult::default();
        let image_result = self.image.render(context, area.clone(), style)?;
        result.size = result.size.stack_vertical(image_result.size);
        result.has_more |= image_result.has_more;
        if image_result.has_more {
            return Ok(result);
        }

        let spacing = self.spacing;
        area.add_offset(Position::new(0, image_result.size.height + spacing));
        result.size = result.size.stack_vertical(Size::new(0, spacing));

        let caption_result = self.caption.render(context, area, style)?;
        result.size = result.size.stack_vertical(caption_result.size);
        result.has_more |= caption_result.has_more;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_counts_pages_and_keeps_first_anchor() {
        let tracker = PageTracker::new();
        assert_eq!(tracker.page_index(), 0);
        assert!(tracker.body_height().is_none());

        tracker.start_page(mm_from_f64(250.0));
        tracker.record_anchor("intro");
        tracker.start_page(mm_from_f64(250.0));
        tracker.record_anchor("intro");
        tracker.record_anchor("details");

        assert_eq!(tracker.page_index(), 1);
        assert_eq!(
            tracker.take_anchors(),
            vec![Anchor::new("intro", 0), Anchor::new("details", 1)]
        );

        tracker.reset();
        assert_eq!(tracker.page_index(), 0);
        assert!(tracker.body_height().is_none());
        assert!(tracker.take_anchors().is_empty());
    }

    #[test]
    fn boxed_elements_nest_in_layouts() {
        let mut inner = genpdf::elements::LinearLayout::vertical();
        inner.push(Paragraph::new("first"));
        let blocks: Vec<Box<dyn Element>> =
            vec![Box::new(inner), Box::new(Paragraph::new("second"))];

        let mut outer = genpdf::elements::LinearLayout::vertical();
        for block in blocks {
            outer.push(BoxedElement::from(block));
        }
        let keep = KeepTogether::new(outer, Rc::new(PageTracker::new()));
        let mut wrapped = BoxedElement::new(keep);
        let _: &mut dyn Element = &mut wrapped;
    }

    #[test]
    fn mm_conversion_round_trips() {
        assert!((mm_to_f64(mm_from_f64(12.5)) - 12.5).abs() < f64::EPSILON);
    }
}
