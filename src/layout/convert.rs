//! Conversion of a prepared HTML body into `genpdf` elements.
//!
//! Inline content is gathered into paragraphs; block elements flush the pending paragraph and
//! become their own elements. Every flow also keeps a rough height [`Estimate`] so that
//! `avoid-break` blocks can be wrapped in [`KeepTogether`].

use std::path::{Path, PathBuf};
use std::rc::Rc;

use genpdf::elements::{
    Break, FrameCellDecorator, FramedElement, Image, LinearLayout, OrderedList, PageBreak,
    Paragraph, TableLayout, UnorderedList,
};
use genpdf::error::Error;
use genpdf::style::{Style, StyledString};
use genpdf::{Alignment, Element, Margins, Mm, Size};
use kuchiki::NodeRef;
use log::warn;

use crate::elements::{
    fitted_image, mm_from_f64, mm_to_f64, AnchorMarker, BoxedElement, CaptionedImage, KeepTogether,
    PageTracker,
};
use crate::html::{attribute, class_list, has_class, tag_name};
use crate::layout::Theme;
use crate::model::collapse_whitespace;
use crate::richtext::{spans_to_styled_strings, InlineStyle, Span, SpanCollector};

const PT_TO_MM: f64 = 0.352_778;
const MESSAGE_PADDING_MM: i32 = 2;

const SKIPPED_TAGS: &[&str] = &[
    "head", "script", "style", "title", "meta", "link", "noscript", "template",
];

const BLOCK_TAGS: &[&str] = &[
    "div", "section", "article", "main", "header", "footer", "nav", "aside", "address",
    "center", "details", "summary", "form", "fieldset", "dl", "li", "tr", "td", "th", "tbody",
    "thead", "tfoot", "caption", "figcaption",
];

#[derive(Clone, Copy)]
struct Context {
    inline: InlineStyle,
    alignment: Alignment,
    list_depth: usize,
}

#[derive(Clone, Default)]
struct Estimate {
    lines: Vec<StyledString>,
    extra_height: f64,
}

impl Estimate {
    fn add(&mut self, other: &Estimate) {
        self.lines.extend(other.lines.iter().cloned());
        self.extra_height += other.extra_height;
    }
}

#[derive(Default)]
struct Flow {
    blocks: Vec<Box<dyn Element>>,
    inline: SpanCollector,
    estimate: Estimate,
}

impl Flow {
    fn push(&mut self, element: impl Element + 'static) {
        self.blocks.push(Box::new(element));
    }

    fn finish(self) -> (LinearLayout, Estimate) {
        let mut layout = LinearLayout::vertical();
        for block in self.blocks {
            layout.push(BoxedElement::from(block));
        }
        (layout, self.estimate)
    }
}

/// Converts one document body using a resolved theme.
pub(crate) struct Converter<'a> {
    theme: &'a Theme,
    tracker: &'a Rc<PageTracker>,
    base_dir: Option<&'a Path>,
    content_width: Mm,
}

impl<'a> Converter<'a> {
    pub(crate) fn new(
        theme: &'a Theme,
        tracker: &'a Rc<PageTracker>,
        base_dir: Option<&'a Path>,
        content_width: Mm,
    ) -> Self {
        Self {
            theme,
            tracker,
            base_dir,
            content_width,
        }
    }

    pub(crate) fn convert(&self, body: &NodeRef) -> Result<LinearLayout, Error> {
        let context = Context {
            inline: InlineStyle::default(),
            alignment: self.theme.alignment,
            list_depth: 0,
        };
        let (layout, _) = self.flow(body, context)?.finish();
        Ok(layout)
    }

    fn flow(&self, node: &NodeRef, context: Context) -> Result<Flow, Error> {
        let mut flow = Flow::default();
        self.children(node, context, &mut flow)?;
        self.flush(&mut flow, context, Style::new());
        Ok(flow)
    }

    fn children(&self, node: &NodeRef, context: Context, flow: &mut Flow) -> Result<(), Error> {
        for child in node.children() {
            self.node(&child, context, flow)?;
        }
        Ok(())
    }

    fn flush(&self, flow: &mut Flow, context: Context, style: Style) {
        if flow.inline.is_empty() {
            flow.inline.finish();
            return;
        }

        let spans = flow.inline.finish();
        let mut paragraph = Paragraph::default();
        for styled in spans_to_styled_strings(&spans) {
            paragraph.push(styled);
        }
        paragraph.set_alignment(context.alignment);

        let text: String = spans.iter().map(Span::text).collect();
        flow.estimate.lines.push(StyledString::new(text, style));
        flow.push(paragraph.styled(style));
    }

    fn spacing(&self, flow: &mut Flow) {
        let spacing = self.theme.block_spacing;
        flow.push(Break::new(spacing));
        flow.estimate.extra_height +=
            spacing * f64::from(self.theme.font_size) * self.theme.line_spacing * PT_TO_MM;
    }

    fn node(&self, node: &NodeRef, context: Context, flow: &mut Flow) -> Result<(), Error> {
        if let Some(text) = node.as_text() {
            flow.inline.push_text(&text.borrow(), context.inline);
            return Ok(());
        }
        let Some(tag) = tag_name(node) else {
            return Ok(());
        };
        if is_hidden(node, &tag) {
            return Ok(());
        }

        match tag.as_str() {
            "br" => self.flush(flow, context, Style::new()),
            "a" => self.anchor(node, context, flow)?,
            "b" | "strong" => {
                let mut inner = context;
                inner.inline.bold = true;
                self.children(node, inner, flow)?;
            }
            "i" | "em" | "cite" | "var" | "dfn" => {
                let mut inner = context;
                inner.inline.italic = true;
                self.children(node, inner, flow)?;
            }
            "code" | "kbd" | "samp" | "tt" => {
                let mut inner = context;
                inner.inline.color = Some(self.theme.accent_color);
                self.children(node, inner, flow)?;
            }
            "img" => {
                self.flush(flow, context, Style::new());
                if let Some((mut image, size)) = self.load_image(node) {
                    image.set_alignment(Alignment::Center);
                    flow.estimate.extra_height += mm_to_f64(size.height);
                    flow.push(image);
                }
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = tag[1..].parse().unwrap_or(1);
                self.heading(node, level, context, flow)?;
            }
            "p" => {
                self.flush(flow, context, Style::new());
                let inner = aligned(context, node);
                self.children(node, inner, flow)?;
                self.flush(flow, inner, Style::new());
                self.spacing(flow);
            }
            "ul" => self.list(node, false, context, flow)?,
            "ol" => self.list(node, true, context, flow)?,
            "pre" => self.preformatted(node, context, flow),
            "table" => self.table(node, context, flow)?,
            "hr" => {
                self.flush(flow, context, Style::new());
                flow.push(Break::new(1));
            }
            "figure" => self.figure(node, context, flow)?,
            "blockquote" | "dd" => self.indented(node, context, flow)?,
            "dt" => {
                let mut inner = context;
                inner.inline.bold = true;
                self.division(node, inner, flow)?;
            }
            "span" if has_class(node, "code") => {
                let mut inner = context;
                inner.inline.color = Some(self.theme.accent_color);
                self.children(node, inner, flow)?;
            }
            other if BLOCK_TAGS.contains(&other) => self.division(node, context, flow)?,
            _ => self.children(node, context, flow)?,
        }
        Ok(())
    }

    fn anchor(&self, node: &NodeRef, context: Context, flow: &mut Flow) -> Result<(), Error> {
        let href = attribute(node, "href");
        if let (Some(name), None) = (attribute(node, "name"), &href) {
            self.flush(flow, context, Style::new());
            flow.push(AnchorMarker::new(name, Rc::clone(self.tracker)));
        }

        let mut inner = context;
        if href.is_some() {
            inner.inline.color = Some(self.theme.accent_color);
        }
        self.children(node, inner, flow)
    }

    fn division(&self, node: &NodeRef, context: Context, flow: &mut Flow) -> Result<(), Error> {
        self.flush(flow, context, Style::new());
        let context = aligned(context, node);

        if has_class(node, "page-break") {
            flow.push(PageBreak::new());
            return Ok(());
        }

        if has_class(node, "avoid-break") {
            let (layout, estimate) = self.flow(node, context)?.finish();
            flow.estimate.add(&estimate);
            flow.push(
                KeepTogether::new(layout, Rc::clone(self.tracker))
                    .with_lines(estimate.lines)
                    .with_extra_height(mm_from_f64(estimate.extra_height)),
            );
            return Ok(());
        }

        if has_class(node, "msg") {
            let (layout, estimate) = self.flow(node, context)?.finish();
            flow.estimate.add(&estimate);
            flow.estimate.extra_height += f64::from(2 * MESSAGE_PADDING_MM);
            flow.push(FramedElement::new(
                layout.padded(Margins::all(MESSAGE_PADDING_MM)),
            ));
            self.spacing(flow);
            return Ok(());
        }

        self.children(node, context, flow)?;
        self.flush(flow, context, Style::new());
        Ok(())
    }

    fn indented(&self, node: &NodeRef, context: Context, flow: &mut Flow) -> Result<(), Error> {
        self.flush(flow, context, Style::new());
        let mut inner = aligned(context, node);
        if tag_name(node).as_deref() == Some("blockquote") {
            inner.inline.italic = true;
        }

        let (layout, estimate) = self.flow(node, inner)?.finish();
        flow.estimate.add(&estimate);
        flow.push(layout.padded(Margins::trbl(0, 0, 0, mm_from_f64(self.theme.list_indent))));
        Ok(())
    }

    fn heading(
        &self,
        node: &NodeRef,
        level: usize,
        context: Context,
        flow: &mut Flow,
    ) -> Result<(), Error> {
        self.flush(flow, context, Style::new());

        let mut inner = aligned(context, node);
        inner.inline.bold = true;
        let style = Style::new()
            .with_font_size(self.theme.heading_size(level))
            .with_color(self.theme.heading_color);

        self.children(node, inner, flow)?;
        self.flush(flow, inner, style);
        self.spacing(flow);
        Ok(())
    }

    fn list(
        &self,
        node: &NodeRef,
        ordered: bool,
        context: Context,
        flow: &mut Flow,
    ) -> Result<(), Error> {
        self.flush(flow, context, Style::new());
        let nested = Context {
            list_depth: context.list_depth + 1,
            ..context
        };

        let mut items = Vec::new();
        for item in element_children(node, &["li"]) {
            let (layout, estimate) = self.flow(&item, nested)?.finish();
            flow.estimate.add(&estimate);
            items.push(layout);
        }

        if has_class(node, "plain") {
            let mut list = LinearLayout::vertical();
            for item in items {
                list.push(item);
            }
            if context.list_depth > 0 {
                let indent = mm_from_f64(self.theme.list_indent);
                flow.push(list.padded(Margins::trbl(0, 0, 0, indent)));
            } else {
                flow.push(list);
            }
        } else if ordered {
            let start = attribute(node, "start")
                .and_then(|value| value.trim().parse().ok())
                .unwrap_or(1);
            let mut list = OrderedList::with_start(start);
            for item in items {
                list.push(item);
            }
            flow.push(list);
        } else {
            let mut list = UnorderedList::new();
            for item in items {
                list.push(item);
            }
            flow.push(list);
        }

        if context.list_depth == 0 {
            self.spacing(flow);
        }
        Ok(())
    }

    fn preformatted(&self, node: &NodeRef, context: Context, flow: &mut Flow) {
        self.flush(flow, context, Style::new());
        let style = Style::new().with_color(self.theme.accent_color);

        let mut layout = LinearLayout::vertical();
        for line in node.text_contents().lines() {
            let line = line.replace('\t', "    ");
            let styled = StyledString::new(line.clone(), style);
            flow.estimate.lines.push(styled.clone());
            if line.trim().is_empty() {
                layout.push(Break::new(1));
            } else {
                let mut paragraph = Paragraph::default();
                paragraph.push(styled);
                layout.push(paragraph);
            }
        }

        flow.push(layout.padded(Margins::trbl(0, 0, 0, 2)));
        self.spacing(flow);
    }

    fn table(&self, node: &NodeRef, context: Context, flow: &mut Flow) -> Result<(), Error> {
        self.flush(flow, context, Style::new());

        let rows: Vec<Vec<NodeRef>> = table_rows(node)
            .iter()
            .map(|row| element_children(row, &["td", "th"]).collect())
            .collect();
        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        if columns == 0 {
            return Ok(());
        }

        let mut table = TableLayout::new(column_weights(rows.first(), columns));
        if is_bordered(node) {
            table.set_cell_decorator(FrameCellDecorator::new(true, true, false));
        }

        for cells in &rows {
            let mut longest = StyledString::new(String::new(), Style::new());
            let mut elements: Vec<Box<dyn Element>> = Vec::with_capacity(columns);

            for cell in cells {
                let mut inner = aligned(context, cell);
                if tag_name(cell).as_deref() == Some("th") {
                    inner.inline.bold = true;
                }
                let (layout, estimate) = self.flow(cell, inner)?.finish();
                flow.estimate.extra_height += estimate.extra_height;
                for line in estimate.lines {
                    if line.s.len() > longest.s.len() {
                        longest = line;
                    }
                }
                elements.push(Box::new(layout.padded(Margins::trbl(0, 1, 0, 1))));
            }
            while elements.len() < columns {
                elements.push(Box::new(Paragraph::new("")));
            }

            let mut row = table.row();
            for element in elements {
                row = row.element(BoxedElement::from(element));
            }
            row.push()?;
            flow.estimate.lines.push(longest);
        }

        flow.push(table);
        self.spacing(flow);
        Ok(())
    }

    fn figure(&self, node: &NodeRef, context: Context, flow: &mut Flow) -> Result<(), Error> {
        let image = node.select_first("img").ok();
        let caption = node.select_first("figcaption").ok();

        if let (Some(image), Some(caption)) = (image, caption) {
            if let Some((image, size)) = self.load_image(image.as_node()) {
                self.flush(flow, context, Style::new());
                let text = collapse_whitespace(&caption.as_node().text_contents());
                let style = Style::new().italic();
                flow.estimate.extra_height += mm_to_f64(size.height);
                flow.estimate.lines.push(StyledString::new(text.clone(), style));
                flow.push(CaptionedImage::new(
                    image,
                    Paragraph::new(StyledString::new(text, style)),
                ));
                self.spacing(flow);
                return Ok(());
            }
        }

        self.division(node, context, flow)
    }

    fn load_image(&self, node: &NodeRef) -> Option<(Image, Size)> {
        let src = attribute(node, "src")?.trim().to_string();
        if src.is_empty() {
            return None;
        }
        if src.starts_with("data:") || src.contains("://") {
            warn!("Skipping non-local image '{}'", src);
            return None;
        }

        let path = match self.base_dir {
            Some(base) if Path::new(&src).is_relative() => base.join(&src),
            _ => PathBuf::from(&src),
        };
        match fitted_image(&path, self.content_width) {
            Ok(loaded) => Some(loaded),
            Err(err) => {
                warn!("Skipping image {}: {}", path.display(), err);
                None
            }
        }
    }
}

fn is_hidden(node: &NodeRef, tag: &str) -> bool {
    if SKIPPED_TAGS.contains(&tag) {
        return true;
    }
    if matches!(
        attribute(node, "id").as_deref(),
        Some("pdf-header") | Some("pdf-footer")
    ) {
        return true;
    }
    attribute(node, "hidden").is_some()
        || class_list(node)
            .iter()
            .any(|class| class == "hidden" || class.ends_with("-hidden"))
}

fn aligned(context: Context, node: &NodeRef) -> Context {
    let declared = attribute(node, "align").or_else(|| {
        attribute(node, "style").and_then(|style| {
            style.split(';').find_map(|declaration| {
                let (property, value) = declaration.split_once(':')?;
                (property.trim() == "text-align").then(|| value.trim().to_string())
            })
        })
    });

    let alignment = match declared.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("center") => Alignment::Center,
        Some("right") => Alignment::Right,
        Some("left") | Some("justify") => Alignment::Left,
        _ => context.alignment,
    };
    Context {
        alignment,
        ..context
    }
}

fn element_children<'t>(
    node: &NodeRef,
    tags: &'t [&'t str],
) -> impl Iterator<Item = NodeRef> + 't {
    node.children().filter(move |child| {
        tag_name(child)
            .map(|tag| tags.contains(&tag.as_str()))
            .unwrap_or(false)
    })
}

fn table_rows(table: &NodeRef) -> Vec<NodeRef> {
    let mut rows = Vec::new();
    for child in table.children() {
        match tag_name(&child).as_deref() {
            Some("tr") => rows.push(child),
            Some("thead") | Some("tbody") | Some("tfoot") => {
                rows.extend(element_children(&child, &["tr"]))
            }
            _ => {}
        }
    }
    rows
}

fn is_bordered(table: &NodeRef) -> bool {
    let border = attribute(table, "border")
        .map(|value| value.trim() != "0")
        .unwrap_or(false);
    border || has_class(table, "bordered") || has_class(table, "grid")
}

fn parse_percent(value: &str) -> Option<usize> {
    let number = value.trim().strip_suffix('%')?;
    let parsed: f64 = number.trim().parse().ok()?;
    (parsed > 0.0).then(|| parsed.round() as usize)
}

/// Column weights from `width="N%"` attributes of the first row; the remaining share is split
/// evenly between columns without one.
fn column_weights(first_row: Option<&Vec<NodeRef>>, columns: usize) -> Vec<usize> {
    let declared: Vec<Option<usize>> = (0..columns)
        .map(|index| {
            first_row
                .and_then(|row| row.get(index))
                .and_then(|cell| attribute(cell, "width"))
                .and_then(|width| parse_percent(&width))
        })
        .collect();

    let used: usize = declared.iter().flatten().sum();
    let free = declared.iter().filter(|weight| weight.is_none()).count();
    let share = if free == 0 {
        0
    } else {
        (100usize.saturating_sub(used) / free).max(1)
    };

    declared
        .into_iter()
        .map(|weight| weight.unwrap_or(share).max(1))
        .collect()
}
