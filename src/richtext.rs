//! Utilities for working with styled text fragments.
//!
//! The types in this module provide a light-weight representation of text "spans" that carry a
//! subset of the styling information supported by [`genpdf`][genpdf]. The HTML converter collects
//! inline content into spans with [`SpanCollector`], which also applies HTML whitespace
//! collapsing, before handing them to [`genpdf::elements::Paragraph`].
//!
//! [genpdf]: https://docs.rs/genpdf/

use genpdf::style::{Color, Style, StyledString};

/// A slice of text together with inline style attributes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Span {
    text: String,
    bold: bool,
    italic: bool,
    color: Option<Color>,
}

impl Span {
    /// Creates a new span with the provided text and no styles applied.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Returns the raw text contained in this span.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns whether the span should be rendered in bold.
    pub fn is_bold(&self) -> bool {
        self.bold
    }

    /// Returns whether the span should be rendered in italic.
    pub fn is_italic(&self) -> bool {
        self.italic
    }

    /// Returns the configured color for the span, if any.
    pub fn color(&self) -> Option<Color> {
        self.color
    }

    /// Sets the bold flag and returns the updated span.
    pub fn with_bold(mut self, bold: bool) -> Self {
        self.bold = bold;
        self
    }

    /// Sets the italic flag and returns the updated span.
    pub fn with_italic(mut self, italic: bool) -> Self {
        self.italic = italic;
        self
    }

    /// Sets the span color and returns the updated span.
    pub fn with_color(mut self, color: Option<Color>) -> Self {
        self.color = color;
        self
    }

    /// Convenience shorthand that marks the span as bold.
    pub fn bold(self) -> Self {
        self.with_bold(true)
    }

    /// Convenience shorthand that marks the span as italic.
    pub fn italic(self) -> Self {
        self.with_italic(true)
    }

    /// Builds a [`Style`] representation for the span.
    fn to_style(&self) -> Style {
        let mut style = Style::new();
        if let Some(color) = self.color {
            style.set_color(color);
        }
        if self.bold {
            style.set_bold();
        }
        if self.italic {
            style.set_italic();
        }
        style
    }

    /// Converts the span to a [`StyledString`].
    pub fn to_styled_string(&self) -> StyledString {
        StyledString::new(self.text.clone(), self.to_style())
    }
}

impl From<&Span> for StyledString {
    fn from(span: &Span) -> Self {
        span.to_styled_string()
    }
}

impl From<Span> for StyledString {
    fn from(span: Span) -> Self {
        span.to_styled_string()
    }
}

/// Inline formatting in effect while walking nested inline elements.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InlineStyle {
    pub bold: bool,
    pub italic: bool,
    pub color: Option<Color>,
}

impl InlineStyle {
    fn span(&self, text: impl Into<String>) -> Span {
        Span::new(text)
            .with_bold(self.bold)
            .with_italic(self.italic)
            .with_color(self.color)
    }
}

/// Accumulates inline text into spans, collapsing whitespace the way HTML does.
///
/// Runs of whitespace become a single space, also across span boundaries, and leading and
/// trailing whitespace of the whole run is dropped by [`finish`](SpanCollector::finish).
#[derive(Debug, Default)]
pub struct SpanCollector {
    spans: Vec<Span>,
    pending_space: bool,
}

impl SpanCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `text` using `style`.
    pub fn push_text(&mut self, text: &str, style: InlineStyle) {
        for (index, word) in text.split_whitespace().enumerate() {
            if index > 0 || (self.pending_space || text.starts_with(char::is_whitespace)) {
                self.push_separator(style);
            }
            self.push_raw(word, style);
        }
        if text.ends_with(char::is_whitespace) {
            self.pending_space = true;
        }
    }

    fn push_separator(&mut self, style: InlineStyle) {
        self.pending_space = false;
        if !self.spans.is_empty() {
            self.push_raw(" ", style);
        }
    }

    fn push_raw(&mut self, text: &str, style: InlineStyle) {
        self.pending_space = false;
        if text.is_empty() {
            return;
        }
        match self.spans.last_mut() {
            Some(last) if last.bold == style.bold
                && last.italic == style.italic
                && last.color == style.color =>
            {
                last.text.push_str(text)
            }
            _ => self.spans.push(style.span(text)),
        }
    }

    /// Whether any visible text has been collected.
    pub fn is_empty(&self) -> bool {
        self.spans.iter().all(|span| span.text.trim().is_empty())
    }

    /// Plain text of everything collected so far.
    pub fn plain_text(&self) -> String {
        self.spans.iter().map(Span::text).collect()
    }

    /// Returns the collected spans and resets the collector.
    pub fn finish(&mut self) -> Vec<Span> {
        self.pending_space = false;
        let mut spans = std::mem::take(&mut self.spans);
        if let Some(last) = spans.last_mut() {
            let trimmed = last.text.trim_end().len();
            last.text.truncate(trimmed);
        }
        spans.retain(|span| !span.text.is_empty());
        spans
    }
}

/// Converts a collection of spans into styled strings.
pub fn spans_to_styled_strings<'a, I>(spans: I) -> Vec<StyledString>
where
    I: IntoIterator<Item = &'a Span>,
{
    spans.into_iter().map(Span::to_styled_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_to_style_reflects_flags() {
        let span = Span::new("Hello")
            .bold()
            .italic()
            .with_color(Some(Color::Rgb(10, 20, 30)));
        let styled = span.to_styled_string();
        assert!(styled.style.is_bold());
        assert!(styled.style.is_italic());
        assert_eq!(styled.style.color(), Some(Color::Rgb(10, 20, 30)));
    }

    #[test]
    fn whitespace_is_collapsed_across_spans() {
        let plain = InlineStyle::default();
        let bold = InlineStyle {
            bold: true,
            ..InlineStyle::default()
        };

        let mut collector = SpanCollector::new();
        collector.push_text("\n  Hello,   ", plain);
        collector.push_text(" big ", bold);
        collector.push_text("\tworld \n", plain);

        let spans = collector.finish();
        let text: String = spans.iter().map(Span::text).collect();
        assert_eq!(text, "Hello, big world");
        assert_eq!(spans.len(), 3);
        assert!(spans[1].is_bold());
    }

    #[test]
    fn adjacent_text_without_whitespace_stays_joined() {
        let mut collector = SpanCollector::new();
        collector.push_text("foo", InlineStyle::default());
        collector.push_text("bar", InlineStyle::default());
        assert_eq!(collector.plain_text(), "foobar");
        assert_eq!(collector.finish().len(), 1);
    }

    #[test]
    fn whitespace_only_input_is_empty() {
        let mut collector = SpanCollector::new();
        collector.push_text("   \n ", InlineStyle::default());
        assert!(collector.is_empty());
        assert!(collector.finish().is_empty());
    }
}
