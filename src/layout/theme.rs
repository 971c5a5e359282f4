//! Stylesheet themes understood by the genpdf layout engine.
//!
//! The engine does not interpret CSS. A stylesheet `href` selects a registered [`StyleRules`]
//! entry instead, and the rules of every linked stylesheet are applied in link order on top of
//! [`Theme::default`].

use std::collections::BTreeMap;

use genpdf::style::Color;
use genpdf::{Alignment, Margins, Mm};

use crate::placeholders::DEFAULT_STYLESHEET;

/// Page structure linked from every content page.
pub const PAGE_STRUCT_STYLESHEET: &str = "pdf/page/page-struct.css";

/// Page structure linked from the cover.
pub const COVER_STRUCT_STYLESHEET: &str = "pdf/cover/cover-struct.css";

/// Page margins in millimetres.
///
/// Kept separately from [`Margins`], whose sides cannot be read back, since the content width
/// is derived from the left and right margin.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageMargins {
    pub top: Mm,
    pub right: Mm,
    pub bottom: Mm,
    pub left: Mm,
}

impl PageMargins {
    pub fn trbl(
        top: impl Into<Mm>,
        right: impl Into<Mm>,
        bottom: impl Into<Mm>,
        left: impl Into<Mm>,
    ) -> Self {
        Self {
            top: top.into(),
            right: right.into(),
            bottom: bottom.into(),
            left: left.into(),
        }
    }

    pub fn all(value: impl Into<Mm>) -> Self {
        let value = value.into();
        Self::trbl(value, value, value, value)
    }

    /// Width left between the side margins on a page `page_width` wide.
    pub fn content_width(&self, page_width: Mm) -> Mm {
        page_width - self.left - self.right
    }
}

impl From<PageMargins> for Margins {
    fn from(margins: PageMargins) -> Self {
        Margins::trbl(margins.top, margins.right, margins.bottom, margins.left)
    }
}

/// Fully resolved styling for one document.
#[derive(Clone, Debug)]
pub struct Theme {
    pub font_size: u8,
    pub line_spacing: f64,
    pub margins: PageMargins,
    pub heading_sizes: [u8; 6],
    pub text_color: Color,
    pub heading_color: Color,
    pub accent_color: Color,
    pub alignment: Alignment,
    pub chrome_font_size: u8,
    /// Vertical gap after block elements, in lines.
    pub block_spacing: f64,
    /// Left indentation of nested lists, in millimetres.
    pub list_indent: f64,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            font_size: 10,
            line_spacing: 1.2,
            margins: PageMargins::all(15),
            heading_sizes: [20, 16, 14, 12, 11, 10],
            text_color: Color::Rgb(0, 0, 0),
            heading_color: Color::Rgb(0, 0, 0),
            accent_color: Color::Rgb(0, 0, 0),
            alignment: Alignment::Left,
            chrome_font_size: 8,
            block_spacing: 0.5,
            list_indent: 6.0,
        }
    }
}

impl Theme {
    /// Applies `rules` on top of the current values.
    pub fn apply(&mut self, rules: &StyleRules) {
        if let Some(font_size) = rules.font_size {
            self.font_size = font_size;
        }
        if let Some(line_spacing) = rules.line_spacing {
            self.line_spacing = line_spacing;
        }
        if let Some(margins) = rules.margins {
            self.margins = margins;
        }
        if let Some(heading_sizes) = rules.heading_sizes {
            self.heading_sizes = heading_sizes;
        }
        if let Some(color) = rules.text_color {
            self.text_color = color;
        }
        if let Some(color) = rules.heading_color {
            self.heading_color = color;
        }
        if let Some(color) = rules.accent_color {
            self.accent_color = color;
        }
        if let Some(alignment) = rules.alignment {
            self.alignment = alignment;
        }
        if let Some(size) = rules.chrome_font_size {
            self.chrome_font_size = size;
        }
        if let Some(spacing) = rules.block_spacing {
            self.block_spacing = spacing;
        }
    }

    /// Font size of a heading level (1 to 6).
    pub fn heading_size(&self, level: usize) -> u8 {
        self.heading_sizes[level.clamp(1, 6) - 1]
    }
}

/// Partial styling contributed by one stylesheet.
#[derive(Clone, Debug, Default)]
pub struct StyleRules {
    pub font_size: Option<u8>,
    pub line_spacing: Option<f64>,
    pub margins: Option<PageMargins>,
    pub heading_sizes: Option<[u8; 6]>,
    pub text_color: Option<Color>,
    pub heading_color: Option<Color>,
    pub accent_color: Option<Color>,
    pub alignment: Option<Alignment>,
    pub chrome_font_size: Option<u8>,
    pub block_spacing: Option<f64>,
}

/// Stylesheets known to the engine out of the box, keyed by href.
pub(crate) fn builtin_stylesheets() -> BTreeMap<String, StyleRules> {
    let mut sheets = BTreeMap::new();

    sheets.insert(
        PAGE_STRUCT_STYLESHEET.to_string(),
        StyleRules {
            margins: Some(PageMargins::trbl(18, 18, 15, 18)),
            ..StyleRules::default()
        },
    );
    sheets.insert(
        COVER_STRUCT_STYLESHEET.to_string(),
        StyleRules {
            margins: Some(PageMargins::trbl(60, 25, 20, 25)),
            alignment: Some(Alignment::Center),
            heading_sizes: Some([28, 18, 14, 12, 11, 10]),
            ..StyleRules::default()
        },
    );
    sheets.insert(
        DEFAULT_STYLESHEET.to_string(),
        StyleRules {
            font_size: Some(10),
            line_spacing: Some(1.25),
            text_color: Some(Color::Rgb(33, 33, 33)),
            heading_color: Some(Color::Rgb(20, 60, 110)),
            accent_color: Some(Color::Rgb(90, 90, 90)),
            ..StyleRules::default()
        },
    );

    sheets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_apply_in_order() {
        let sheets = builtin_stylesheets();
        let mut theme = Theme::default();
        theme.apply(&sheets[COVER_STRUCT_STYLESHEET]);
        theme.apply(&sheets[DEFAULT_STYLESHEET]);

        assert_eq!(theme.alignment, Alignment::Center);
        assert_eq!(theme.heading_size(1), 28);
        assert_eq!(theme.line_spacing, 1.25);

        theme.apply(&StyleRules {
            font_size: Some(12),
            ..StyleRules::default()
        });
        assert_eq!(theme.font_size, 12);
        assert_eq!(theme.heading_size(1), 28);
    }

    #[test]
    fn content_width_subtracts_side_margins() {
        let sheets = builtin_stylesheets();
        let mut theme = Theme::default();
        theme.apply(&sheets[COVER_STRUCT_STYLESHEET]);

        assert_eq!(theme.margins.left, Mm::from(25));
        assert_eq!(theme.margins.content_width(Mm::from(210)), Mm::from(160));
        assert_eq!(
            PageMargins::all(15).content_width(Mm::from(210)),
            Mm::from(180)
        );
    }

    #[test]
    fn heading_level_is_clamped() {
        let theme = Theme::default();
        assert_eq!(theme.heading_size(0), 20);
        assert_eq!(theme.heading_size(9), 10);
    }
}
