//! Document placeholders: values supplied by the caller and substituted into template fragments.

use std::collections::{BTreeMap, HashMap};

/// Cover footer used when the caller does not provide one.
pub const DEFAULT_COVER_FOOTER: &str = "Powered by https://docetproject.org/";

/// Theme stylesheet linked from every page when the caller does not provide one.
pub const DEFAULT_STYLESHEET: &str = "pdf/theme.css";

/// Keys a [`PlaceholderAccessor`] is asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DocumentPlaceholder {
    ProductName,
    ProductVersion,
    CoverSubtitle,
    FooterPage,
    FooterCover,
    CoverImage,
    /// Href of the theme stylesheet linked from every page.
    PdfCss,
}

/// Caller-supplied source of placeholder values.
///
/// `None` means "not configured" and selects the library default.
pub trait PlaceholderAccessor {
    fn resolve(&self, key: DocumentPlaceholder, language: &str) -> Option<String>;
}

/// Accessor that never configures anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPlaceholders;

impl PlaceholderAccessor for NoPlaceholders {
    fn resolve(&self, _key: DocumentPlaceholder, _language: &str) -> Option<String> {
        None
    }
}

/// Language-independent values.
impl PlaceholderAccessor for HashMap<DocumentPlaceholder, String> {
    fn resolve(&self, key: DocumentPlaceholder, _language: &str) -> Option<String> {
        self.get(&key).cloned()
    }
}

/// Language-independent values.
impl PlaceholderAccessor for BTreeMap<DocumentPlaceholder, String> {
    fn resolve(&self, key: DocumentPlaceholder, _language: &str) -> Option<String> {
        self.get(&key).cloned()
    }
}

/// Tokens that may appear as `${NAME}` inside template fragments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Placeholder {
    ProductName,
    ProductVersion,
    Title,
    Subtitle,
    FooterText,
    CoverFooterText,
    CoverImage,
    Stylesheet,
}

impl Placeholder {
    pub const ALL: [Placeholder; 8] = [
        Placeholder::ProductName,
        Placeholder::ProductVersion,
        Placeholder::Title,
        Placeholder::Subtitle,
        Placeholder::FooterText,
        Placeholder::CoverFooterText,
        Placeholder::CoverImage,
        Placeholder::Stylesheet,
    ];

    /// Name used between `${` and `}` in templates.
    pub fn token(self) -> &'static str {
        match self {
            Placeholder::ProductName => "PRODUCT_NAME",
            Placeholder::ProductVersion => "PRODUCT_VERSION",
            Placeholder::Title => "TITLE",
            Placeholder::Subtitle => "SUBTITLE",
            Placeholder::FooterText => "FOOTER_TEXT",
            Placeholder::CoverFooterText => "COVER_FOOTER_TEXT",
            Placeholder::CoverImage => "COVER_IMAGE",
            Placeholder::Stylesheet => "STYLESHEET",
        }
    }
}

/// Resolved placeholder values of one build. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Placeholders {
    values: BTreeMap<Placeholder, String>,
}

impl Placeholders {
    /// Resolves every placeholder through `accessor`, falling back to the library defaults.
    pub fn resolve(accessor: &dyn PlaceholderAccessor, language: &str, title: &str) -> Self {
        let lookup = |key, fallback: &dyn Fn() -> String| {
            accessor.resolve(key, language).unwrap_or_else(fallback)
        };

        let product_name = lookup(DocumentPlaceholder::ProductName, &String::new);
        let product_version = lookup(DocumentPlaceholder::ProductVersion, &String::new);
        let footer_text = lookup(DocumentPlaceholder::FooterPage, &|| {
            if title.is_empty() {
                format!("{} {}", product_name, product_version)
            } else {
                format!("{} {} - {}", product_name, product_version, title)
            }
        });

        let mut values = BTreeMap::new();
        values.insert(Placeholder::Title, title.to_string());
        values.insert(
            Placeholder::Subtitle,
            lookup(DocumentPlaceholder::CoverSubtitle, &String::new),
        );
        values.insert(Placeholder::FooterText, footer_text);
        values.insert(
            Placeholder::CoverFooterText,
            lookup(DocumentPlaceholder::FooterCover, &|| {
                DEFAULT_COVER_FOOTER.to_string()
            }),
        );
        values.insert(
            Placeholder::CoverImage,
            lookup(DocumentPlaceholder::CoverImage, &String::new),
        );
        values.insert(
            Placeholder::Stylesheet,
            lookup(DocumentPlaceholder::PdfCss, &|| DEFAULT_STYLESHEET.to_string()),
        );
        values.insert(Placeholder::ProductName, product_name);
        values.insert(Placeholder::ProductVersion, product_version);

        Self { values }
    }

    /// Value of `placeholder`; unset values are empty.
    pub fn get(&self, placeholder: Placeholder) -> &str {
        self.values
            .get(&placeholder)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Replaces every `${TOKEN}` in `fragment` literally, without any escaping.
    pub fn substitute(&self, fragment: &str) -> String {
        let mut output = fragment.to_string();
        for placeholder in Placeholder::ALL {
            let token = format!("${{{}}}", placeholder.token());
            if output.contains(&token) {
                output = output.replace(&token, self.get(placeholder));
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_accessor_values() {
        let placeholders = Placeholders::resolve(&NoPlaceholders, "en", "");
        assert_eq!(placeholders.get(Placeholder::ProductName), "");
        assert_eq!(placeholders.get(Placeholder::FooterText), " ");
        assert_eq!(
            placeholders.get(Placeholder::CoverFooterText),
            DEFAULT_COVER_FOOTER
        );
        assert_eq!(placeholders.get(Placeholder::CoverImage), "");
        assert_eq!(placeholders.get(Placeholder::Stylesheet), DEFAULT_STYLESHEET);
    }

    #[test]
    fn footer_includes_title_when_present() {
        let mut values = HashMap::new();
        values.insert(DocumentPlaceholder::ProductName, "Docs".to_string());
        values.insert(DocumentPlaceholder::ProductVersion, "2.1".to_string());

        let placeholders = Placeholders::resolve(&values, "en", "Admin Guide");
        assert_eq!(
            placeholders.get(Placeholder::FooterText),
            "Docs 2.1 - Admin Guide"
        );

        let untitled = Placeholders::resolve(&values, "en", "");
        assert_eq!(untitled.get(Placeholder::FooterText), "Docs 2.1");
    }

    #[test]
    fn explicit_footer_wins_over_default() {
        let mut values = HashMap::new();
        values.insert(DocumentPlaceholder::FooterPage, "Confidential".to_string());
        let placeholders = Placeholders::resolve(&values, "en", "Guide");
        assert_eq!(placeholders.get(Placeholder::FooterText), "Confidential");
    }

    #[test]
    fn substitution_is_literal() {
        let mut values = HashMap::new();
        values.insert(DocumentPlaceholder::ProductName, "<b>$1</b>".to_string());
        let placeholders = Placeholders::resolve(&values, "en", "T");

        let output = placeholders.substitute("<p>${PRODUCT_NAME} / ${TITLE} / ${UNKNOWN}</p>");
        assert_eq!(output, "<p><b>$1</b> / T / ${UNKNOWN}</p>");
    }
}
