//! HTML fragments wrapped around every rendered part.
//!
//! The defaults are compiled into the crate from `templates/`. A directory with files of the same
//! names can override any of them.

use std::fs;
use std::io;
use std::path::Path;

use log::debug;

use crate::placeholders::Placeholders;

const PAGE_HEAD_FILE: &str = "page-head.html";
const HEADER_FOOTER_FILE: &str = "header-footer.html";
const COVER_HEAD_FILE: &str = "cover-head.html";
const COVER_FILE: &str = "cover.html";

/// Raw template fragments with `${NAME}` placeholders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Templates {
    page_head: String,
    header_footer: String,
    cover_head: String,
    cover: String,
}

impl Default for Templates {
    fn default() -> Self {
        Self {
            page_head: include_str!("../templates/page-head.html").to_string(),
            header_footer: include_str!("../templates/header-footer.html").to_string(),
            cover_head: include_str!("../templates/cover-head.html").to_string(),
            cover: include_str!("../templates/cover.html").to_string(),
        }
    }
}

impl Templates {
    /// Loads overrides from `directory`; files that do not exist keep their default.
    pub fn from_dir(directory: impl AsRef<Path>) -> io::Result<Self> {
        let directory = directory.as_ref();
        if !directory.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("template directory {} does not exist", directory.display()),
            ));
        }

        let mut templates = Self::default();
        for (file, slot) in [
            (PAGE_HEAD_FILE, &mut templates.page_head),
            (HEADER_FOOTER_FILE, &mut templates.header_footer),
            (COVER_HEAD_FILE, &mut templates.cover_head),
            (COVER_FILE, &mut templates.cover),
        ] {
            let path = directory.join(file);
            if path.is_file() {
                debug!("Using template override {}", path.display());
                *slot = fs::read_to_string(&path)?;
            }
        }
        Ok(templates)
    }

    /// Stylesheet links appended to the head of every page.
    pub fn page_head(&self) -> &str {
        &self.page_head
    }

    /// Running header and footer markup prepended to the body of every page.
    pub fn header_footer(&self) -> &str {
        &self.header_footer
    }

    /// Stylesheet links appended to the head of the cover.
    pub fn cover_head(&self) -> &str {
        &self.cover_head
    }

    /// Body markup of the cover.
    pub fn cover(&self) -> &str {
        &self.cover
    }

    /// Substitutes `placeholders` into every fragment.
    pub fn resolve(&self, placeholders: &Placeholders) -> Chrome {
        Chrome {
            page_head: placeholders.substitute(&self.page_head),
            header_footer: placeholders.substitute(&self.header_footer),
            cover_head: placeholders.substitute(&self.cover_head),
            cover: placeholders.substitute(&self.cover),
        }
    }
}

/// Template fragments with placeholders already substituted, ready to be parsed per part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chrome {
    pub page_head: String,
    pub header_footer: String,
    pub cover_head: String,
    pub cover: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placeholders::{DocumentPlaceholder, Placeholders};
    use std::collections::HashMap;

    #[test]
    fn defaults_reference_known_placeholders() {
        let templates = Templates::default();
        assert!(templates.page_head().contains("${STYLESHEET}"));
        assert!(templates.header_footer().contains("pdf-header"));
        assert!(templates.header_footer().contains("${FOOTER_TEXT}"));
        assert!(templates.cover().contains("${COVER_FOOTER_TEXT}"));
    }

    #[test]
    fn resolve_substitutes_all_fragments() {
        let mut values = HashMap::new();
        values.insert(DocumentPlaceholder::ProductName, "Widget".to_string());
        let placeholders = Placeholders::resolve(&values, "en", "Manual");

        let chrome = Templates::default().resolve(&placeholders);
        assert!(chrome.cover.contains("Manual"));
        assert!(chrome.header_footer.contains("Widget"));
        assert!(!chrome.page_head.contains("${"));
    }

    #[test]
    fn directory_overrides_single_fragment() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(COVER_FILE), "<p>${TITLE}</p>").unwrap();

        let templates = Templates::from_dir(dir.path()).unwrap();
        assert_eq!(templates.cover(), "<p>${TITLE}</p>");
        assert_eq!(templates.page_head(), Templates::default().page_head());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Templates::from_dir(dir.path().join("nope")).is_err());
    }
}
