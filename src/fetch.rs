//! Retrieval of the HTML content behind summary entries.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use log::debug;
use walkdir::WalkDir;

/// Output format the content is requested for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentFormat {
    Html,
    Pdf,
}

/// Errors reported by a [`ContentFetcher`].
#[derive(Debug)]
pub enum FetchError {
    /// No page with the given id exists in the requested language.
    NotFound { page_id: String, language: String },
    /// The caller is not allowed to read the package.
    AccessDenied { package: String },
    /// The page exists but could not be read.
    Io(io::Error),
}

impl From<io::Error> for FetchError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { page_id, language } => {
                write!(f, "Page '{}' not found for language '{}'", page_id, language)
            }
            Self::AccessDenied { package } => write!(f, "Access to package '{}' denied", package),
            Self::Io(err) => write!(f, "Failed to read page: {err}"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::NotFound { .. } | Self::AccessDenied { .. } => None,
        }
    }
}

/// Source of the HTML fragment for each summary entry.
///
/// Implementations are called once per entry, in summary order, and are never retried.
pub trait ContentFetcher {
    fn fetch(
        &self,
        package: &str,
        page_id: &str,
        language: &str,
        format: DocumentFormat,
    ) -> Result<String, FetchError>;
}

impl<F: ContentFetcher + ?Sized> ContentFetcher for &F {
    fn fetch(
        &self,
        package: &str,
        page_id: &str,
        language: &str,
        format: DocumentFormat,
    ) -> Result<String, FetchError> {
        (**self).fetch(package, page_id, language, format)
    }
}

/// Reads pages from a directory of packages laid out as
/// `<root>/<package>/docs/<language>/pages/<page_id>.html`.
#[derive(Clone, Debug)]
pub struct DirectoryFetcher {
    root: PathBuf,
    search: bool,
    allowed_packages: Option<BTreeSet<String>>,
}

impl DirectoryFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            search: false,
            allowed_packages: None,
        }
    }

    /// Looks for `<page_id>.html` anywhere below the language's pages directory instead of
    /// expecting it directly inside it.
    pub fn with_search(mut self, search: bool) -> Self {
        self.search = search;
        self
    }

    /// Restricts the fetcher to the given packages; others fail with
    /// [`FetchError::AccessDenied`].
    pub fn with_allowed_packages<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_packages = Some(packages.into_iter().map(Into::into).collect());
        self
    }

    fn pages_directory(&self, package: &str, language: &str) -> PathBuf {
        self.root
            .join(package)
            .join("docs")
            .join(language)
            .join("pages")
    }

    fn locate(&self, package: &str, page_id: &str, language: &str) -> Option<PathBuf> {
        let directory = self.pages_directory(package, language);
        let file_name = format!("{page_id}.html");

        if !self.search {
            let path = directory.join(&file_name);
            return path.is_file().then_some(path);
        }

        WalkDir::new(&directory)
            .follow_links(false)
            .into_iter()
            .filter_map(Result::ok)
            .find(|entry| entry.file_type().is_file() && entry.file_name() == file_name.as_str())
            .map(|entry| entry.into_path())
    }
}

fn is_plain_segment(value: &str) -> bool {
    let mut components = Path::new(value).components();
    matches!(components.next(), Some(Component::Normal(_))) && components.next().is_none()
}

impl ContentFetcher for DirectoryFetcher {
    fn fetch(
        &self,
        package: &str,
        page_id: &str,
        language: &str,
        format: DocumentFormat,
    ) -> Result<String, FetchError> {
        if let Some(allowed) = &self.allowed_packages {
            if !allowed.contains(package) {
                return Err(FetchError::AccessDenied {
                    package: package.to_string(),
                });
            }
        }
        if !is_plain_segment(package) {
            return Err(FetchError::AccessDenied {
                package: package.to_string(),
            });
        }

        let not_found = || FetchError::NotFound {
            page_id: page_id.to_string(),
            language: language.to_string(),
        };
        if !is_plain_segment(page_id) || !is_plain_segment(language) {
            return Err(not_found());
        }

        let path = self.locate(package, page_id, language).ok_or_else(not_found)?;
        debug!("Fetching {:?} content for '{}' from {}", format, page_id, path.display());
        Ok(fs::read_to_string(path)?)
    }
}
