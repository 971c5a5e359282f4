//! The single error type returned by an assembly build.
//!
//! Every stage wraps its own failure ([`FetchError`], [`LayoutError`], [`WriteError`]) into an
//! [`AssemblyError`] so callers only have to match on one enum. The build is fail-fast: the first
//! error aborts it and nothing is written to the output sink.

use std::fmt;

use crate::fetch::FetchError;
use crate::layout::LayoutError;
use crate::writer::WriteError;

/// Errors that abort an assembly build.
#[derive(Debug)]
pub enum AssemblyError {
    /// The summary had no entries, so there is nothing to assemble.
    EmptySummary,
    /// Content for a summary entry could not be retrieved.
    ContentFetch {
        /// Page id of the summary entry whose content was requested.
        page_id: String,
        /// Failure reported by the content fetcher.
        source: FetchError,
    },
    /// A part could not be laid out into pages.
    Layout(LayoutError),
    /// The assembled document could not be written.
    Write(WriteError),
    /// The build was cancelled through its cancellation token.
    Cancelled,
    /// Template fragments could not be loaded.
    Template(String),
    /// Fonts required by the layout engine could not be loaded.
    Font(genpdf::error::Error),
}

impl From<LayoutError> for AssemblyError {
    fn from(err: LayoutError) -> Self {
        Self::Layout(err)
    }
}

impl From<WriteError> for AssemblyError {
    fn from(err: WriteError) -> Self {
        match err {
            WriteError::Cancelled { .. } => Self::Cancelled,
            other => Self::Write(other),
        }
    }
}

impl From<genpdf::error::Error> for AssemblyError {
    fn from(err: genpdf::error::Error) -> Self {
        Self::Font(err)
    }
}

impl fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySummary => write!(f, "Summary does not contain any entries"),
            Self::ContentFetch { page_id, .. } => {
                write!(f, "Failed to fetch content for page '{}'", page_id)
            }
            Self::Layout(err) => write!(f, "Layout failed: {err}"),
            Self::Write(err) => write!(f, "Failed to write PDF: {err}"),
            Self::Cancelled => write!(f, "Build was cancelled"),
            Self::Template(message) => write!(f, "Template error: {message}"),
            Self::Font(err) => write!(f, "Failed to load fonts: {err}"),
        }
    }
}

impl std::error::Error for AssemblyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ContentFetch { source, .. } => Some(source),
            Self::Layout(err) => Some(err),
            Self::Write(err) => Some(err),
            Self::Font(err) => Some(err),
            Self::EmptySummary | Self::Cancelled | Self::Template(_) => None,
        }
    }
}
