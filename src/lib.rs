//! Core entry point for the pdf_assembly crate.
//!
//! An [`Assembler`] turns a [`SummaryDocument`] (a tree of HTML pages) into one PDF with an
//! optional cover, a table of contents, stamped page numbers and a bookmark outline.

pub mod assembler;
pub mod bookmarks;
pub mod builder;
pub mod elements;
pub mod error;
pub mod fetch;
pub mod fonts;
pub mod html;
pub mod layout;
pub mod model;
pub mod offsets;
pub mod placeholders;
pub mod renderer;
pub mod richtext;
pub mod templates;
pub mod toc;
pub mod walker;
pub mod writer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use assembler::{Assembler, AssemblerBuilder, AssemblyReport, BuildStage, PartPlacement};
pub use error::AssemblyError;
pub use fetch::{ContentFetcher, DirectoryFetcher, DocumentFormat, FetchError};
pub use layout::{GenpdfLayoutEngine, LaidOutDocument, LayoutEngine, LayoutError};
pub use model::{SummaryDocument, SummaryEntry};
pub use placeholders::{DocumentPlaceholder, PlaceholderAccessor};
pub use writer::{CancellationToken, WriteError, WriteProgress};
