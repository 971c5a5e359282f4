//! Orchestration of a whole build, from the summary tree to the bytes in the output sink.
//!
//! A build moves through the [`BuildStage`]s strictly in order. The first error moves it to
//! [`BuildStage::Failed`] and is returned; the sink only receives a complete document.

use std::cell::RefCell;
use std::io::Write;
use std::path::PathBuf;

use log::{error, info};

use crate::bookmarks::{build_outline, Outline};
use crate::error::AssemblyError;
use crate::fetch::ContentFetcher;
use crate::layout::LayoutEngine;
use crate::model::{DocumentParts, Part, SummaryDocument};
use crate::offsets::assign_page_offsets;
use crate::placeholders::{NoPlaceholders, PlaceholderAccessor, Placeholders};
use crate::renderer::PartRenderer;
use crate::templates::Templates;
use crate::toc::{bullet_labels, size_toc};
use crate::walker;
use crate::writer::{CancellationToken, PdfWriter, WriteError, WriteProgress};

/// Default heading of the TOC page.
pub const DEFAULT_TOC_TITLE: &str = "Table of Contents";

/// Stages of a build, in the only order they may be entered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildStage {
    Init,
    FetchingContent,
    RenderingParts,
    SizingToc,
    AssigningOffsets,
    Writing,
    Done,
    Failed,
}

impl BuildStage {
    /// The stage that follows on success; terminal stages have none.
    pub fn next(self) -> Option<BuildStage> {
        match self {
            Self::Init => Some(Self::FetchingContent),
            Self::FetchingContent => Some(Self::RenderingParts),
            Self::RenderingParts => Some(Self::SizingToc),
            Self::SizingToc => Some(Self::AssigningOffsets),
            Self::AssigningOffsets => Some(Self::Writing),
            Self::Writing => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }
}

#[derive(Debug)]
struct BuildState {
    stage: BuildStage,
    visited: Vec<BuildStage>,
}

impl BuildState {
    fn new() -> Self {
        Self {
            stage: BuildStage::Init,
            visited: vec![BuildStage::Init],
        }
    }

    fn advance(&mut self, stage: BuildStage) {
        debug_assert_eq!(
            self.stage.next(),
            Some(stage),
            "build stages must not be skipped"
        );
        self.stage = stage;
        self.visited.push(stage);
    }

    fn fail(&mut self) {
        self.stage = BuildStage::Failed;
        self.visited.push(BuildStage::Failed);
    }

    fn into_visited(self) -> Vec<BuildStage> {
        self.visited
    }
}

/// Where one part ended up in the assembled document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartPlacement {
    pub id: String,
    pub name: String,
    pub level: usize,
    /// Bullet label shown in the TOC; cover and TOC have none.
    pub bullet: Option<String>,
    pub start_page: usize,
    pub page_count: usize,
}

/// Summary of a successful build.
#[derive(Clone, Debug)]
pub struct AssemblyReport {
    pub total_pages: usize,
    pub cover_pages: usize,
    pub toc_pages: usize,
    pub body_pages: usize,
    pub bytes_written: usize,
    /// Every part in output order.
    pub parts: Vec<PartPlacement>,
    /// The outline written into the document, when bookmarks are enabled.
    pub outline: Option<Outline>,
    pub stages: Vec<BuildStage>,
}

type ProgressCallback = dyn Fn(WriteProgress);

/// Configures an [`Assembler`].
pub struct AssemblerBuilder {
    render_cover: bool,
    render_toc: bool,
    render_bookmarks: bool,
    page_numbers: bool,
    toc_title: String,
    title: Option<String>,
    templates: Templates,
    templates_dir: Option<PathBuf>,
    placeholders: Box<dyn PlaceholderAccessor>,
    cancellation: CancellationToken,
    progress: Option<Box<ProgressCallback>>,
}

impl Default for AssemblerBuilder {
    fn default() -> Self {
        Self {
            render_cover: true,
            render_toc: true,
            render_bookmarks: true,
            page_numbers: true,
            toc_title: DEFAULT_TOC_TITLE.to_string(),
            title: None,
            templates: Templates::default(),
            templates_dir: None,
            placeholders: Box::new(NoPlaceholders),
            cancellation: CancellationToken::new(),
            progress: None,
        }
    }
}

impl AssemblerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cover(mut self, enabled: bool) -> Self {
        self.render_cover = enabled;
        self
    }

    pub fn with_toc(mut self, enabled: bool) -> Self {
        self.render_toc = enabled;
        self
    }

    pub fn with_bookmarks(mut self, enabled: bool) -> Self {
        self.render_bookmarks = enabled;
        self
    }

    /// Stamps `page / total` on every page after the cover.
    pub fn with_page_numbers(mut self, enabled: bool) -> Self {
        self.page_numbers = enabled;
        self
    }

    pub fn with_toc_title(mut self, title: impl Into<String>) -> Self {
        self.toc_title = title.into();
        self
    }

    /// Overrides the title taken from the summary document.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_templates(mut self, templates: Templates) -> Self {
        self.templates = templates;
        self
    }

    /// Loads template overrides from `directory` when the assembler is built.
    pub fn with_templates_dir(mut self, directory: impl Into<PathBuf>) -> Self {
        self.templates_dir = Some(directory.into());
        self
    }

    pub fn with_placeholders(mut self, accessor: impl PlaceholderAccessor + 'static) -> Self {
        self.placeholders = Box::new(accessor);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Called after every page written.
    pub fn with_progress(mut self, progress: impl Fn(WriteProgress) + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn build(self) -> Result<Assembler, AssemblyError> {
        let templates = match &self.templates_dir {
            Some(directory) => Templates::from_dir(directory).map_err(|err| {
                AssemblyError::Template(format!(
                    "Failed to load templates from {}: {}",
                    directory.display(),
                    err
                ))
            })?,
            None => self.templates,
        };

        Ok(Assembler {
            render_cover: self.render_cover,
            render_toc: self.render_toc,
            render_bookmarks: self.render_bookmarks,
            page_numbers: self.page_numbers,
            toc_title: self.toc_title,
            title: self.title,
            templates,
            placeholders: self.placeholders,
            cancellation: self.cancellation,
            progress: self.progress,
            last_stages: RefCell::new(Vec::new()),
        })
    }
}

/// Assembles summary documents into single PDFs.
pub struct Assembler {
    render_cover: bool,
    render_toc: bool,
    render_bookmarks: bool,
    page_numbers: bool,
    toc_title: String,
    title: Option<String>,
    templates: Templates,
    placeholders: Box<dyn PlaceholderAccessor>,
    cancellation: CancellationToken,
    progress: Option<Box<ProgressCallback>>,
    last_stages: RefCell<Vec<BuildStage>>,
}

impl Assembler {
    pub fn builder() -> AssemblerBuilder {
        AssemblerBuilder::new()
    }

    /// Token that cancels builds of this assembler.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Stages entered by the most recent build, ending in [`BuildStage::Done`] or
    /// [`BuildStage::Failed`]. Empty before the first build.
    pub fn last_stages(&self) -> Vec<BuildStage> {
        self.last_stages.borrow().clone()
    }

    /// Builds the PDF for `summary` and writes it to `out`.
    ///
    /// Content is fetched through `fetcher` and laid out by `engine`. On error nothing has been
    /// written to `out`.
    pub fn assemble(
        &self,
        summary: &SummaryDocument,
        fetcher: &dyn ContentFetcher,
        engine: &mut dyn LayoutEngine,
        out: &mut dyn Write,
    ) -> Result<AssemblyReport, AssemblyError> {
        let mut state = BuildState::new();
        let result = self.run(&mut state, summary, fetcher, engine, out);
        if let Err(err) = &result {
            error!(
                "Build of '{}' failed during {:?}: {}",
                summary.package(),
                state.stage,
                err
            );
            state.fail();
        }
        *self.last_stages.borrow_mut() = state.into_visited();
        result
    }

    fn run(
        &self,
        state: &mut BuildState,
        summary: &SummaryDocument,
        fetcher: &dyn ContentFetcher,
        engine: &mut dyn LayoutEngine,
        out: &mut dyn Write,
    ) -> Result<AssemblyReport, AssemblyError> {
        if summary.is_empty() {
            return Err(AssemblyError::EmptySummary);
        }

        let title = self
            .title
            .clone()
            .unwrap_or_else(|| summary.title().to_string());
        let placeholders =
            Placeholders::resolve(self.placeholders.as_ref(), summary.language(), &title);
        let chrome = self.templates.resolve(&placeholders);

        state.advance(BuildStage::FetchingContent);
        let fetched = walker::fetch_all(summary, fetcher)?;

        state.advance(BuildStage::RenderingParts);
        let mut renderer = PartRenderer::new(engine, chrome);
        let cover = if self.render_cover {
            Some(renderer.render_cover(&title)?)
        } else {
            None
        };
        let body = walker::render_all(&fetched, &mut renderer)?;

        state.advance(BuildStage::SizingToc);
        let cover_pages = cover.as_ref().map_or(0, Part::page_count);
        let toc = if self.render_toc {
            Some(size_toc(&mut renderer, &body, cover_pages, &self.toc_title)?)
        } else {
            None
        };
        let mut parts = DocumentParts { cover, toc, body };

        state.advance(BuildStage::AssigningOffsets);
        let total_pages = assign_page_offsets(&mut parts);

        state.advance(BuildStage::Writing);
        let outline = self.render_bookmarks.then(|| build_outline(&parts));
        let mut writer = PdfWriter::new(total_pages)
            .with_page_numbers(self.page_numbers)
            .with_cancellation(self.cancellation.clone());
        if let Some(progress) = &self.progress {
            writer = writer.with_progress(progress.as_ref());
        }
        for part in parts.ordered() {
            writer.write_part(part)?;
        }
        let bytes = writer.finish(&title, outline.as_ref())?;
        out.write_all(&bytes)
            .and_then(|_| out.flush())
            .map_err(WriteError::Io)?;

        state.advance(BuildStage::Done);
        info!(
            "Assembled '{}': {} page(s), {} bytes",
            title,
            total_pages,
            bytes.len()
        );

        Ok(AssemblyReport {
            total_pages,
            cover_pages,
            toc_pages: parts.toc.as_ref().map_or(0, Part::page_count),
            body_pages: parts.body.page_count(),
            bytes_written: bytes.len(),
            parts: placements(&parts),
            outline,
            stages: state.visited.clone(),
        })
    }
}

fn placements(parts: &DocumentParts) -> Vec<PartPlacement> {
    let bullets = bullet_labels(&parts.body);
    let framing = parts
        .cover
        .iter()
        .chain(parts.toc.iter())
        .map(|part| placement(part, None));
    let body = parts
        .body
        .iter()
        .map(|(id, part)| placement(part, bullets.get(id.index()).cloned()));
    framing.chain(body).collect()
}

fn placement(part: &Part, bullet: Option<String>) -> PartPlacement {
    PartPlacement {
        id: part.id().to_string(),
        name: part.name().to_string(),
        level: part.level(),
        bullet,
        start_page: part.start_page().unwrap_or_default(),
        page_count: part.page_count(),
    }
}
