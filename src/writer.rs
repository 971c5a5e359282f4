//! Merging laid-out parts into the final PDF.
//!
//! Pages are imported part by part into one `lopdf` document. Each part's objects are renumbered
//! past the objects already written, its pages are re-parented onto the shared page tree, and
//! its anchors are committed as named destinations. Nothing reaches the caller's sink until the
//! whole document has been serialised.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use crate::bookmarks::{apply_outline, text_string, BookmarkError, Outline};
use crate::model::{Page, Part, PartKind};

const INHERITED_PAGE_KEYS: &[&[u8]] = &[b"Resources", b"CropBox", b"Rotate"];
const PAGE_NUMBER_FONT: &str = "FPageNo";
const PAGE_NUMBER_SIZE: f32 = 8.0;
const PAGE_NUMBER_MARGIN: f32 = 36.0;
const PAGE_NUMBER_BASELINE: f32 = 20.0;

/// Shared flag that stops a build before the next page is written.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Reported after every page written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteProgress {
    /// Absolute number of the page just written.
    pub page: usize,
    pub total: usize,
}

/// Errors raised while writing the assembled document.
#[derive(Debug)]
pub enum WriteError {
    /// A PDF object could not be read or updated.
    Pdf(lopdf::Error),
    /// Serialisation or the output sink failed.
    Io(io::Error),
    /// The outline could not be written.
    Bookmarks(BookmarkError),
    /// The cancellation token tripped before page `page_index` of `part`.
    Cancelled { part: String, page_index: usize },
    /// A part was written before page offsets were assigned.
    MissingOffset { part: String },
    /// A part was written out of order.
    OutOfOrder {
        part: String,
        expected: usize,
        found: usize,
    },
    /// The page descriptors of `part` do not match the pages of its document.
    PageMismatch {
        part: String,
        described: usize,
        found: usize,
    },
    /// No page was written.
    EmptyDocument,
}

impl From<lopdf::Error> for WriteError {
    fn from(err: lopdf::Error) -> Self {
        Self::Pdf(err)
    }
}

impl From<io::Error> for WriteError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<BookmarkError> for WriteError {
    fn from(err: BookmarkError) -> Self {
        Self::Bookmarks(err)
    }
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pdf(err) => write!(f, "PDF object error: {err}"),
            Self::Io(err) => write!(f, "Failed to write document: {err}"),
            Self::Bookmarks(err) => write!(f, "Failed to write bookmarks: {err}"),
            Self::Cancelled { part, page_index } => write!(
                f,
                "Cancelled before page {} of part '{}'",
                page_index + 1,
                part
            ),
            Self::MissingOffset { part } => {
                write!(f, "Part '{}' has no page offset assigned", part)
            }
            Self::OutOfOrder {
                part,
                expected,
                found,
            } => write!(
                f,
                "Part '{}' starts at page {} but the next page is {}",
                part, found, expected
            ),
            Self::PageMismatch {
                part,
                described,
                found,
            } => write!(
                f,
                "Part '{}' describes {} page(s) that do not match the {} page(s) of its document",
                part, described, found
            ),
            Self::EmptyDocument => write!(f, "Document has no pages"),
        }
    }
}

impl std::error::Error for WriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Pdf(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Bookmarks(err) => Some(err),
            Self::Cancelled { .. }
            | Self::MissingOffset { .. }
            | Self::OutOfOrder { .. }
            | Self::PageMismatch { .. }
            | Self::EmptyDocument => None,
        }
    }
}

/// Named destinations of the document being written.
///
/// Anchors of the current part are queued with their part-local page index and resolved to page
/// objects by [`commit`](OutputDevice::commit) once the part's pages are known. The first
/// destination registered for a name wins.
#[derive(Debug, Default)]
pub struct OutputDevice {
    pending: Vec<(String, usize)>,
    destinations: BTreeMap<String, ObjectId>,
}

impl OutputDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&mut self, name: impl Into<String>, page_index: usize) {
        self.pending.push((name.into(), page_index));
    }

    /// Resolves queued anchors against the pages of the current part.
    pub fn commit(&mut self, page_ids: &[ObjectId]) {
        for (name, page_index) in &self.pending {
            match page_ids.get(*page_index) {
                Some(page_id) => {
                    self.destinations.entry(name.clone()).or_insert(*page_id);
                }
                None => debug!("Dropping anchor '{}' on missing page {}", name, page_index),
            }
        }
    }

    /// Drops everything queued for the current part.
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    pub fn pending(&self) -> &[(String, usize)] {
        &self.pending
    }

    pub fn destinations(&self) -> &BTreeMap<String, ObjectId> {
        &self.destinations
    }
}

/// Writes parts, in page order, into one PDF.
pub struct PdfWriter<'a> {
    document: Document,
    pages_id: ObjectId,
    page_ids: Vec<ObjectId>,
    media_box: Option<(f32, f32)>,
    device: OutputDevice,
    total_pages: usize,
    page_numbers: bool,
    number_font: Option<ObjectId>,
    save_state: Option<ObjectId>,
    cancellation: CancellationToken,
    progress: Option<&'a dyn Fn(WriteProgress)>,
}

impl<'a> PdfWriter<'a> {
    /// Creates a writer for a document of `total_pages` pages.
    pub fn new(total_pages: usize) -> Self {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        Self {
            document,
            pages_id,
            page_ids: Vec::with_capacity(total_pages),
            media_box: None,
            device: OutputDevice::new(),
            total_pages,
            page_numbers: true,
            number_font: None,
            save_state: None,
            cancellation: CancellationToken::new(),
            progress: None,
        }
    }

    /// Stamps `page / total` on every page not belonging to the cover.
    pub fn with_page_numbers(mut self, enabled: bool) -> Self {
        self.page_numbers = enabled;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_progress(mut self, progress: &'a dyn Fn(WriteProgress)) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn pages_written(&self) -> usize {
        self.page_ids.len()
    }

    pub fn device(&self) -> &OutputDevice {
        &self.device
    }

    /// Imports every page of `part`. Parts must be written in page order.
    pub fn write_part(&mut self, part: &Part) -> Result<(), WriteError> {
        let start = part.start_page().ok_or_else(|| WriteError::MissingOffset {
            part: part.id().to_string(),
        })?;
        let expected = self.page_ids.len() + 1;
        if start != expected {
            return Err(WriteError::OutOfOrder {
                part: part.id().to_string(),
                expected,
                found: start,
            });
        }

        let source_pages: Vec<ObjectId> = part
            .layout()
            .document()
            .get_pages()
            .into_values()
            .collect();
        let described: Vec<ObjectId> = part.pages().iter().map(Page::object_id).collect();
        if source_pages != described {
            return Err(WriteError::PageMismatch {
                part: part.id().to_string(),
                described: described.len(),
                found: source_pages.len(),
            });
        }

        let mut source = part.layout().document().clone();
        source.renumber_objects_with(self.document.max_id + 1);
        let page_ids: Vec<ObjectId> = source.get_pages().into_values().collect();
        let inherited: Vec<Vec<(&[u8], Object)>> = page_ids
            .iter()
            .map(|page_id| inherited_attributes(&source, *page_id))
            .collect();
        self.document.max_id = self.document.max_id.max(source.max_id);
        self.document.objects.extend(source.objects);

        for (index, ((page_id, page), attributes)) in page_ids
            .iter()
            .zip(part.pages())
            .zip(inherited)
            .enumerate()
        {
            if self.cancellation.is_cancelled() {
                info!(
                    "Cancelled before page {} of part '{}'",
                    index + 1,
                    part.id()
                );
                return Err(WriteError::Cancelled {
                    part: part.id().to_string(),
                    page_index: index,
                });
            }
            self.import_page(*page_id, page, attributes)?;
            if self.page_numbers && part.kind() != PartKind::Cover {
                self.stamp_page_number(*page_id, page, self.page_ids.len() + 1)?;
            }
            self.page_ids.push(*page_id);

            if let Some(progress) = self.progress {
                progress(WriteProgress {
                    page: self.page_ids.len(),
                    total: self.total_pages,
                });
            }
        }

        for anchor in part.layout().anchors() {
            self.device.queue(anchor.name(), anchor.page_index());
        }
        self.device.commit(&page_ids);
        self.device.reset();

        debug!(
            "Wrote part '{}' as pages {}-{}",
            part.id(),
            start,
            self.page_ids.len()
        );
        Ok(())
    }

    fn import_page(
        &mut self,
        page_id: ObjectId,
        page: &Page,
        inherited: Vec<(&[u8], Object)>,
    ) -> Result<(), WriteError> {
        let media_box = (page.width(), page.height());
        self.media_box.get_or_insert(media_box);

        let dictionary = self.document.get_object_mut(page_id)?.as_dict_mut()?;
        for (key, value) in inherited {
            if !dictionary.has(key) {
                dictionary.set(key.to_vec(), value);
            }
        }
        dictionary.set("Parent", Object::Reference(self.pages_id));
        dictionary.set("MediaBox", rectangle(media_box));
        Ok(())
    }

    fn stamp_page_number(
        &mut self,
        page_id: ObjectId,
        page: &Page,
        number: usize,
    ) -> Result<(), WriteError> {
        let font_id = match self.number_font {
            Some(id) => id,
            None => {
                let id = self.document.add_object(dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => "Helvetica",
                    "Encoding" => "WinAnsiEncoding",
                });
                *self.number_font.insert(id)
            }
        };
        let save_id = match self.save_state {
            Some(id) => id,
            None => {
                let id = self
                    .document
                    .add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
                *self.save_state.insert(id)
            }
        };

        let label = format!("{} / {}", number, self.total_pages);
        let label_width = label.len() as f32 * PAGE_NUMBER_SIZE * 0.5;
        let x = (page.width() - PAGE_NUMBER_MARGIN - label_width).max(0.0);
        let content = format!(
            "\nQ\nq\nBT\n/{} {} Tf\n{:.2} {:.2} Td\n({}) Tj\nET\nQ\n",
            PAGE_NUMBER_FONT, PAGE_NUMBER_SIZE, x, PAGE_NUMBER_BASELINE, label
        );
        let stamp_id = self
            .document
            .add_object(Stream::new(dictionary! {}, content.into_bytes()));

        let (resources, contents) = {
            let dictionary = self.document.get_dictionary(page_id)?;
            (
                dictionary.get(b"Resources").ok().cloned(),
                dictionary.get(b"Contents").ok().cloned(),
            )
        };

        let mut resources = self.owned_dictionary(resources.as_ref());
        let mut fonts = self.owned_dictionary(resources.get(b"Font").ok());
        fonts.set(PAGE_NUMBER_FONT, Object::Reference(font_id));
        resources.set("Font", Object::Dictionary(fonts));

        let mut streams = match contents {
            Some(Object::Array(items)) => items,
            Some(other) => vec![other],
            None => Vec::new(),
        };
        streams.insert(0, Object::Reference(save_id));
        streams.push(Object::Reference(stamp_id));

        let dictionary = self.document.get_object_mut(page_id)?.as_dict_mut()?;
        dictionary.set("Resources", Object::Dictionary(resources));
        dictionary.set("Contents", Object::Array(streams));
        Ok(())
    }

    /// Copies a dictionary given inline or by reference.
    fn owned_dictionary(&self, object: Option<&Object>) -> Dictionary {
        match object {
            Some(Object::Dictionary(dictionary)) => dictionary.clone(),
            Some(Object::Reference(id)) => self
                .document
                .get_dictionary(*id)
                .cloned()
                .unwrap_or_else(|_| Dictionary::new()),
            _ => Dictionary::new(),
        }
    }

    /// Completes the page tree, destinations, outline and metadata and serialises the document.
    pub fn finish(mut self, title: &str, outline: Option<&Outline>) -> Result<Vec<u8>, WriteError> {
        if self.page_ids.is_empty() {
            return Err(WriteError::EmptyDocument);
        }

        let kids: Vec<Object> = self
            .page_ids
            .iter()
            .map(|id| Object::Reference(*id))
            .collect();
        let mut pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => self.page_ids.len() as i64,
        };
        if let Some(media_box) = self.media_box {
            pages.set("MediaBox", rectangle(media_box));
        }
        self.document
            .objects
            .insert(self.pages_id, Object::Dictionary(pages));

        let mut catalog = dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        };
        if !self.device.destinations().is_empty() {
            let mut destinations = Dictionary::new();
            for (name, page_id) in self.device.destinations() {
                destinations.set(
                    name.as_bytes().to_vec(),
                    Object::Array(vec![
                        Object::Reference(*page_id),
                        Object::Name("Fit".into()),
                    ]),
                );
            }
            let destinations_id = self.document.add_object(destinations);
            catalog.set("Dests", Object::Reference(destinations_id));
        }
        let catalog_id = self.document.add_object(catalog);
        self.document.trailer.set("Root", catalog_id);

        if let Some(outline) = outline {
            apply_outline(&mut self.document, outline, &self.page_ids)?;
        }

        let info_id = self.document.add_object(dictionary! {
            "Title" => text_string(title),
            "Producer" => Object::string_literal("pdf_assembly"),
        });
        self.document.trailer.set("Info", info_id);

        self.document.prune_objects();
        self.document.renumber_objects();
        self.document.compress();

        let mut bytes = Vec::new();
        self.document.save_to(&mut bytes)?;
        info!(
            "Serialised {} page(s) into {} bytes",
            self.page_ids.len(),
            bytes.len()
        );
        Ok(bytes)
    }
}

fn rectangle((width, height): (f32, f32)) -> Object {
    Object::Array(vec![
        0.into(),
        0.into(),
        Object::Real(width.into()),
        Object::Real(height.into()),
    ])
}

/// Inheritable page attributes the page does not set itself, taken from its ancestors.
fn inherited_attributes(document: &Document, page_id: ObjectId) -> Vec<(&'static [u8], Object)> {
    let Ok(page) = document.get_dictionary(page_id) else {
        return Vec::new();
    };

    let mut found = Vec::new();
    for key in INHERITED_PAGE_KEYS {
        if page.has(key) {
            continue;
        }
        let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
        let mut depth = 0;
        while let Some(id) = parent {
            let Ok(node) = document.get_dictionary(id) else {
                break;
            };
            if let Ok(value) = node.get(key) {
                found.push((*key, value.clone()));
                break;
            }
            depth += 1;
            if depth > 64 {
                break;
            }
            parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Anchor;
    use crate::test_support::{blank_layout, page_markers};
    use std::cell::RefCell;

    fn body(id: &str, pages: usize, start: usize) -> Part {
        let layout = blank_layout(id, pages, 595.0, 842.0, vec![Anchor::new(id, 0)]).unwrap();
        let mut part = Part::body(id, id.to_uppercase(), 1, None, layout);
        part.set_start_page(start);
        part
    }

    #[test]
    fn device_commits_first_destination_and_resets() {
        let mut device = OutputDevice::new();
        device.queue("intro", 1);
        device.queue("missing", 5);
        device.commit(&[(10, 0), (11, 0)]);
        device.reset();
        assert!(device.pending().is_empty());

        device.queue("intro", 0);
        device.commit(&[(20, 0)]);
        assert_eq!(device.destinations().get("intro"), Some(&(11, 0)));
        assert!(!device.destinations().contains_key("missing"));
    }

    #[test]
    fn parts_are_merged_in_order_with_inherited_resources() {
        let first = body("a", 2, 1);
        let second = body("b", 1, 3);

        let mut writer = PdfWriter::new(3).with_page_numbers(false);
        writer.write_part(&first).unwrap();
        writer.write_part(&second).unwrap();
        let bytes = writer.finish("Merged", None).unwrap();

        let document = Document::load_mem(&bytes).unwrap();
        assert_eq!(page_markers(&document), vec!["a#0", "a#1", "b#0"]);
        for page_id in document.get_pages().into_values() {
            let page = document.get_dictionary(page_id).unwrap();
            assert!(page.has(b"Resources"));
            assert!(page.has(b"MediaBox"));
        }
    }

    #[test]
    fn out_of_order_parts_are_rejected() {
        let mut writer = PdfWriter::new(3);
        let err = writer.write_part(&body("b", 1, 3)).unwrap_err();
        assert!(matches!(
            err,
            WriteError::OutOfOrder {
                expected: 1,
                found: 3,
                ..
            }
        ));
    }

    #[test]
    fn cancellation_stops_before_next_page() {
        let token = CancellationToken::new();
        let seen = RefCell::new(Vec::new());
        let progress = |update: WriteProgress| {
            seen.borrow_mut().push(update.page);
            if update.page == 2 {
                token.cancel();
            }
        };

        let mut writer = PdfWriter::new(5)
            .with_cancellation(token.clone())
            .with_progress(&progress);
        let err = writer.write_part(&body("a", 5, 1)).unwrap_err();

        assert!(matches!(
            err,
            WriteError::Cancelled { ref part, page_index: 2 } if part == "a"
        ));
        assert_eq!(*seen.borrow(), vec![1, 2]);
        assert_eq!(writer.pages_written(), 2);
    }

    #[test]
    fn page_numbers_are_stamped_with_their_own_font() {
        let mut writer = PdfWriter::new(1);
        writer.write_part(&body("a", 1, 1)).unwrap();
        let bytes = writer.finish("Numbered", None).unwrap();

        let document = Document::load_mem(&bytes).unwrap();
        let page_id = document.get_pages()[&1];
        let content = document.get_page_content(page_id).unwrap();
        let text = String::from_utf8_lossy(&content);
        assert!(text.contains("(1 / 1) Tj"));

        let page = document.get_dictionary(page_id).unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let fonts = resources.get(b"Font").unwrap().as_dict().unwrap();
        assert!(fonts.has(PAGE_NUMBER_FONT.as_bytes()));
    }
}
