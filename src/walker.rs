//! Walking the summary tree: fetching every page and rendering it into a body part.
//!
//! The tree is flattened in pre-order. Each flat entry keeps the index of its parent entry,
//! which becomes the part's [`PartId`] back-reference once rendered.

use log::{debug, info};

use crate::error::AssemblyError;
use crate::fetch::{ContentFetcher, DocumentFormat};
use crate::model::{PartId, PartList, SummaryDocument, SummaryEntry};
use crate::renderer::PartRenderer;

/// A summary entry in pre-order position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlatEntry {
    pub page_id: String,
    pub name: String,
    pub language: String,
    pub level: usize,
    /// Index of the parent entry in the flat list.
    pub parent: Option<usize>,
}

/// A flat entry together with its fetched HTML.
#[derive(Clone, Debug)]
pub struct FetchedEntry {
    pub entry: FlatEntry,
    pub html: String,
}

/// Flattens the summary tree in pre-order. Empty entry languages inherit the document language.
pub fn flatten(summary: &SummaryDocument) -> Vec<FlatEntry> {
    fn visit(
        entries: &[SummaryEntry],
        parent: Option<usize>,
        level: usize,
        language: &str,
        flat: &mut Vec<FlatEntry>,
    ) {
        for entry in entries {
            let index = flat.len();
            let entry_language = if entry.language().is_empty() {
                language
            } else {
                entry.language()
            };
            flat.push(FlatEntry {
                page_id: entry.page_id().to_string(),
                name: entry.name().to_string(),
                language: entry_language.to_string(),
                level,
                parent,
            });
            visit(entry.children(), Some(index), level + 1, language, flat);
        }
    }

    let mut flat = Vec::new();
    visit(summary.summary(), None, 1, summary.language(), &mut flat);
    flat
}

/// Fetches the content of every entry. The first failure aborts the walk.
pub fn fetch_all(
    summary: &SummaryDocument,
    fetcher: &dyn ContentFetcher,
) -> Result<Vec<FetchedEntry>, AssemblyError> {
    let entries = flatten(summary);
    info!(
        "Fetching {} page(s) of package '{}'",
        entries.len(),
        summary.package()
    );

    entries
        .into_iter()
        .map(|entry| {
            let html = fetcher
                .fetch(
                    summary.package(),
                    &entry.page_id,
                    &entry.language,
                    DocumentFormat::Pdf,
                )
                .map_err(|source| AssemblyError::ContentFetch {
                    page_id: entry.page_id.clone(),
                    source,
                })?;
            debug!("Fetched '{}' ({} bytes)", entry.page_id, html.len());
            Ok(FetchedEntry { entry, html })
        })
        .collect()
}

/// Renders fetched entries into the body part list, preserving their order.
pub fn render_all(
    fetched: &[FetchedEntry],
    renderer: &mut PartRenderer<'_>,
) -> Result<PartList, AssemblyError> {
    let mut parts = PartList::new();
    let mut ids: Vec<PartId> = Vec::with_capacity(fetched.len());

    for FetchedEntry { entry, html } in fetched {
        let parent = entry.parent.and_then(|index| ids.get(index).copied());
        let level = parts.level_below(parent);
        let part = renderer.render_body(html, &entry.page_id, &entry.name, level, parent)?;
        ids.push(parts.push(part));
    }

    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> SummaryDocument {
        SummaryDocument::new("Guide", "pkg", "en")
            .with_entry(
                SummaryEntry::new("a", "A", "")
                    .with_child(SummaryEntry::new("b", "B", "it"))
                    .with_child(
                        SummaryEntry::new("c", "C", "").with_child(SummaryEntry::new("e", "E", "")),
                    ),
            )
            .with_entry(SummaryEntry::new("d", "D", "en"))
    }

    #[test]
    fn flatten_is_pre_order_with_parent_indices() {
        let flat = flatten(&summary());
        let order: Vec<(&str, usize, Option<usize>)> = flat
            .iter()
            .map(|entry| (entry.page_id.as_str(), entry.level, entry.parent))
            .collect();

        assert_eq!(
            order,
            vec![
                ("a", 1, None),
                ("b", 2, Some(0)),
                ("c", 2, Some(0)),
                ("e", 3, Some(2)),
                ("d", 1, None),
            ]
        );
        assert_eq!(flat[0].language, "en");
        assert_eq!(flat[1].language, "it");
    }
}
