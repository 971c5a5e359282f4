use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use lopdf::{Dictionary, Document, Object, ObjectId};
use pdf_assembly::assembler::{Assembler, AssemblerBuilder, AssemblyReport, BuildStage};
use pdf_assembly::test_support::{page_markers, FixedLayoutEngine, MapFetcher};
use pdf_assembly::toc::MAX_TOC_PASSES;
use pdf_assembly::{AssemblyError, CancellationToken, FetchError, SummaryDocument, SummaryEntry};

/// A(B, C), D
fn guide() -> SummaryDocument {
    SummaryDocument::new("User Guide", "manual", "en")
        .with_entry(
            SummaryEntry::new("a", "Getting started", "")
                .with_child(SummaryEntry::new("b", "Installation", "it"))
                .with_child(SummaryEntry::new("c", "Q&A", "")),
        )
        .with_entry(SummaryEntry::new("d", "Reference", ""))
}

fn fetcher() -> MapFetcher {
    MapFetcher::new()
        .with_page("a", "<p>Welcome</p>")
        .with_page("b", "<h1>Install</h1><p>Run the installer.</p>")
        .with_page("c", "<p>Questions</p>")
        .with_page("d", "<table><tr><td>key</td></tr></table>")
}

/// Cover 1, TOC 1, A 1, B 2, C 1, D 1.
fn engine() -> FixedLayoutEngine {
    FixedLayoutEngine::new()
        .with_part("a", 1)
        .with_part("b", 2)
        .with_part("c", 1)
        .with_part("d", 1)
}

fn run(
    builder: AssemblerBuilder,
    summary: &SummaryDocument,
    fetcher: &MapFetcher,
    engine: &mut FixedLayoutEngine,
) -> (Result<AssemblyReport, AssemblyError>, Vec<u8>) {
    let assembler = builder.build().expect("assembler");
    let mut out = Vec::new();
    let result = assembler.assemble(summary, fetcher, engine, &mut out);
    (result, out)
}

fn catalog(document: &Document) -> &Dictionary {
    let root = document
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .expect("catalog reference");
    document.get_dictionary(root).expect("catalog")
}

fn page_ids(document: &Document) -> Vec<ObjectId> {
    document.get_pages().into_values().collect()
}

fn number(object: &Object) -> f32 {
    match object {
        Object::Integer(value) => *value as f32,
        Object::Real(value) => *value as f32,
        other => panic!("not a number: {other:?}"),
    }
}

fn media_box(document: &Document, page_id: ObjectId) -> (f32, f32) {
    let page = document.get_dictionary(page_id).expect("page");
    let rect = page.get(b"MediaBox").and_then(Object::as_array).expect("MediaBox");
    (number(&rect[2]), number(&rect[3]))
}

fn page_text(document: &Document, page_id: ObjectId) -> String {
    String::from_utf8_lossy(&document.get_page_content(page_id).expect("content")).into_owned()
}

#[test]
fn assembles_cover_toc_and_nested_parts_in_order() {
    let mut engine = engine();
    let (result, out) = run(Assembler::builder(), &guide(), &fetcher(), &mut engine);
    let report = result.expect("assembly");

    assert_eq!(report.total_pages, 7);
    assert_eq!(report.cover_pages, 1);
    assert_eq!(report.toc_pages, 1);
    assert_eq!(report.body_pages, 5);
    assert_eq!(report.bytes_written, out.len());

    let starts: Vec<(&str, usize)> = report
        .parts
        .iter()
        .map(|part| (part.id.as_str(), part.start_page))
        .collect();
    assert_eq!(
        starts,
        vec![("cover", 1), ("toc", 2), ("a", 3), ("b", 4), ("c", 6), ("d", 7)]
    );

    let document = Document::load_mem(&out).expect("valid pdf");
    assert_eq!(
        page_markers(&document),
        vec!["cover#0", "toc#0", "a#0", "b#0", "b#1", "c#0", "d#0"]
    );
}

#[test]
fn page_count_is_the_sum_of_part_page_counts() {
    let mut engine = engine();
    let (result, out) = run(Assembler::builder(), &guide(), &fetcher(), &mut engine);
    let report = result.expect("assembly");

    let sum: usize = report.parts.iter().map(|part| part.page_count).sum();
    let document = Document::load_mem(&out).expect("valid pdf");
    assert_eq!(sum, report.total_pages);
    assert_eq!(document.get_pages().len(), report.total_pages);
}

#[test]
fn stages_are_visited_in_order() {
    let mut engine = engine();
    let (result, _) = run(Assembler::builder(), &guide(), &fetcher(), &mut engine);
    assert_eq!(
        result.expect("assembly").stages,
        vec![
            BuildStage::Init,
            BuildStage::FetchingContent,
            BuildStage::RenderingParts,
            BuildStage::SizingToc,
            BuildStage::AssigningOffsets,
            BuildStage::Writing,
            BuildStage::Done,
        ]
    );
}

#[test]
fn toc_lists_bullets_names_and_final_page_numbers() {
    let mut engine = engine();
    let (result, _) = run(Assembler::builder(), &guide(), &fetcher(), &mut engine);
    let report = result.expect("assembly");

    let bullets: Vec<Option<&str>> = report
        .parts
        .iter()
        .map(|part| part.bullet.as_deref())
        .collect();
    assert_eq!(
        bullets,
        vec![None, None, Some("1"), Some("1.1"), Some("1.2"), Some("2")]
    );

    let toc = engine.toc_documents().last().expect("toc rendered");
    assert!(toc.contains(">1.2</td>"));
    assert!(toc.contains("Q&amp;A"));
    assert!(toc.contains(r#"<table class="l2">"#));
    assert!(toc.contains(">6</td>"));
}

#[test]
fn multi_page_toc_shifts_body_pages() {
    let mut engine = engine().with_toc_pages(|rows, _| if rows > 3 { 2 } else { 1 });
    let (result, out) = run(Assembler::builder(), &guide(), &fetcher(), &mut engine);
    let report = result.expect("assembly");

    assert_eq!(engine.toc_documents().len(), 2);
    assert_eq!(report.toc_pages, 2);
    assert_eq!(report.total_pages, 8);

    let a = report.parts.iter().find(|part| part.id == "a").expect("a");
    assert_eq!(a.start_page, 4);
    let toc = engine.toc_documents().last().expect("toc rendered");
    assert!(toc.contains(">4</td>"));
    assert!(!toc.contains(">3</td>"));

    let document = Document::load_mem(&out).expect("valid pdf");
    assert_eq!(
        page_markers(&document)[..4],
        ["cover#0", "toc#0", "toc#1", "a#0"]
    );
}

#[test]
fn oscillating_toc_stops_after_bounded_passes() {
    let summary = SummaryDocument::new("Flip", "manual", "en").with_entry(SummaryEntry::new(
        "a", "Only", "",
    ));
    let fetcher = MapFetcher::new().with_page("a", "<p>x</p>");
    let mut engine = FixedLayoutEngine::new().with_toc_pages(|_, last| if last == 3 { 2 } else { 1 });

    let (result, out) = run(Assembler::builder(), &summary, &fetcher, &mut engine);
    let report = result.expect("assembly");

    assert_eq!(engine.toc_documents().len(), MAX_TOC_PASSES);
    assert_eq!(report.total_pages, report.cover_pages + report.toc_pages + 1);
    let document = Document::load_mem(&out).expect("valid pdf");
    assert_eq!(document.get_pages().len(), report.total_pages);
}

#[test]
fn outline_mirrors_the_summary_tree() {
    let mut engine = engine();
    let (result, out) = run(Assembler::builder(), &guide(), &fetcher(), &mut engine);
    let report = result.expect("assembly");

    let outline = report.outline.expect("outline");
    let roots: Vec<(&str, usize)> = outline
        .roots()
        .iter()
        .map(|index| {
            let node = outline.node(*index).expect("root");
            (node.title.as_str(), node.page)
        })
        .collect();
    assert_eq!(roots, vec![("Getting started", 3), ("Reference", 7)]);

    let first = outline.node(outline.roots()[0]).expect("root");
    let children: Vec<usize> = first
        .children
        .iter()
        .map(|index| outline.node(*index).expect("child").page)
        .collect();
    assert_eq!(children, vec![4, 6]);

    let document = Document::load_mem(&out).expect("valid pdf");
    let catalog = catalog(&document);
    assert_eq!(
        catalog.get(b"PageMode").and_then(Object::as_name).expect("page mode"),
        b"UseOutlines"
    );
    let outlines_id = catalog
        .get(b"Outlines")
        .and_then(Object::as_reference)
        .expect("outlines");
    let outlines = document.get_dictionary(outlines_id).expect("outlines");
    assert_eq!(outlines.get(b"Count").and_then(Object::as_i64).expect("count"), 4);
}

#[test]
fn bookmarks_open_the_page_holding_the_part_anchor() {
    let mut engine = engine().with_anchor_page("b", 1);
    let (result, out) = run(Assembler::builder(), &guide(), &fetcher(), &mut engine);
    let report = result.expect("assembly");

    let outline = report.outline.expect("outline");
    let b = outline
        .nodes()
        .iter()
        .find(|node| node.title == "Installation")
        .expect("b bookmark");
    assert_eq!(b.page, 5);

    let document = Document::load_mem(&out).expect("valid pdf");
    let pages = page_ids(&document);
    let dests_id = catalog(&document)
        .get(b"Dests")
        .and_then(Object::as_reference)
        .expect("named destinations");
    let dests = document.get_dictionary(dests_id).expect("dests");
    let target = |name: &[u8]| {
        dests
            .get(name)
            .and_then(Object::as_array)
            .expect("destination")[0]
            .as_reference()
            .expect("page reference")
    };
    assert_eq!(target(b"a"), pages[2]);
    assert_eq!(target(b"b"), pages[4]);
    assert_eq!(target(b"d"), pages[6]);
}

#[test]
fn disabled_bookmarks_leave_no_outline() {
    let mut engine = engine();
    let (result, out) = run(
        Assembler::builder().with_bookmarks(false),
        &guide(),
        &fetcher(),
        &mut engine,
    );
    assert!(result.expect("assembly").outline.is_none());

    let document = Document::load_mem(&out).expect("valid pdf");
    assert!(catalog(&document).get(b"Outlines").is_err());
}

#[test]
fn without_cover_and_toc_body_starts_at_page_one() {
    let mut engine = engine();
    let (result, out) = run(
        Assembler::builder().with_cover(false).with_toc(false),
        &guide(),
        &fetcher(),
        &mut engine,
    );
    let report = result.expect("assembly");

    assert_eq!(report.total_pages, 5);
    assert_eq!(report.parts[0].id, "a");
    assert_eq!(report.parts[0].start_page, 1);
    assert!(engine.toc_documents().is_empty());

    let document = Document::load_mem(&out).expect("valid pdf");
    let pages = page_ids(&document);
    assert!(page_text(&document, pages[0]).contains("(1 / 5) Tj"));
}

#[test]
fn page_numbers_skip_the_cover() {
    let mut engine = engine();
    let (result, out) = run(Assembler::builder(), &guide(), &fetcher(), &mut engine);
    result.expect("assembly");

    let document = Document::load_mem(&out).expect("valid pdf");
    let pages = page_ids(&document);
    assert!(!page_text(&document, pages[0]).contains("Tj"));
    assert!(page_text(&document, pages[1]).contains("(2 / 7) Tj"));
    assert!(page_text(&document, pages[6]).contains("(7 / 7) Tj"));
}

#[test]
fn page_numbers_can_be_disabled() {
    let mut engine = engine();
    let (result, out) = run(
        Assembler::builder().with_page_numbers(false),
        &guide(),
        &fetcher(),
        &mut engine,
    );
    result.expect("assembly");

    let document = Document::load_mem(&out).expect("valid pdf");
    for page_id in page_ids(&document) {
        assert!(!page_text(&document, page_id).contains("Tj"));
    }
}

#[test]
fn cover_page_size_is_kept() {
    let mut engine = engine().with_cover_size(400.0, 600.0);
    let (result, out) = run(Assembler::builder(), &guide(), &fetcher(), &mut engine);
    result.expect("assembly");

    let document = Document::load_mem(&out).expect("valid pdf");
    let pages = page_ids(&document);
    assert_eq!(media_box(&document, pages[0]), (400.0, 600.0));
    assert_eq!(media_box(&document, pages[1]), (595.0, 842.0));
}

#[test]
fn entries_inherit_the_document_language() {
    let fetcher = fetcher();
    let mut engine = engine();
    let (result, _) = run(Assembler::builder(), &guide(), &fetcher, &mut engine);
    result.expect("assembly");

    let requests = fetcher.requests();
    let languages: Vec<(&str, &str)> = requests
        .iter()
        .map(|(page, language)| (page.as_str(), language.as_str()))
        .collect();
    assert_eq!(
        languages,
        vec![("a", "en"), ("b", "it"), ("c", "en"), ("d", "en")]
    );
}

#[test]
fn engine_is_reset_before_every_layout() {
    let mut engine = engine();
    let (result, _) = run(Assembler::builder(), &guide(), &fetcher(), &mut engine);
    result.expect("assembly");

    // cover, four body parts, one TOC pass
    assert_eq!(engine.layouts(), 6);
    assert_eq!(engine.resets(), engine.layouts());
}

#[test]
fn json_summary_builds_like_the_programmatic_one() {
    let json = r#"{
        "title": "User Guide",
        "package": "manual",
        "language": "en",
        "summary": [
            {
                "page_id": "a",
                "name": "Getting started",
                "children": [
                    { "page_id": "b", "name": "Installation", "language": "it" },
                    { "page_id": "c", "name": "Q&A" }
                ]
            },
            { "page_id": "d", "name": "Reference" }
        ]
    }"#;

    let summary: SummaryDocument = serde_json::from_str(json).expect("summary json");
    assert_eq!(summary, guide());
    assert_eq!(summary.summary()[0].language(), "");
    assert_eq!(summary.summary()[0].children()[0].language(), "it");
    assert!(summary.summary()[1].children().is_empty());

    let written = serde_json::to_string(&summary).expect("serialise");
    let reread: SummaryDocument = serde_json::from_str(&written).expect("reread");
    assert_eq!(reread, summary);

    let mut engine = engine();
    let (result, _) = run(Assembler::builder(), &summary, &fetcher(), &mut engine);
    assert_eq!(result.expect("report").total_pages, 7);
}

#[test]
fn empty_summary_is_rejected() {
    let summary = SummaryDocument::new("Nothing", "manual", "en");
    let mut engine = engine();
    let (result, out) = run(Assembler::builder(), &summary, &fetcher(), &mut engine);

    assert!(matches!(result, Err(AssemblyError::EmptySummary)));
    assert!(out.is_empty());
    assert_eq!(engine.layouts(), 0);
}

#[test]
fn missing_content_aborts_before_layout() {
    let fetcher = MapFetcher::new()
        .with_page("a", "<p>a</p>")
        .with_page("b", "<p>b</p>")
        .with_page("d", "<p>d</p>");
    let mut engine = engine();
    let (result, out) = run(Assembler::builder(), &guide(), &fetcher, &mut engine);

    match result {
        Err(AssemblyError::ContentFetch { page_id, source }) => {
            assert_eq!(page_id, "c");
            assert!(matches!(source, FetchError::NotFound { .. }));
        }
        other => panic!("unexpected result {other:?}"),
    }
    assert!(out.is_empty());
    assert_eq!(engine.layouts(), 0);
}

#[test]
fn failed_build_records_where_it_stopped() {
    let assembler = Assembler::builder().build().expect("assembler");
    assert!(assembler.last_stages().is_empty());

    let mut failing = engine().failing_on("b");
    let mut out = Vec::new();
    let result = assembler.assemble(&guide(), &fetcher(), &mut failing, &mut out);
    assert!(matches!(result, Err(AssemblyError::Layout(_))));
    assert_eq!(
        assembler.last_stages(),
        vec![
            BuildStage::Init,
            BuildStage::FetchingContent,
            BuildStage::RenderingParts,
            BuildStage::Failed,
        ]
    );

    let mut working = engine();
    let report = assembler
        .assemble(&guide(), &fetcher(), &mut working, &mut out)
        .expect("second build");
    assert_eq!(assembler.last_stages(), report.stages);
    assert_eq!(report.stages.last(), Some(&BuildStage::Done));
}

#[test]
fn denied_package_surfaces_access_error() {
    let fetcher = fetcher().denying();
    let mut engine = engine();
    let (result, out) = run(Assembler::builder(), &guide(), &fetcher, &mut engine);

    assert!(matches!(
        result,
        Err(AssemblyError::ContentFetch {
            source: FetchError::AccessDenied { .. },
            ..
        })
    ));
    assert!(out.is_empty());
    assert_eq!(fetcher.requests().len(), 1);
}

#[test]
fn layout_failure_aborts_the_build() {
    let mut engine = engine().failing_on("b");
    let (result, out) = run(Assembler::builder(), &guide(), &fetcher(), &mut engine);

    assert!(matches!(result, Err(AssemblyError::Layout(_))));
    assert!(out.is_empty());
}

#[test]
fn cancellation_stops_before_the_next_page() {
    let summary = SummaryDocument::new("Long", "manual", "en")
        .with_entry(SummaryEntry::new("a", "Long part", ""));
    let fetcher = MapFetcher::new().with_page("a", "<p>long</p>");
    let mut engine = FixedLayoutEngine::new().with_part("a", 5);

    let token = CancellationToken::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let builder = {
        let token = token.clone();
        let seen = Rc::clone(&seen);
        Assembler::builder()
            .with_cover(false)
            .with_toc(false)
            .with_cancellation(token.clone())
            .with_progress(move |progress| {
                seen.borrow_mut().push(progress.page);
                if progress.page == 2 {
                    token.cancel();
                }
            })
    };

    let (result, out) = run(builder, &summary, &fetcher, &mut engine);

    assert!(matches!(result, Err(AssemblyError::Cancelled)));
    assert!(token.is_cancelled());
    assert_eq!(*seen.borrow(), vec![1, 2]);
    assert!(out.is_empty());
}

struct BrokenSink;

impl Write for BrokenSink {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn sink_failure_is_a_write_error() {
    let assembler = Assembler::builder().build().expect("assembler");
    let mut engine = engine();
    let err = assembler
        .assemble(&guide(), &fetcher(), &mut engine, &mut BrokenSink)
        .expect_err("sink failure");

    assert!(matches!(err, AssemblyError::Write(_)));
    let source = std::error::Error::source(&err).expect("write source");
    assert!(source.to_string().contains("sink closed"));
}
