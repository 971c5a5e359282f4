use std::collections::HashMap;
use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::Parser;
use log::{info, LevelFilter};
use pdf_assembly::{
    fonts, Assembler, DirectoryFetcher, DocumentPlaceholder, GenpdfLayoutEngine, SummaryDocument,
};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

/// Assembles the pages of a documentation package into one PDF.
///
/// Pages are read from `<root>/<package>/docs/<language>/pages/<page>.html`. Fonts must be present
/// under `assets/fonts` or provided via the `PDF_ASSEMBLY_FONTS_DIR` environment variable.
#[derive(Parser)]
#[command(author, version, about = "Assemble documentation pages into one PDF")]
struct Cli {
    /// Directory holding the packages.
    #[arg(long)]
    root: PathBuf,

    /// Package to assemble.
    #[arg(long)]
    package: String,

    /// Default language of the pages.
    #[arg(long, default_value = "en")]
    language: String,

    /// Package TOC page whose `nav > ul` lists the summary.
    #[arg(long, conflicts_with = "summary", required_unless_present = "summary")]
    toc: Option<PathBuf>,

    /// Summary document as JSON.
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Where to write the PDF.
    #[arg(short, long, default_value = "document.pdf")]
    output: PathBuf,

    /// Overrides the title read from the summary.
    #[arg(long)]
    title: Option<String>,

    #[arg(long, default_value = pdf_assembly::assembler::DEFAULT_TOC_TITLE)]
    toc_title: String,

    /// Directory with template overrides.
    #[arg(long)]
    templates: Option<PathBuf>,

    /// Look for pages anywhere below the language's pages directory.
    #[arg(long)]
    search: bool,

    #[arg(long)]
    no_cover: bool,

    #[arg(long)]
    no_toc: bool,

    #[arg(long)]
    no_bookmarks: bool,

    #[arg(long)]
    no_page_numbers: bool,

    #[arg(long)]
    product_name: Option<String>,

    #[arg(long)]
    product_version: Option<String>,

    #[arg(long)]
    subtitle: Option<String>,

    /// Running footer of body pages.
    #[arg(long)]
    footer: Option<String>,

    /// Footer of the cover page.
    #[arg(long)]
    cover_footer: Option<String>,

    #[arg(long)]
    cover_image: Option<String>,

    /// Enables debug logging.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn placeholders(&self) -> HashMap<DocumentPlaceholder, String> {
        [
            (DocumentPlaceholder::ProductName, &self.product_name),
            (DocumentPlaceholder::ProductVersion, &self.product_version),
            (DocumentPlaceholder::CoverSubtitle, &self.subtitle),
            (DocumentPlaceholder::FooterPage, &self.footer),
            (DocumentPlaceholder::FooterCover, &self.cover_footer),
            (DocumentPlaceholder::CoverImage, &self.cover_image),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.clone().map(|value| (key, value)))
        .collect()
    }

    fn load_summary(&self) -> Result<SummaryDocument, Box<dyn Error>> {
        if let Some(path) = &self.summary {
            let json = fs::read_to_string(path)?;
            return Ok(serde_json::from_str(&json)?);
        }

        let path = self.toc.as_ref().ok_or("either --toc or --summary is required")?;
        let html = fs::read_to_string(path)?;
        Ok(SummaryDocument::parse_toc_html(
            &html,
            &self.package,
            &self.language,
        ))
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let summary = cli.load_summary()?;

    let mut builder = Assembler::builder()
        .with_cover(!cli.no_cover)
        .with_toc(!cli.no_toc)
        .with_bookmarks(!cli.no_bookmarks)
        .with_page_numbers(!cli.no_page_numbers)
        .with_toc_title(cli.toc_title.clone())
        .with_placeholders(cli.placeholders());
    if let Some(title) = &cli.title {
        builder = builder.with_title(title.clone());
    }
    if let Some(templates) = &cli.templates {
        builder = builder.with_templates_dir(templates);
    }
    let assembler = builder.build()?;

    let fetcher = DirectoryFetcher::new(&cli.root)
        .with_search(cli.search)
        .with_allowed_packages([cli.package.clone()]);
    let mut engine = GenpdfLayoutEngine::new()?.with_base_dir(&cli.root);
    if let Some(title) = &cli.title {
        engine = engine.with_title(title.clone());
    }

    let mut bytes = Vec::new();
    let report = assembler.assemble(&summary, &fetcher, &mut engine, &mut bytes)?;
    fs::write(&cli.output, &bytes)?;
    info!(
        "Wrote {} page(s) to {}",
        report.total_pages,
        cli.output.display()
    );
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Err(err) = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ) {
        eprintln!("Failed to initialise logging: {}", err);
    }

    if !fonts::default_fonts_available() {
        eprintln!(
            "Fonts not found. Set {} or copy assets/fonts next to the binary.",
            fonts::FONTS_DIR_ENV
        );
    }

    if let Err(err) = run(&cli) {
        eprintln!("Error: {}", err);
        print_error_sources(err.as_ref());
        std::process::exit(1);
    }
}

fn print_error_sources(mut error: &(dyn Error + 'static)) {
    while let Some(source) = error.source() {
        eprintln!("  caused by: {}", source);
        error = source;
    }
}
