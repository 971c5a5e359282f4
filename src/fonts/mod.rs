//! Font discovery for the genpdf layout engine.
//!
//! The Roboto family is looked up in `PDF_ASSEMBLY_FONTS_DIR`, next to the executable and in the
//! crate's `assets/fonts`. When none of these has the files, the Arial family of a Windows font
//! directory is used instead.

use std::env;
use std::io;
use std::path::{Path, PathBuf};

use genpdf::error::{Error, ErrorKind};
use genpdf::fonts::{self, FontData, FontFamily};
use log::{debug, warn};

/// Name of the bundled font family.
pub const DEFAULT_FONT_FAMILY_NAME: &str = "Roboto";

/// Environment variable pointing at a directory with the bundled font files.
pub const FONTS_DIR_ENV: &str = "PDF_ASSEMBLY_FONTS_DIR";

/// Environment variable pointing at a directory with the Arial fallback files.
pub const WINDOWS_FONTS_DIR_ENV: &str = "PDF_ASSEMBLY_WINDOWS_FONTS_DIR";

const FONT_FILES: &[&str] = &[
    "Roboto-Regular.ttf",
    "Roboto-Bold.ttf",
    "Roboto-Italic.ttf",
    "Roboto-BoldItalic.ttf",
];

const FALLBACK_FAMILY_NAME: &str = "Arial";

struct FallbackFontFiles {
    regular: &'static str,
    bold: &'static str,
    italic: &'static str,
    bold_italic: &'static str,
}

const FALLBACK_FONT_FILES: FallbackFontFiles = FallbackFontFiles {
    regular: "arial.ttf",
    bold: "arialbd.ttf",
    italic: "ariali.ttf",
    bold_italic: "arialbi.ttf",
};

fn env_path(var: &str) -> Option<PathBuf> {
    env::var_os(var).and_then(|value| {
        let path = PathBuf::from(value);
        if path.as_os_str().is_empty() {
            None
        } else {
            Some(path)
        }
    })
}

fn font_directory_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    let mut push = |candidate: PathBuf| {
        if !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    };

    if let Some(path) = env_path(FONTS_DIR_ENV) {
        push(path);
    }
    if let Ok(current_exe) = env::current_exe() {
        if let Some(bin_dir) = current_exe.parent() {
            push(bin_dir.join("assets/fonts"));
        }
    }
    push(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets/fonts"));

    candidates
}

fn missing_font_files(path: &Path) -> Vec<PathBuf> {
    FONT_FILES
        .iter()
        .map(|name| path.join(name))
        .filter(|candidate| !candidate.is_file())
        .collect()
}

fn resolve_font_directory() -> Result<PathBuf, Error> {
    let mut attempts = Vec::new();

    for candidate in font_directory_candidates() {
        let exists = candidate.is_dir();
        let missing = missing_font_files(&candidate);
        if exists && missing.is_empty() {
            debug!("Using fonts from {}", candidate.display());
            return Ok(candidate);
        }

        let reason = if !exists {
            "directory missing".to_owned()
        } else {
            let names = missing
                .iter()
                .map(|path| path.file_name().unwrap_or_default().to_string_lossy())
                .collect::<Vec<_>>()
                .join(", ");
            format!("missing files [{}]", names)
        };
        attempts.push(format!("{} ({})", candidate.display(), reason));
    }

    Err(Error::new(
        format!(
            "Unable to locate the {} font files. Checked: {}. Set {} to a directory containing them.",
            DEFAULT_FONT_FAMILY_NAME,
            attempts.join(", "),
            FONTS_DIR_ENV
        ),
        io::Error::new(io::ErrorKind::NotFound, "bundled fonts directory not found"),
    ))
}

fn load_bundled_font_family() -> Result<FontFamily<FontData>, Error> {
    let directory = resolve_font_directory()?;

    fonts::from_files(&directory, DEFAULT_FONT_FAMILY_NAME, None).map_err(|err| {
        Error::new(
            format!(
                "Failed to load font family '{}' from {}: {}",
                DEFAULT_FONT_FAMILY_NAME,
                directory.display(),
                err
            ),
            io::Error::new(io::ErrorKind::Other, err.to_string()),
        )
    })
}

fn fallback_font_directory() -> Option<PathBuf> {
    if let Some(path) = env_path(WINDOWS_FONTS_DIR_ENV) {
        return Some(path);
    }

    #[cfg(windows)]
    {
        for var in ["WINDIR", "SystemRoot"] {
            if let Some(root) = env_path(var) {
                let candidate = root.join("Fonts");
                if candidate.is_dir() {
                    return Some(candidate);
                }
            }
        }
    }

    None
}

fn load_fallback_font(directory: &Path, file: &str, style: &str) -> Result<FontData, Error> {
    let path = directory.join(file);
    FontData::load(&path, None).map_err(|err| {
        let io_kind = if path.is_file() {
            io::ErrorKind::Other
        } else {
            io::ErrorKind::NotFound
        };
        Error::new(
            format!(
                "Failed to load fallback {} font at {}: {}",
                style,
                path.display(),
                err
            ),
            io::Error::new(io_kind, err.to_string()),
        )
    })
}

fn fallback_font_family() -> Result<FontFamily<FontData>, Error> {
    let directory = fallback_font_directory().ok_or_else(|| {
        Error::new(
            "No font directory found for the fallback family",
            io::Error::new(io::ErrorKind::NotFound, "fallback fonts directory not found"),
        )
    })?;

    Ok(FontFamily {
        regular: load_fallback_font(&directory, FALLBACK_FONT_FILES.regular, "regular")?,
        bold: load_fallback_font(&directory, FALLBACK_FONT_FILES.bold, "bold")?,
        italic: load_fallback_font(&directory, FALLBACK_FONT_FILES.italic, "italic")?,
        bold_italic: load_fallback_font(
            &directory,
            FALLBACK_FONT_FILES.bold_italic,
            "bold italic",
        )?,
    })
}

fn fonts_missing(err: &Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::IoError(io_err)
            if io_err.kind() == io::ErrorKind::NotFound
                || io_err.kind() == io::ErrorKind::PermissionDenied
    )
}

/// Returns the Roboto font family, falling back to Arial when the Roboto files are missing.
pub fn default_font_family() -> Result<FontFamily<FontData>, Error> {
    match load_bundled_font_family() {
        Ok(family) => Ok(family),
        Err(err) if fonts_missing(&err) => match fallback_font_family() {
            Ok(fallback) => {
                warn!(
                    "Bundled fonts unavailable ({}); falling back to '{}'.",
                    err, FALLBACK_FAMILY_NAME
                );
                Ok(fallback)
            }
            Err(fallback_err) => {
                warn!(
                    "Bundled fonts unavailable ({}); fallback failed: {}",
                    err, fallback_err
                );
                Err(Error::new(
                    format!(
                        "Bundled fonts unavailable and fallback failed: {}",
                        fallback_err
                    ),
                    io::Error::new(io::ErrorKind::NotFound, "default fonts are not available"),
                ))
            }
        },
        Err(err) => Err(err),
    }
}

/// Indicates whether the Roboto font files can be found.
pub fn default_fonts_available() -> bool {
    resolve_font_directory().is_ok()
}
