//! Path utilities for upload names and extensions.
//!
//! Uploads arrive with a client-chosen filename. These helpers derive the
//! lowercased extension the conversion table is keyed by, produce a
//! filesystem-safe version of the name, and screen out names that must never
//! reach the conversion engine.

use crate::{Error, Result};
use std::path::Path;

/// Extensions accepted for upload.
const UPLOAD_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "odt", "rtf", "txt", "html", "htm", "csv", "png", "jpg", "jpeg", "gif",
    "bmp", "tiff", "tif", "webp", "mp4", "avi", "mov", "wmv", "mp3", "wav", "flac", "aac",
];

/// Extensions that are refused even when disguised behind an allowed one.
const EXECUTABLE_EXTENSIONS: &[&str] = &[
    "exe", "bat", "cmd", "scr", "pif", "com", "vbs", "js", "jar", "app", "deb", "rpm",
];

/// Normalize an extension to lowercase with a single leading dot.
///
/// An empty input stays empty so that "no extension" never matches a table
/// entry.
///
/// # Examples
///
/// ```
/// use convertforge_common::paths::normalize_extension;
///
/// assert_eq!(normalize_extension("PDF"), ".pdf");
/// assert_eq!(normalize_extension(".Docx"), ".docx");
/// assert_eq!(normalize_extension(""), "");
/// ```
pub fn normalize_extension(ext: &str) -> String {
    let trimmed = ext.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        return String::new();
    }
    format!(".{}", trimmed.to_lowercase())
}

/// The normalized extension of a filename, or an empty string.
///
/// # Examples
///
/// ```
/// use convertforge_common::paths::extension_of;
///
/// assert_eq!(extension_of("Report.TXT"), ".txt");
/// assert_eq!(extension_of("archive.tar.gz"), ".gz");
/// assert_eq!(extension_of("README"), "");
/// ```
pub fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(normalize_extension)
        .unwrap_or_default()
}

/// The filename without its final extension; `"output"` when nothing usable
/// remains.
pub fn stem_of(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("output")
        .to_string()
}

/// Replace every character outside `[A-Za-z0-9.-]` with `_`.
///
/// Any directory components are dropped first so a crafted name cannot
/// escape the directory it is joined to.
///
/// # Examples
///
/// ```
/// use convertforge_common::paths::sanitize_filename;
///
/// assert_eq!(sanitize_filename("my report (1).pdf"), "my_report__1_.pdf");
/// assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
/// ```
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    match cleaned.trim_start_matches('.') {
        "" => "upload".to_string(),
        _ => cleaned,
    }
}

/// Check if an extension (with or without the leading dot) is accepted for
/// upload.
pub fn is_upload_extension(ext: &str) -> bool {
    let normalized = normalize_extension(ext);
    UPLOAD_EXTENSIONS.contains(&normalized.trim_start_matches('.'))
}

/// Screen an upload name before it is persisted.
///
/// Returns the normalized extension on success. Names ending in an executable
/// extension, or disguising one directly in front of an allowed extension
/// (`notes.exe.pdf`), are rejected, as is anything outside the upload set.
///
/// # Errors
///
/// Returns [`Error::Rejected`] describing why the name was refused.
pub fn screen_upload_name(name: &str) -> Result<String> {
    let lowered = name.trim().to_lowercase();
    let mut segments = lowered.rsplit('.');
    let last = segments.next().unwrap_or_default();
    let inner = segments.next();

    let has_extension = lowered.contains('.');
    if has_extension && EXECUTABLE_EXTENSIONS.contains(&last) {
        return Err(Error::rejected(format!(
            "file type not allowed for security reasons: {name}"
        )));
    }
    if let Some(inner) = inner {
        if lowered.matches('.').count() >= 2 && EXECUTABLE_EXTENSIONS.contains(&inner) {
            return Err(Error::rejected(format!(
                "file type not allowed for security reasons: {name}"
            )));
        }
    }

    let ext = extension_of(&lowered);
    if !is_upload_extension(&ext) {
        return Err(Error::rejected(format!(
            "unsupported file type: {}",
            if ext.is_empty() { "<none>" } else { ext.as_str() }
        )));
    }

    Ok(ext)
}

/// Get the list of accepted upload extensions (without dots).
#[must_use]
pub fn upload_extensions() -> &'static [&'static str] {
    UPLOAD_EXTENSIONS
}
