//! Utility functions for file naming, text truncation and size formatting

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Insert a ` (n)` counter before the extension of `filename`
///
/// # Examples
///
/// ```
/// use chat_export::utils::suffixed_filename;
///
/// assert_eq!(suffixed_filename("image.png", 1), "image (1).png");
/// assert_eq!(suffixed_filename("archive.tar.gz", 2), "archive.tar (2).gz");
/// assert_eq!(suffixed_filename("README", 3), "README (3)");
/// ```
pub fn suffixed_filename(filename: &str, n: u32) -> String {
    let path = Path::new(filename);
    let stem = path.file_stem().and_then(|s| s.to_str());
    let extension = path.extension().and_then(|e| e.to_str());
    match (stem, extension) {
        (Some(stem), Some(ext)) => format!("{} ({}).{}", stem, n, ext),
        (Some(stem), None) => format!("{} ({})", stem, n),
        _ => format!("{} ({})", filename, n),
    }
}

/// Get a path that does not exist yet, appending (1), (2), ... when needed
///
/// # Examples
///
/// ```
/// use chat_export::utils::get_unique_path;
/// use std::path::Path;
///
/// let path = Path::new("/tmp/export-general-2024-05-01.html");
/// let unique = get_unique_path(path).unwrap();
/// // If the file exists, returns /tmp/export-general-2024-05-01 (1).html
/// ```
pub fn get_unique_path(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Ok(path.to_path_buf());
    }

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Other(format!("cannot extract file name from {}", path.display())))?;
    let parent = path.parent().unwrap_or_else(|| Path::new(""));

    for i in 1..=MAX_RENAME_ATTEMPTS {
        let candidate = parent.join(suffixed_filename(filename, i));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(Error::Other(format!(
        "could not find unique filename for {} after {} attempts",
        path.display(),
        MAX_RENAME_ATTEMPTS
    )))
}

/// Reduce a label to a filename-safe scope component
///
/// Lower-cases, keeps `[a-z0-9_-]`, collapses every other run into a single `-`
/// and trims dashes at the ends. Empty results become `"export"`.
///
/// # Examples
///
/// ```
/// use chat_export::utils::sanitize_scope;
///
/// assert_eq!(sanitize_scope("#General Chat!"), "general-chat");
/// assert_eq!(sanitize_scope("日本語"), "export");
/// ```
#[must_use]
pub fn sanitize_scope(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut pending_dash = false;
    for c in label.chars().flat_map(|c| c.to_lowercase()) {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "export".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Truncate to at most `limit` characters, marking the cut with `...`
#[must_use]
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Human-readable byte size (`512 B`, `1.5 KB`, `3.2 MB`)
#[must_use]
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
