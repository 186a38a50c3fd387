//! Utility functions for output filenames and paths

use crate::config::FileCollisionAction;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Longest file stem kept by [`sanitize_filename`], in characters
const MAX_STEM_CHARS: usize = 180;

/// Turn a document title into a safe file stem
///
/// Path separators, characters reserved on common filesystems and control characters become
/// `_`; surrounding whitespace and trailing dots are removed. Returns `fallback` when nothing
/// usable is left.
///
/// # Examples
///
/// ```
/// use folio_dl::utils::sanitize_filename;
///
/// assert_eq!(sanitize_filename("Algebra: Part 1/2", "Book"), "Algebra_ Part 1_2");
/// assert_eq!(sanitize_filename("  ...  ", "Book"), "Book");
/// ```
#[must_use]
pub fn sanitize_filename(title: &str, fallback: &str) -> String {
    let replaced: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_STEM_CHARS)
        .collect();

    let cleaned = replaced.trim().trim_end_matches('.').trim_end();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        fallback.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Resolve where a finished document should be written, according to `action`
///
/// Returns `None` when the path exists and the action is [`FileCollisionAction::Skip`].
/// For [`FileCollisionAction::Rename`] a ` (n)` suffix is appended to the stem until the name
/// is free.
///
/// # Examples
///
/// ```
/// use folio_dl::utils::get_unique_path;
/// use folio_dl::config::FileCollisionAction;
/// use std::path::Path;
///
/// let path = Path::new("/tmp/folio-dl-doc-example/Book.pdf");
/// let unique = get_unique_path(path, FileCollisionAction::Rename).unwrap();
/// // If Book.pdf exists, returns Book (1).pdf
/// // If that exists too, returns Book (2).pdf, etc.
/// assert!(unique.is_some());
/// ```
pub fn get_unique_path(path: &Path, action: FileCollisionAction) -> Result<Option<PathBuf>> {
    match action {
        FileCollisionAction::Overwrite => Ok(Some(path.to_path_buf())),
        FileCollisionAction::Skip => {
            if path.exists() {
                return Ok(None);
            }
            Ok(Some(path.to_path_buf()))
        }
        FileCollisionAction::Rename => {
            if !path.exists() {
                return Ok(Some(path.to_path_buf()));
            }

            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| invalid_path(path, "cannot extract file stem"))?;
            let extension = path.extension().and_then(|e| e.to_str());
            let parent = path
                .parent()
                .ok_or_else(|| invalid_path(path, "cannot extract parent directory"))?;

            for i in 1..=MAX_RENAME_ATTEMPTS {
                let new_name = match extension {
                    Some(ext) => format!("{} ({}).{}", stem, i, ext),
                    None => format!("{} ({})", stem, i),
                };
                let new_path = parent.join(new_name);
                if !new_path.exists() {
                    return Ok(Some(new_path));
                }
            }

            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!(
                    "no free filename for {} after {MAX_RENAME_ATTEMPTS} attempts",
                    path.display()
                ),
            )))
        }
    }
}

fn invalid_path(path: &Path, reason: &str) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("{}: {reason}", path.display()),
    ))
}
