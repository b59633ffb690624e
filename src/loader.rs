//! Loads documents from a directory tree.
//!
//! Plain-text files are read as UTF-8; `.pdf` files go through text
//! extraction. Symlinks are not followed, so link cycles cannot repeat files.

use std::fs;
use std::panic;
use std::path::Path;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::document::Document;
use crate::error::{RagError, Result};

/// Extensions loaded when the caller does not choose any.
pub const DEFAULT_EXTENSIONS: &[&str] = &["txt", "md", "pdf"];

/// Reads every file under `root` whose extension is in `extensions`.
///
/// Documents come back sorted by path; each `source_id` is the path relative
/// to `root` with `/` separators, so ids stay stable between runs.
pub fn load_directory<S: AsRef<str>>(root: &Path, extensions: &[S]) -> Result<Vec<Document>> {
    let wanted: Vec<String> = extensions
        .iter()
        .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
        .collect();

    let mut documents = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|err| RagError::Io {
            path: err.path().unwrap_or(root).to_path_buf(),
            source: err.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(extension) = wanted_extension(path, &wanted) else {
            continue;
        };
        let text = read_text(path, &extension)?;
        let source_id = relative_id(root, path);
        debug!(%source_id, chars = text.chars().count(), "loaded document");
        documents.push(Document::new(source_id, text));
    }
    info!(root = %root.display(), documents = documents.len(), "documents loaded");
    Ok(documents)
}

fn read_text(path: &Path, extension: &str) -> Result<String> {
    if extension == "pdf" {
        return extract_pdf(path);
    }
    fs::read_to_string(path).map_err(|source| RagError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// pdf-extract panics on some malformed font encodings instead of erroring.
fn extract_pdf(path: &Path) -> Result<String> {
    let owned = path.to_path_buf();
    match panic::catch_unwind(|| pdf_extract::extract_text(&owned)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(err)) => Err(RagError::Extraction {
            path: owned,
            detail: err.to_string(),
        }),
        Err(_) => {
            warn!(path = %path.display(), "pdf extraction panicked");
            Err(RagError::Extraction {
                path: owned,
                detail: "pdf parser panicked (likely malformed font encoding)".to_string(),
            })
        }
    }
}

fn wanted_extension(path: &Path, wanted: &[String]) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    wanted.contains(&ext).then_some(ext)
}

fn relative_id(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
