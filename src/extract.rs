//! Page-level text extraction for the source document.
//!
//! The retrieval core consumes `(page number, text)` pairs; this module
//! produces them from a file on disk. PDFs are decoded with `pdf-extract`,
//! plain text and markdown are split on form feeds (one page otherwise).
//!
//! Extraction never fails the caller: an unreadable document yields no
//! pages and a warning, and the corpus ends up empty.

use std::path::Path;

use thiserror::Error;
use tracing::warn;

use crate::models::PageText;

/// Form feed, used as the page separator in plain-text documents.
const PAGE_BREAK: char = '\x0c';

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported document type: {0}")]
    UnsupportedType(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// Supplies decoded page text for a document.
pub trait DocumentReader: Send + Sync {
    /// Return up to `max_pages` pages, numbered from 1. Empty on failure.
    fn read_pages(&self, path: &Path, max_pages: usize) -> Vec<PageText>;
}

/// Reads PDF, `.txt` and `.md` files from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileDocumentReader;

impl DocumentReader for FileDocumentReader {
    fn read_pages(&self, path: &Path, max_pages: usize) -> Vec<PageText> {
        match extract_pages(path, max_pages) {
            Ok(pages) => pages,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "document unreadable, corpus will be empty");
                Vec::new()
            }
        }
    }
}

/// Extract page texts from a file, dispatching on its extension.
pub fn extract_pages(path: &Path, max_pages: usize) -> Result<Vec<PageText>, ExtractError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let raw_pages = match ext.as_str() {
        "pdf" => extract_pdf_pages(&bytes)?,
        "txt" | "md" | "markdown" | "text" => split_text_pages(&String::from_utf8_lossy(&bytes)),
        other => return Err(ExtractError::UnsupportedType(other.to_string())),
    };

    Ok(number_pages(raw_pages, max_pages))
}

fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn split_text_pages(text: &str) -> Vec<String> {
    text.split(PAGE_BREAK).map(str::to_string).collect()
}

fn number_pages(raw: Vec<String>, max_pages: usize) -> Vec<PageText> {
    raw.into_iter()
        .take(max_pages)
        .enumerate()
        .map(|(i, text)| PageText { page: i + 1, text })
        .collect()
}
