//! Overlapping word-window chunker.
//!
//! Each page is split on whitespace into windows of `chunk_words` words;
//! consecutive windows share `overlap_words` words. Windows advance until
//! their start passes the last word, so a page whose length is not a whole
//! number of steps ends with a window made of overlap words. Chunk ids are
//! `{file-name}#chunk-{n}` with `n` counted across the whole document, and
//! every chunk carries a citation label `"{file-stem} (book) - page {p}"`.
//!
//! Chunking stops as soon as `max_chunks` chunks exist.

use std::path::Path;

use crate::models::{Chunk, PageText};

/// Split pages into overlapping word windows.
///
/// `overlap_words` must be smaller than `chunk_words` (enforced by config
/// validation); a larger overlap is clamped so the window always advances.
pub fn chunk_pages(
    path: &Path,
    pages: &[PageText],
    chunk_words: usize,
    overlap_words: usize,
    max_chunks: usize,
) -> Vec<Chunk> {
    let chunk_words = chunk_words.max(1);
    let step = chunk_words - overlap_words.min(chunk_words - 1);

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut chunks = Vec::new();
    'pages: for page in pages {
        let words: Vec<&str> = page.text.split_whitespace().collect();
        let source = format!("{} (book) - page {}", stem, page.page);

        let mut start = 0;
        while start < words.len() {
            if chunks.len() >= max_chunks {
                break 'pages;
            }
            let end = (start + chunk_words).min(words.len());
            chunks.push(Chunk {
                id: format!("{}#chunk-{}", file_name, chunks.len()),
                text: words[start..end].join(" "),
                source: source.clone(),
            });
            start += step;
        }
    }

    chunks
}
