//! Load-or-build pipeline for the document corpus.
//!
//! A [`Corpus`] owns the current [`TfidfIndex`] snapshot behind a
//! read-write lock. Opening a corpus reuses the persisted snapshot when the
//! document's identity (path + mtime) is unchanged, otherwise it reads the
//! document, chunks it, builds a fresh index and persists it.
//!
//! Searches take a cheap `Arc` clone of the current snapshot, so a
//! [`Corpus::refresh`] never interleaves with an in-flight search.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::Result;
use tracing::{info, warn};

use crate::chunk::chunk_pages;
use crate::config::Config;
use crate::extract::{DocumentReader, FileDocumentReader};
use crate::index::{SearchHit, TfidfIndex};
use crate::models::SourceIdentity;

/// Anything that can answer a top-k passage query.
pub trait Retriever: Send + Sync {
    fn retrieve(&self, query: &str, k: usize) -> Vec<SearchHit>;
}

impl Retriever for TfidfIndex {
    fn retrieve(&self, query: &str, k: usize) -> Vec<SearchHit> {
        self.search(query, k)
    }
}

/// Where the current index came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    /// Reused a valid snapshot from the cache file.
    Cache,
    /// Built from the document (and persisted, if a cache path is set).
    Built,
    /// Document missing or yielded no text.
    Empty,
}

impl std::fmt::Display for IndexOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexOrigin::Cache => write!(f, "cache"),
            IndexOrigin::Built => write!(f, "built"),
            IndexOrigin::Empty => write!(f, "empty"),
        }
    }
}

/// Chunking parameters applied when the index must be rebuilt.
#[derive(Debug, Clone)]
pub struct CorpusSettings {
    pub document: PathBuf,
    pub cache_path: Option<PathBuf>,
    pub max_pages: usize,
    pub max_chunks: usize,
    pub chunk_words: usize,
    pub overlap_words: usize,
}

impl CorpusSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            document: config.document.path.clone(),
            cache_path: config.index.cache_path.clone(),
            max_pages: config.document.max_pages,
            max_chunks: config.document.max_chunks,
            chunk_words: config.chunking.chunk_words,
            overlap_words: config.chunking.overlap_words,
        }
    }
}

pub struct Corpus {
    settings: CorpusSettings,
    reader: Box<dyn DocumentReader>,
    current: RwLock<(Arc<TfidfIndex>, IndexOrigin)>,
}

impl Corpus {
    /// Open the corpus described by `config` using the file reader.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::open(CorpusSettings::from_config(config), Box::new(FileDocumentReader))
    }

    /// Open a corpus, reusing the snapshot when it is still valid.
    pub fn open(settings: CorpusSettings, reader: Box<dyn DocumentReader>) -> Result<Self> {
        let (index, origin) = load_or_build(&settings, reader.as_ref(), false)?;
        Ok(Self {
            settings,
            reader,
            current: RwLock::new((Arc::new(index), origin)),
        })
    }

    /// Re-check the document and swap in a new snapshot.
    ///
    /// With `force`, the cache is ignored and the index is rebuilt.
    pub fn refresh(&self, force: bool) -> Result<IndexOrigin> {
        let (index, origin) = load_or_build(&self.settings, self.reader.as_ref(), force)?;
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = (Arc::new(index), origin);
        Ok(origin)
    }

    /// The index currently serving searches, with where it came from.
    pub fn state(&self) -> (Arc<TfidfIndex>, IndexOrigin) {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        (guard.0.clone(), guard.1)
    }

    pub fn snapshot(&self) -> Arc<TfidfIndex> {
        self.state().0
    }

    pub fn origin(&self) -> IndexOrigin {
        self.state().1
    }

    pub fn document(&self) -> &Path {
        &self.settings.document
    }
}

impl Retriever for Corpus {
    fn retrieve(&self, query: &str, k: usize) -> Vec<SearchHit> {
        self.snapshot().search(query, k)
    }
}

fn load_or_build(
    settings: &CorpusSettings,
    reader: &dyn DocumentReader,
    force: bool,
) -> Result<(TfidfIndex, IndexOrigin)> {
    let identity = SourceIdentity::of_file(&settings.document);
    let mut index = TfidfIndex::new(settings.cache_path.clone());

    if !force && index.reload(&identity) {
        info!(
            document = %settings.document.display(),
            chunks = index.len(),
            "loaded index snapshot"
        );
        return Ok((index, IndexOrigin::Cache));
    }

    if identity.modified_ns.is_none() {
        warn!(document = %settings.document.display(), "document not found, corpus is empty");
        return Ok((index, IndexOrigin::Empty));
    }

    let pages = reader.read_pages(&settings.document, settings.max_pages);
    let chunks = chunk_pages(
        &settings.document,
        &pages,
        settings.chunk_words,
        settings.overlap_words,
        settings.max_chunks,
    );
    if chunks.is_empty() {
        warn!(document = %settings.document.display(), "document yielded no text, corpus is empty");
        return Ok((index, IndexOrigin::Empty));
    }

    index.build(chunks, identity);
    if let Err(e) = index.persist() {
        warn!(error = %e, "failed to persist index snapshot");
    }
    info!(
        document = %settings.document.display(),
        pages = pages.len(),
        chunks = index.len(),
        "built index"
    );
    Ok((index, IndexOrigin::Built))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PageText;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime};

    /// Reader that counts how often it is consulted.
    struct CountingReader {
        calls: Arc<AtomicUsize>,
    }

    impl DocumentReader for CountingReader {
        fn read_pages(&self, path: &Path, max_pages: usize) -> Vec<PageText> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            FileDocumentReader.read_pages(path, max_pages)
        }
    }

    fn settings(dir: &Path) -> CorpusSettings {
        CorpusSettings {
            document: dir.join("notes.txt"),
            cache_path: Some(dir.join("cache/index.json")),
            max_pages: 10,
            max_chunks: 64,
            chunk_words: 20,
            overlap_words: 5,
        }
    }

    fn open(settings: CorpusSettings) -> (Corpus, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let corpus = Corpus::open(
            settings,
            Box::new(CountingReader {
                calls: calls.clone(),
            }),
        )
        .unwrap();
        (corpus, calls)
    }

    #[test]
    fn test_builds_then_reuses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        std::fs::write(&s.document, "the one time pad\x0ckey reuse is fatal").unwrap();

        let (first, calls) = open(s.clone());
        assert_eq!(first.origin(), IndexOrigin::Built);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.snapshot().len(), 2);
        assert!(s.cache_path.as_ref().unwrap().exists());

        let (second, calls) = open(s);
        assert_eq!(second.origin(), IndexOrigin::Cache);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let hits = second.retrieve("reuse", 3);
        assert_eq!(hits[0].chunk.source, "notes (book) - page 2");
    }

    #[test]
    fn test_mtime_change_invalidates_cache() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        std::fs::write(&s.document, "alpha beta").unwrap();
        let (_first, _) = open(s.clone());

        std::fs::write(&s.document, "gamma delta").unwrap();
        let file = std::fs::File::options()
            .write(true)
            .open(&s.document)
            .unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(5))
            .unwrap();

        let (second, calls) = open(s);
        assert_eq!(second.origin(), IndexOrigin::Built);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(second.retrieve("alpha", 3).is_empty());
        assert_eq!(second.retrieve("gamma", 3).len(), 1);
    }

    #[test]
    fn test_missing_document_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (corpus, calls) = open(settings(dir.path()));
        assert_eq!(corpus.origin(), IndexOrigin::Empty);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(corpus.retrieve("anything", 3).is_empty());
    }

    #[test]
    fn test_refresh_force_rebuilds() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        std::fs::write(&s.document, "alpha beta").unwrap();
        let (corpus, calls) = open(s);
        let before = corpus.snapshot();

        assert_eq!(corpus.refresh(false).unwrap(), IndexOrigin::Cache);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(corpus.refresh(true).unwrap(), IndexOrigin::Built);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // earlier snapshot stays valid for holders
        assert_eq!(before.len(), 1);
        assert_eq!(corpus.snapshot().len(), 1);
    }

    #[test]
    fn test_refresh_swaps_index_and_origin_together() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        std::fs::write(&s.document, "alpha beta").unwrap();
        let (corpus, _) = open(s.clone());
        let (before, origin) = corpus.state();
        assert_eq!(origin, IndexOrigin::Built);

        std::fs::remove_file(&s.document).unwrap();
        assert_eq!(corpus.refresh(true).unwrap(), IndexOrigin::Empty);
        let (after, origin) = corpus.state();
        assert_eq!(origin, IndexOrigin::Empty);
        assert!(after.is_empty());
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_corrupt_cache_falls_back_to_build() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        std::fs::write(&s.document, "alpha beta").unwrap();
        let cache = s.cache_path.clone().unwrap();
        std::fs::create_dir_all(cache.parent().unwrap()).unwrap();
        std::fs::write(&cache, "garbage").unwrap();

        let (corpus, _) = open(s);
        assert_eq!(corpus.origin(), IndexOrigin::Built);
        assert_eq!(corpus.retrieve("alpha", 3).len(), 1);
    }
}
