//! TF-IDF vector index with JSON snapshot persistence.
//!
//! # Scoring
//!
//! | Quantity | Definition |
//! |----------|------------|
//! | tokens   | maximal `\w+` runs of the lower-cased text |
//! | TF       | `count(term) / max(1, #tokens)` |
//! | IDF      | `ln((N + 1) / (df + 1)) + 1`, `N = max(1, #chunks)` |
//! | vector   | `TF * IDF` per vocabulary term, L2-normalized |
//! | score    | dot product of query and chunk vectors |
//!
//! The vocabulary is sorted lexicographically so two builds over the same
//! chunk text produce identical term indices.
//!
//! # Snapshots
//!
//! [`TfidfIndex::persist`] writes the whole index (source identity,
//! vocabulary, IDF, vectors, chunks) as one JSON document. A snapshot is
//! only reused by [`TfidfIndex::reload`] when its recorded
//! [`SourceIdentity`] matches exactly; any mismatch means "rebuild".

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{Chunk, SourceIdentity};

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").expect("valid regex"));

/// Lower-case `text` and return its word tokens in order.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// A chunk returned by [`TfidfIndex::search`] with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f64,
}

/// On-disk layout of a persisted index.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    source: SourceIdentity,
    built_at: DateTime<Utc>,
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f64>,
    vectors: Vec<Vec<f64>>,
    chunks: Vec<Chunk>,
}

impl Snapshot {
    /// Structural checks: every table must line up with the vocabulary
    /// and with the chunk list.
    fn check(&self) -> Result<(), String> {
        let dims = self.vocabulary.len();
        if self.idf.len() != dims {
            return Err(format!("idf has {} entries, vocabulary {}", self.idf.len(), dims));
        }
        if self.vectors.len() != self.chunks.len() {
            return Err(format!(
                "{} vectors for {} chunks",
                self.vectors.len(),
                self.chunks.len()
            ));
        }
        if let Some(bad) = self.vectors.iter().position(|v| v.len() != dims) {
            return Err(format!("vector {} has wrong dimension", bad));
        }
        let mut seen = vec![false; dims];
        for &idx in self.vocabulary.values() {
            match seen.get_mut(idx) {
                Some(slot) if !*slot => *slot = true,
                _ => return Err(format!("vocabulary index {} out of range or repeated", idx)),
            }
        }
        Ok(())
    }
}

/// In-memory TF-IDF index over a fixed chunk sequence.
///
/// Invariant: `vectors[i]` belongs to `chunks[i]`, and every vector has
/// one dimension per vocabulary term.
#[derive(Debug, Clone, Default)]
pub struct TfidfIndex {
    cache_path: Option<PathBuf>,
    source: Option<SourceIdentity>,
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
    vectors: Vec<Vec<f64>>,
    chunks: Vec<Chunk>,
}

impl TfidfIndex {
    /// Create an empty index, optionally bound to a snapshot file.
    pub fn new(cache_path: Option<PathBuf>) -> Self {
        Self {
            cache_path,
            ..Self::default()
        }
    }

    /// Build the index from `chunks`, replacing any previous state.
    pub fn build(&mut self, chunks: Vec<Chunk>, source: SourceIdentity) {
        let tokenized: Vec<Vec<String>> = chunks.iter().map(|c| tokenize(&c.text)).collect();

        let mut df: BTreeMap<&str, usize> = BTreeMap::new();
        for tokens in &tokenized {
            let mut distinct: Vec<&str> = tokens.iter().map(String::as_str).collect();
            distinct.sort_unstable();
            distinct.dedup();
            for term in distinct {
                *df.entry(term).or_insert(0) += 1;
            }
        }

        let n_docs = chunks.len().max(1) as f64;
        let vocabulary: HashMap<String, usize> = df
            .keys()
            .enumerate()
            .map(|(i, term)| (term.to_string(), i))
            .collect();
        let idf: Vec<f64> = df
            .values()
            .map(|&d| ((n_docs + 1.0) / (d as f64 + 1.0)).ln() + 1.0)
            .collect();

        self.vocabulary = vocabulary;
        self.idf = idf;
        self.vectors = tokenized.iter().map(|t| self.weigh(t)).collect();
        self.chunks = chunks;
        self.source = Some(source);

        debug!(
            chunks = self.chunks.len(),
            terms = self.vocabulary.len(),
            "tf-idf index built"
        );
    }

    /// Write the snapshot to the cache path. No-op without a cache path.
    pub fn persist(&self) -> Result<()> {
        let Some(path) = &self.cache_path else {
            return Ok(());
        };

        let snapshot = Snapshot {
            source: self
                .source
                .clone()
                .unwrap_or_else(|| SourceIdentity::new(String::new(), None)),
            built_at: Utc::now(),
            vocabulary: self
                .vocabulary
                .iter()
                .map(|(t, &i)| (t.clone(), i))
                .collect(),
            idf: self.idf.clone(),
            vectors: self.vectors.clone(),
            chunks: self.chunks.clone(),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let body = serde_json::to_vec(&snapshot).context("Failed to serialize index snapshot")?;
        let tmp = tmp_path(path);
        std::fs::write(&tmp, body)
            .with_context(|| format!("Failed to write index snapshot: {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to move index snapshot into {}", path.display()))?;

        debug!(path = %path.display(), chunks = self.chunks.len(), "index snapshot written");
        Ok(())
    }

    /// Load the snapshot if it exists, is well-formed, and was built from
    /// `expected`. Returns `false` (leaving the index untouched) otherwise.
    pub fn reload(&mut self, expected: &SourceIdentity) -> bool {
        let Some(path) = &self.cache_path else {
            return false;
        };
        if !path.exists() {
            return false;
        }

        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "index snapshot unreadable");
                return false;
            }
        };
        let snapshot: Snapshot = match serde_json::from_slice(&bytes) {
            Ok(s) => s,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "index snapshot corrupt");
                return false;
            }
        };
        if let Err(reason) = snapshot.check() {
            warn!(path = %path.display(), %reason, "index snapshot inconsistent");
            return false;
        }
        if &snapshot.source != expected {
            debug!(
                path = %path.display(),
                cached = ?snapshot.source,
                current = ?expected,
                "index snapshot is stale"
            );
            return false;
        }

        self.vocabulary = snapshot.vocabulary.into_iter().collect();
        self.idf = snapshot.idf;
        self.vectors = snapshot.vectors;
        self.chunks = snapshot.chunks;
        self.source = Some(snapshot.source);
        true
    }

    /// Return up to `k` chunks most similar to `query`, best first.
    ///
    /// Ties keep corpus order. Chunks scoring `<= 0` are never returned.
    pub fn search(&self, query: &str, k: usize) -> Vec<SearchHit> {
        if self.vectors.is_empty() || k == 0 {
            return Vec::new();
        }

        let q = self.weigh(&tokenize(query));
        let mut scored: Vec<(usize, f64)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, dot(&q, v)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(k)
            .filter(|&(_, score)| score > 0.0)
            .map(|(i, score)| SearchHit {
                chunk: self.chunks[i].clone(),
                score,
            })
            .collect()
    }

    /// TF-IDF weights for a token list over the current vocabulary,
    /// L2-normalized. Out-of-vocabulary tokens still count toward `#tokens`.
    fn weigh(&self, tokens: &[String]) -> Vec<f64> {
        let mut vec = vec![0.0; self.vocabulary.len()];
        let total = tokens.len().max(1) as f64;
        for token in tokens {
            if let Some(&idx) = self.vocabulary.get(token) {
                vec[idx] += 1.0;
            }
        }
        for (idx, v) in vec.iter_mut().enumerate() {
            *v = *v / total * self.idf[idx];
        }
        let norm = vec.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for v in vec.iter_mut() {
                *v /= norm;
            }
        }
        vec
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn vectors(&self) -> &[Vec<f64>] {
        &self.vectors
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    /// Vocabulary terms in index order.
    pub fn terms(&self) -> Vec<&str> {
        let mut terms: Vec<(&str, usize)> = self
            .vocabulary
            .iter()
            .map(|(t, &i)| (t.as_str(), i))
            .collect();
        terms.sort_by_key(|&(_, i)| i);
        terms.into_iter().map(|(t, _)| t).collect()
    }

    pub fn source(&self) -> Option<&SourceIdentity> {
        self.source.as_ref()
    }

    pub fn cache_path(&self) -> Option<&Path> {
        self.cache_path.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
