//! Blacklist pattern corpus
//!
//! The blacklist is a newline-delimited file, one domain or URL per line.
//! Entries are trimmed, lowercased and deduplicated; the corpus keeps them
//! sorted so the automaton built from it does not depend on input order.

use crate::error::{ScanError, ScanResult};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

/// Ordered, duplicate-free set of normalized patterns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternCorpus {
    patterns: Vec<String>,
}

impl PatternCorpus {
    /// Build a corpus from raw entries.
    ///
    /// Fails with [`ScanError::InvalidPattern`] on the first entry that is
    /// empty after trailing whitespace is stripped. Line numbers are 1-based
    /// positions in `entries`.
    pub fn new<I, S>(entries: I) -> ScanResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for (i, entry) in entries.into_iter().enumerate() {
            let normalized = normalize(entry.as_ref());
            if normalized.is_empty() {
                return Err(ScanError::InvalidPattern {
                    line: i + 1,
                    reason: "empty pattern".to_string(),
                });
            }
            set.insert(normalized);
        }
        Ok(Self {
            patterns: set.into_iter().collect(),
        })
    }

    /// Parse newline-delimited blacklist text
    pub fn parse(text: &str) -> ScanResult<Self> {
        Self::new(text.lines())
    }

    /// Load a blacklist file from disk
    pub fn load(path: &Path) -> ScanResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ScanError::io(path, e))?;
        let corpus = Self::parse(&text)?;
        debug!(
            "Loaded {} blacklist patterns from {}",
            corpus.len(),
            path.display()
        );
        Ok(corpus)
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Content key used to tell whether a persisted automaton belongs to this corpus
    pub fn content_key(&self) -> u64 {
        let mut buf = Vec::with_capacity(self.patterns.iter().map(|p| p.len() + 1).sum());
        for pattern in &self.patterns {
            buf.extend_from_slice(pattern.as_bytes());
            buf.push(b'\n');
        }
        xxh3_64(&buf)
    }
}

fn normalize(raw: &str) -> String {
    raw.trim_end().to_lowercase()
}
