//! Aho-Corasick automaton over the blacklist corpus
//!
//! The trie is built with per-state transition lists, failure links are
//! computed breadth-first, and the result is flattened into a handful of
//! parallel arrays:
//!
//! ```text
//! state s:  trans_bytes[trans_start[s]..trans_start[s+1]]   sorted edge labels
//!           trans_targets[...same range...]                  edge targets
//!           fail[s]     longest proper suffix that is also a trie prefix
//!           output[s]   pattern id + 1 terminating at s (0 = none)
//!           dict[s]     nearest state on the fail chain with an output
//! ```
//!
//! Root transitions live in a dense 256-entry table because almost every
//! byte of scanned text passes through the root. Once built, the automaton
//! is immutable and can be shared read-only between workers.

use crate::cache::Artifact;
use crate::error::{ScanError, ScanResult};
use crate::matching::corpus::PatternCorpus;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

const ROOT: u32 = 0;
const NO_STATE: u32 = u32::MAX;

/// Compiled multi-pattern matcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Automaton {
    patterns: Vec<String>,
    root_table: Vec<u32>,
    trans_start: Vec<u32>,
    trans_bytes: Vec<u8>,
    trans_targets: Vec<u32>,
    fail: Vec<u32>,
    output: Vec<u32>,
    dict: Vec<u32>,
    max_pattern_len: usize,
}

/// A match reported relative to the scanned buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawMatch {
    /// Offset one past the last matched byte
    pub end: usize,
    pub pattern_id: u32,
}

impl Automaton {
    /// Build from an already-normalized corpus.
    ///
    /// The corpus is sorted, so two corpora with the same entries produce
    /// identical automata regardless of the order they were read in.
    pub fn build(corpus: &PatternCorpus) -> Self {
        let patterns = corpus.patterns().to_vec();

        // Trie with sparse, sorted edge lists
        let mut edges: Vec<Vec<(u8, u32)>> = vec![Vec::new()];
        let mut output: Vec<u32> = vec![0];
        for (id, pattern) in patterns.iter().enumerate() {
            let mut state = ROOT;
            for &byte in pattern.as_bytes() {
                let list = &edges[state as usize];
                state = match list.binary_search_by_key(&byte, |&(b, _)| b) {
                    Ok(pos) => list[pos].1,
                    Err(pos) => {
                        let next = edges.len() as u32;
                        edges[state as usize].insert(pos, (byte, next));
                        edges.push(Vec::new());
                        output.push(0);
                        next
                    }
                };
            }
            output[state as usize] = id as u32 + 1;
        }

        let state_count = edges.len();
        let mut fail = vec![ROOT; state_count];
        let mut dict = vec![NO_STATE; state_count];

        let goto = |edges: &[Vec<(u8, u32)>], state: u32, byte: u8| -> Option<u32> {
            let list = &edges[state as usize];
            list.binary_search_by_key(&byte, |&(b, _)| b)
                .ok()
                .map(|pos| list[pos].1)
        };

        let mut queue: VecDeque<u32> = edges[ROOT as usize].iter().map(|&(_, t)| t).collect();
        while let Some(state) = queue.pop_front() {
            for &(byte, target) in &edges[state as usize] {
                queue.push_back(target);
                // `state` is never the root here, so the link found is
                // strictly shallower than `target`.
                let mut f = fail[state as usize];
                let link = loop {
                    if let Some(next) = goto(&edges, f, byte) {
                        break next;
                    }
                    if f == ROOT {
                        break ROOT;
                    }
                    f = fail[f as usize];
                };
                fail[target as usize] = link;
                let f = link;
                dict[target as usize] = if output[f as usize] != 0 {
                    f
                } else {
                    dict[f as usize]
                };
            }
        }

        let mut root_table = vec![ROOT; 256];
        for &(byte, target) in &edges[ROOT as usize] {
            root_table[byte as usize] = target;
        }

        let mut trans_start = Vec::with_capacity(state_count + 1);
        let total_edges: usize = edges.iter().map(Vec::len).sum();
        let mut trans_bytes = Vec::with_capacity(total_edges);
        let mut trans_targets = Vec::with_capacity(total_edges);
        for list in &edges {
            trans_start.push(trans_bytes.len() as u32);
            for &(byte, target) in list {
                trans_bytes.push(byte);
                trans_targets.push(target);
            }
        }
        trans_start.push(trans_bytes.len() as u32);

        let max_pattern_len = patterns.iter().map(String::len).max().unwrap_or(0);
        debug!(
            "Built automaton: {} patterns, {} states, {} edges",
            patterns.len(),
            state_count,
            total_edges
        );

        Self {
            patterns,
            root_table,
            trans_start,
            trans_bytes,
            trans_targets,
            fail,
            output,
            dict,
            max_pattern_len,
        }
    }

    /// Normalize raw entries into a corpus and build from it.
    ///
    /// Fails with [`ScanError::InvalidPattern`] on empty entries.
    pub fn from_patterns<I, S>(entries: I) -> ScanResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self::build(&PatternCorpus::new(entries)?))
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn pattern(&self, id: u32) -> &str {
        &self.patterns[id as usize]
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn state_count(&self) -> usize {
        self.fail.len()
    }

    /// Length in bytes of the longest pattern
    pub fn max_pattern_len(&self) -> usize {
        self.max_pattern_len
    }

    /// Start state for a fresh scan
    pub fn start_state(&self) -> u32 {
        ROOT
    }

    #[inline]
    fn goto(&self, state: u32, byte: u8) -> Option<u32> {
        if state == ROOT {
            let next = self.root_table[byte as usize];
            return Some(next);
        }
        let lo = self.trans_start[state as usize] as usize;
        let hi = self.trans_start[state as usize + 1] as usize;
        self.trans_bytes[lo..hi]
            .binary_search(&byte)
            .ok()
            .map(|pos| self.trans_targets[lo + pos])
    }

    #[inline]
    fn next_state(&self, mut state: u32, byte: u8) -> u32 {
        loop {
            if let Some(next) = self.goto(state, byte) {
                return next;
            }
            state = self.fail[state as usize];
        }
    }

    /// Advance from `state` over `haystack`, reporting every match.
    ///
    /// Returns the state reached after the last byte so a caller can resume
    /// on the next buffer without losing matches that straddle the boundary.
    pub fn scan_from<F>(&self, mut state: u32, haystack: &[u8], mut on_match: F) -> u32
    where
        F: FnMut(RawMatch),
    {
        for (i, &byte) in haystack.iter().enumerate() {
            state = self.next_state(state, byte);
            let end = i + 1;
            let own = self.output[state as usize];
            if own != 0 {
                on_match(RawMatch {
                    end,
                    pattern_id: own - 1,
                });
            }
            let mut d = self.dict[state as usize];
            while d != NO_STATE {
                on_match(RawMatch {
                    end,
                    pattern_id: self.output[d as usize] - 1,
                });
                d = self.dict[d as usize];
            }
        }
        state
    }

    /// All matches in `haystack` as `(start, pattern)` pairs
    pub fn find_all<'a>(&'a self, haystack: &[u8]) -> Vec<(usize, &'a str)> {
        let mut found = Vec::new();
        self.scan_from(ROOT, haystack, |m| {
            let pattern = self.pattern(m.pattern_id);
            found.push((m.end - pattern.len(), pattern));
        });
        found
    }

    /// Serialize to a compact binary blob
    pub fn to_bytes(&self) -> ScanResult<Vec<u8>> {
        bitcode::serialize(self).map_err(|e| ScanError::serialization("automaton", e))
    }

    /// Inverse of [`Automaton::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> ScanResult<Self> {
        let automaton: Automaton =
            bitcode::deserialize(bytes).map_err(|e| ScanError::serialization("automaton", e))?;
        automaton.check_tables()?;
        Ok(automaton)
    }

    /// Structural sanity check for deserialized data
    fn check_tables(&self) -> ScanResult<()> {
        let states = self.fail.len();
        let consistent = self.root_table.len() == 256
            && self.trans_start.len() == states + 1
            && self.output.len() == states
            && self.dict.len() == states
            && self.trans_bytes.len() == self.trans_targets.len()
            && self.trans_start.last().map(|&n| n as usize) == Some(self.trans_bytes.len())
            && self.trans_targets.iter().all(|&t| (t as usize) < states)
            && self.root_table.iter().all(|&t| (t as usize) < states)
            && self.fail.iter().all(|&t| (t as usize) < states)
            && self
                .output
                .iter()
                .all(|&o| o == 0 || (o as usize) <= self.patterns.len());
        if consistent {
            Ok(())
        } else {
            Err(ScanError::serialization(
                "automaton",
                "inconsistent state tables",
            ))
        }
    }
}

impl Artifact for Automaton {
    const KIND: &'static str = "automaton";
    const VERSION: u32 = 1;

    fn validate(&self) -> ScanResult<()> {
        self.check_tables()
    }
}
