//! Streaming blacklist scanner
//!
//! Decides per file whether it can be matched in one pass or must be read in
//! chunks, then reports every match with an absolute byte offset.
//!
//! - **Single pass** when `3 * file_size < 2 * budget`: the whole file is
//!   read, validated as UTF-8, case-folded and matched at once.
//! - **Chunked** otherwise: chunks of `budget / 6` bytes (never below
//!   `min_chunk_bytes`), with the budget re-read before every chunk. The
//!   file offset of each chunk is added to its matches.
//!
//! With `span_chunks` enabled the automaton state is carried from one chunk
//! to the next, so chunked results equal single-pass results. With it
//! disabled every chunk starts from the root and a pattern that straddles a
//! chunk boundary is not reported; this is an accepted imprecision.
//!
//! Case folding is ASCII-only so byte offsets in the folded text are byte
//! offsets in the file.

use crate::error::{ScanError, ScanResult};
use crate::matching::automaton::Automaton;
use crate::matching::memory::MemoryBudget;
use crate::models::{MatchRecord, ScanWarning, WarningKind};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default lower bound on chunk size
pub const DEFAULT_MIN_CHUNK_BYTES: usize = 64 * 1024;

/// Tuning knobs for [`StreamingScanner`]
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Chunks are never smaller than this
    pub min_chunk_bytes: usize,
    /// Carry automaton state across chunk boundaries
    pub span_chunks: bool,
    /// Always use chunked mode, even for small files
    pub force_chunked: bool,
    /// Fixed chunk size, bypassing the memory budget
    pub chunk_bytes: Option<usize>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            min_chunk_bytes: DEFAULT_MIN_CHUNK_BYTES,
            span_chunks: true,
            force_chunked: false,
            chunk_bytes: None,
        }
    }
}

/// How a file will be read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPlan {
    SinglePass,
    Chunked,
}

/// Matches and warnings from scanning a list of files
#[derive(Debug, Default)]
pub struct StreamOutcome {
    pub matches: Vec<MatchRecord>,
    pub warnings: Vec<ScanWarning>,
}

/// Scans files against a shared, read-only automaton
#[derive(Debug, Clone)]
pub struct StreamingScanner {
    automaton: Arc<Automaton>,
    budget: MemoryBudget,
    options: StreamOptions,
}

impl StreamingScanner {
    pub fn new(automaton: Arc<Automaton>, budget: MemoryBudget) -> Self {
        Self::with_options(automaton, budget, StreamOptions::default())
    }

    pub fn with_options(automaton: Arc<Automaton>, budget: MemoryBudget, options: StreamOptions) -> Self {
        Self {
            automaton,
            budget,
            options,
        }
    }

    pub fn automaton(&self) -> &Automaton {
        &self.automaton
    }

    /// Pick single-pass or chunked mode for a file of `file_size` bytes
    pub fn plan(&self, file_size: u64) -> ScanPlan {
        if self.options.force_chunked {
            return ScanPlan::Chunked;
        }
        let budget = self.budget.available() as u128;
        if 3 * (file_size as u128) < 2 * budget {
            ScanPlan::SinglePass
        } else {
            ScanPlan::Chunked
        }
    }

    fn next_chunk_bytes(&self) -> usize {
        if let Some(fixed) = self.options.chunk_bytes {
            return fixed.max(1);
        }
        let sixth = (self.budget.available() / 6).min(usize::MAX as u64) as usize;
        sixth.max(self.options.min_chunk_bytes).max(1)
    }

    /// Scan each path in order; per-file failures become warnings
    pub fn scan_files(&self, paths: &[PathBuf]) -> StreamOutcome {
        let mut outcome = StreamOutcome::default();
        for path in paths {
            match self.scan_file(path) {
                Ok(matches) => outcome.matches.extend(matches),
                Err(e) => outcome.warnings.push(scan_warning(path, &e)),
            }
        }
        outcome
    }

    /// Scan one file.
    ///
    /// Fails with [`ScanError::Decode`] when the file is not UTF-8 text; no
    /// partial matches are returned in that case.
    pub fn scan_file(&self, path: &Path) -> ScanResult<Vec<MatchRecord>> {
        let file = File::open(path).map_err(|e| ScanError::io(path, e))?;
        let size = file.metadata().map_err(|e| ScanError::io(path, e))?.len();
        self.scan_reader(BufReader::new(file), path, size)
    }

    /// Scan any reader as if it were the file `source` of `size` bytes
    pub fn scan_reader<R: Read>(&self, reader: R, source: &Path, size: u64) -> ScanResult<Vec<MatchRecord>> {
        match self.plan(size) {
            ScanPlan::SinglePass => {
                debug!("Scanning {} in one pass ({} bytes)", source.display(), size);
                self.scan_single_pass(reader, source)
            }
            ScanPlan::Chunked => {
                debug!("Scanning {} in chunks ({} bytes)", source.display(), size);
                self.scan_chunked(reader, source)
            }
        }
    }

    fn scan_single_pass<R: Read>(&self, mut reader: R, source: &Path) -> ScanResult<Vec<MatchRecord>> {
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .map_err(|e| ScanError::io(source, e))?;
        if let Err(e) = std::str::from_utf8(&buf) {
            return Err(ScanError::Decode {
                path: source.to_path_buf(),
                offset: e.valid_up_to() as u64,
            });
        }
        buf.make_ascii_lowercase();

        let mut matches = Vec::new();
        self.automaton.scan_from(self.automaton.start_state(), &buf, |m| {
            matches.push(self.record(source, m.end as u64, m.pattern_id));
        });
        Ok(matches)
    }

    fn scan_chunked<R: Read>(&self, mut reader: R, source: &Path) -> ScanResult<Vec<MatchRecord>> {
        let mut matches = Vec::new();
        let mut state = self.automaton.start_state();
        // File offset of buf[0]
        let mut base: u64 = 0;
        let mut buf: Vec<u8> = Vec::new();

        loop {
            let carried = buf.len();
            let want = self.next_chunk_bytes();
            let read = (&mut reader)
                .take(want as u64)
                .read_to_end(&mut buf)
                .map_err(|e| ScanError::io(source, e))?;
            if read == 0 {
                if carried > 0 {
                    // File ends in the middle of a multi-byte sequence
                    return Err(ScanError::Decode {
                        path: source.to_path_buf(),
                        offset: base,
                    });
                }
                break;
            }

            let valid = match std::str::from_utf8(&buf) {
                Ok(_) => buf.len(),
                Err(e) if e.error_len().is_none() => e.valid_up_to(),
                Err(e) => {
                    return Err(ScanError::Decode {
                        path: source.to_path_buf(),
                        offset: base + e.valid_up_to() as u64,
                    })
                }
            };

            let text = &mut buf[..valid];
            text.make_ascii_lowercase();
            if !self.options.span_chunks {
                state = self.automaton.start_state();
            }
            state = self.automaton.scan_from(state, text, |m| {
                matches.push(self.record(source, base + m.end as u64, m.pattern_id));
            });

            // Keep the incomplete trailing sequence for the next chunk
            buf.drain(..valid);
            base += valid as u64;
        }
        Ok(matches)
    }

    fn record(&self, source: &Path, end: u64, pattern_id: u32) -> MatchRecord {
        let pattern = self.automaton.pattern(pattern_id);
        MatchRecord {
            source: source.to_path_buf(),
            offset: end - pattern.len() as u64,
            pattern: pattern.to_string(),
        }
    }
}

/// Convert a per-file scan error into a report warning
pub(crate) fn scan_warning(path: &Path, err: &ScanError) -> ScanWarning {
    let kind = match err {
        ScanError::Decode { .. } => WarningKind::Decode,
        _ => WarningKind::Io,
    };
    warn!("Blacklist scan skipped {}: {}", path.display(), err);
    ScanWarning::new(kind, "blacklist", err.to_string()).with_path(path)
}
