//! Scan engine: session setup and parallel per-file detection
//!
//! The ScanEngine orchestrates a scan session:
//! - Resolves the blacklist automaton and the forbidden corpus source
//! - Runs every registered detector on every file, files in parallel (rayon)
//! - Converts per-file failures and panics into warnings
//! - Returns one normalized [`FindingsReport`]
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      ScanEngine                         │
//! ├─────────────────────────────────────────────────────────┤
//! │  1. Prepare automaton (cache or build)                  │
//! │  2. Register blacklist, malicious-pattern, typosquat    │
//! │  3. Scan files in parallel, detectors in order per file │
//! │  4. Collect session warnings (e.g. corpus missing)      │
//! │  5. Sort, count and return the report                   │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Detectors share only read-only state (the automaton and the memoized
//! forbidden corpus), so files can be processed in any order.

use crate::ast::{ForbiddenCorpus, TreeMatcher, TreeSitterBuilder};
use crate::cache::ArtifactCache;
use crate::config::ScanConfig;
use crate::detectors::base::{DetectionSummary, Detector, FileScan};
use crate::detectors::blacklist::BlacklistDetector;
use crate::detectors::malicious_pattern::{CorpusSource, MaliciousPatternDetector};
use crate::detectors::typosquat::{PopularPackages, TyposquatDetector};
use crate::error::{ScanError, ScanResult};
use crate::matching::{prepare_automaton, Automaton, MemoryBudget, StreamOptions, StreamingScanner};
use crate::models::{FindingsReport, ScanWarning, WarningKind};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Upper bound for the auto-detected worker count
const MAX_AUTO_WORKERS: usize = 16;

/// Resolve a configured worker count (0 = auto-detect, capped at 16)
pub fn resolve_workers(workers: usize) -> usize {
    if workers == 0 {
        std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(4)
            .min(MAX_AUTO_WORKERS)
    } else {
        workers
    }
}

/// Runs detectors over a set of files
pub struct ScanEngine {
    detectors: Vec<Arc<dyn Detector>>,
    workers: usize,
    /// Warnings raised while setting the session up
    setup_warnings: Vec<ScanWarning>,
}

impl ScanEngine {
    /// Create an empty engine
    ///
    /// # Arguments
    /// * `workers` - Number of worker threads (0 = auto-detect)
    pub fn new(workers: usize) -> Self {
        Self {
            detectors: Vec::new(),
            workers: resolve_workers(workers),
            setup_warnings: Vec::new(),
        }
    }

    /// Build the standard session from configuration.
    ///
    /// Loads or compiles the blacklist automaton and the popular package
    /// list up front; errors in either are fatal. The forbidden corpus is
    /// resolved lazily by the malicious-pattern detector the first time a
    /// file needs it, falling back to the built-in samples when enabled.
    pub fn from_config(config: &ScanConfig) -> ScanResult<Self> {
        let cache = ArtifactCache::new(config.text.automaton_cache_path());
        let prepared = prepare_automaton(config.text.blacklist.as_deref(), Some(&cache))?;

        let source = CorpusSource {
            samples_dir: config.structural.samples_dir.clone(),
            bundle: Some(config.structural.bundle_path()),
            builtin: config.structural.builtin_samples,
        };
        let structural = MaliciousPatternDetector::new(
            Arc::new(TreeSitterBuilder::python().with_limits(config.structural.tree_limits())),
            TreeMatcher::new(config.structural.costs, config.structural.threshold),
            source,
        );

        let mut engine = Self::assemble(config, prepared.automaton.map(Arc::new), structural);
        engine.setup_warnings = prepared.warnings;

        if let Some(ref list) = config.typosquat.popular_packages {
            let popular = PopularPackages::load(list)?;
            engine.register(Arc::new(TyposquatDetector::new(popular, config.typosquat.threshold)));
        }
        Ok(engine)
    }

    /// Build a session from corpora that are already in memory.
    ///
    /// `None` for either corpus disables that half of detection; a missing
    /// forbidden corpus is reported as a [`WarningKind::CorpusMissing`]
    /// warning like it is for an on-disk source.
    pub fn with_corpora(
        config: &ScanConfig,
        automaton: Option<Arc<Automaton>>,
        forbidden: Option<ForbiddenCorpus>,
    ) -> Self {
        let structural = MaliciousPatternDetector::new(
            Arc::new(TreeSitterBuilder::python().with_limits(config.structural.tree_limits())),
            TreeMatcher::new(config.structural.costs, config.structural.threshold),
            CorpusSource::default(),
        );
        let structural = match forbidden {
            Some(corpus) => structural.with_corpus(corpus),
            None => structural,
        };
        Self::assemble(config, automaton, structural)
    }

    fn assemble(
        config: &ScanConfig,
        automaton: Option<Arc<Automaton>>,
        structural: MaliciousPatternDetector,
    ) -> Self {
        let mut engine = Self::new(config.engine.workers);

        if let Some(automaton) = automaton {
            let budget = match config.text.memory_budget_bytes {
                Some(bytes) => MemoryBudget::reserved(bytes),
                None => MemoryBudget::shared(engine.workers),
            };
            let options = StreamOptions {
                min_chunk_bytes: config.text.min_chunk_bytes,
                span_chunks: config.text.span_chunks,
                force_chunked: config.text.force_chunk_bytes.is_some(),
                chunk_bytes: config.text.force_chunk_bytes,
            };
            let scanner = StreamingScanner::with_options(automaton, budget, options);
            engine.register(Arc::new(BlacklistDetector::new(scanner)));
        }

        engine.register(Arc::new(structural.with_extensions(&config.structural.extensions)));
        engine
    }

    /// Register a detector; detectors run in registration order per file
    pub fn register(&mut self, detector: Arc<dyn Detector>) {
        debug!("Registered detector: {}", detector.name());
        self.detectors.push(detector);
    }

    pub fn detectors(&self) -> &[Arc<dyn Detector>] {
        &self.detectors
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Scan `files` with every registered detector.
    ///
    /// The caller supplies exact file paths; no directory traversal happens
    /// here. Per-file problems become warnings in the report.
    pub fn run(&self, files: &[PathBuf]) -> ScanResult<FindingsReport> {
        let start = Instant::now();
        info!(
            "Starting scan of {} files with {} detectors on {} workers",
            files.len(),
            self.detectors.len(),
            self.workers
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| ScanError::Config(format!("cannot start worker pool: {}", e)))?;

        let per_file: Vec<(FileScan, Vec<DetectionSummary>)> = pool.install(|| {
            files
                .par_iter()
                .map(|path| self.scan_one(path))
                .collect()
        });

        let mut report = FindingsReport::default();
        let mut summaries = vec![DetectionSummary::default(); self.detectors.len()];
        for (scan, file_summaries) in per_file {
            report.findings.extend(scan.findings);
            report.warnings.extend(scan.warnings);
            for (total, summary) in summaries.iter_mut().zip(&file_summaries) {
                total.merge(summary);
            }
        }

        report.warnings.extend(self.setup_warnings.iter().cloned());
        for detector in &self.detectors {
            report.warnings.extend(detector.session_warnings());
        }

        report.summary.files_scanned = files.len();
        report.normalize();
        report.summary.duration_ms = start.elapsed().as_millis() as u64;

        for (detector, summary) in self.detectors.iter().zip(&summaries) {
            debug!(
                "{}: {} findings, {} warnings, {} panics",
                detector.name(),
                summary.findings,
                summary.warnings,
                summary.panics
            );
        }
        info!(
            "Scan complete: {} text matches, {} structural matches, {} warnings in {}ms",
            report.summary.text_matches,
            report.summary.structural_matches,
            report.summary.warnings,
            report.summary.duration_ms
        );
        Ok(report)
    }

    /// Run every detector on one file
    fn scan_one(&self, path: &Path) -> (FileScan, Vec<DetectionSummary>) {
        let mut combined = FileScan::default();
        let mut summaries = Vec::with_capacity(self.detectors.len());

        for detector in &self.detectors {
            let mut summary = DetectionSummary::default();
            // Wrap in catch_unwind so one bad file cannot take the session down
            let scan = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                detector.scan_file(path)
            }))
            .unwrap_or_else(|_| {
                error!("Detector {} panicked on {}", detector.name(), path.display());
                summary.panics += 1;
                FileScan::warning(
                    ScanWarning::new(WarningKind::Io, detector.name(), "detector panicked on this file")
                        .with_path(path),
                )
            });
            summary.add_file(&scan);
            summaries.push(summary);
            combined.extend(scan);
        }

        (combined, summaries)
    }
}

/// Scan `files` against already-built corpora in one call.
///
/// Either corpus may be absent, disabling that half of detection.
pub fn run(
    files: &[PathBuf],
    automaton: Option<Arc<Automaton>>,
    forbidden: Option<ForbiddenCorpus>,
    config: &ScanConfig,
) -> ScanResult<FindingsReport> {
    ScanEngine::with_corpora(config, automaton, forbidden).run(files)
}
