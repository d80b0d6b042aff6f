//! Malicious-package detectors
//!
//! This module provides the detector framework and the two detectors that
//! make up a scan session. The
//! typosquat detector is registered when a popular package list is configured.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       ScanEngine                            │
//! │  - Prepares the session (automaton, forbidden corpus)       │
//! │  - Scans files in parallel (rayon)                          │
//! │  - Collects findings and warnings into one report           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Detector Trait                         │
//! │  - name(): Unique identifier                                │
//! │  - scan_file(path): Findings and warnings for one file      │
//! │  - session_warnings(): Problems with the session as a whole │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                      ┌───────┴────────┐
//!                      ▼                ▼
//!          ┌──────────────────┐ ┌──────────────────────┐
//!          │ Blacklist        │ │ MaliciousPattern     │
//!          │ (Aho-Corasick,   │ │ (syntax tree,        │
//!          │  streaming)      │ │  tree edit distance) │
//!          └──────────────────┘ └──────────────────────┘
//! ```

mod base;
mod blacklist;
mod engine;
mod malicious_pattern;
mod typosquat;

pub use base::{DetectionSummary, Detector, FileScan};
pub use blacklist::BlacklistDetector;
pub use engine::{resolve_workers, run, ScanEngine};
pub use malicious_pattern::{CorpusSource, MaliciousPatternDetector};
pub use typosquat::{
    name_distance, normalize_name, PopularPackages, TyposquatDetector, DEFAULT_TYPOSQUAT_THRESHOLD,
};
