//! pkgaudit - malicious package detection
//!
//! Detectors over the files of an unpacked package:
//! - blacklisted domains and URLs, matched with an Aho-Corasick automaton
//!   and scanned in chunks when a file does not fit the memory budget
//! - known-malicious code shapes, matched by tree edit distance between
//!   syntax trees after a cheap signature pre-filter
//!
//! A third, optional detector flags package names a few edits away from
//! popular packages.

pub mod ast;
pub mod cache;
pub mod cli;
pub mod config;
pub mod detectors;
pub mod error;
pub mod matching;
pub mod models;

pub use detectors::{run, ScanEngine};
pub use error::{ScanError, ScanResult};
pub use models::{
    Finding, FindingsReport, MatchRecord, ScanWarning, StructuralMatch, TyposquatMatch, WarningKind,
};
