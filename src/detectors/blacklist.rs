//! Blacklist detector
//!
//! Reports every occurrence of a blacklisted domain or URL in a file, using
//! the streaming scanner so files larger than the worker's memory budget are
//! read in chunks.

use crate::detectors::base::{Detector, FileScan};
use crate::matching::streaming::scan_warning;
use crate::matching::StreamingScanner;
use crate::models::Finding;
use std::path::Path;

pub struct BlacklistDetector {
    scanner: StreamingScanner,
}

impl BlacklistDetector {
    pub fn new(scanner: StreamingScanner) -> Self {
        Self { scanner }
    }
}

impl Detector for BlacklistDetector {
    fn name(&self) -> &'static str {
        "blacklist"
    }

    fn description(&self) -> &'static str {
        "Finds blacklisted domains and URLs in file contents"
    }

    fn scan_file(&self, path: &Path) -> FileScan {
        match self.scanner.scan_file(path) {
            Ok(matches) => FileScan {
                findings: matches.into_iter().map(Finding::Text).collect(),
                warnings: Vec::new(),
            },
            Err(e) => FileScan::warning(scan_warning(path, &e)),
        }
    }
}
