//! Base detector trait and types
//!
//! A detector looks at one file at a time and returns findings plus the
//! warnings that explain anything it could not analyze. Detectors never fail
//! a scan: per-file problems become warnings.

use crate::models::{Finding, ScanWarning};
use std::path::Path;

/// What one detector produced for one file
#[derive(Debug, Clone, Default)]
pub struct FileScan {
    pub findings: Vec<Finding>,
    pub warnings: Vec<ScanWarning>,
}

impl FileScan {
    pub fn warning(warning: ScanWarning) -> Self {
        Self {
            findings: Vec::new(),
            warnings: vec![warning],
        }
    }

    pub fn extend(&mut self, other: FileScan) {
        self.findings.extend(other.findings);
        self.warnings.extend(other.warnings);
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty() && self.warnings.is_empty()
    }
}

/// Trait for all malicious-package detectors
///
/// # Example Implementation
///
/// ```ignore
/// pub struct MyDetector;
///
/// impl Detector for MyDetector {
///     fn name(&self) -> &'static str {
///         "my_detector"
///     }
///
///     fn description(&self) -> &'static str {
///         "Finds something suspicious"
///     }
///
///     fn scan_file(&self, path: &Path) -> FileScan {
///         FileScan::default()
///     }
/// }
/// ```
pub trait Detector: Send + Sync {
    /// Unique identifier, used as the `detector` field of warnings
    fn name(&self) -> &'static str;

    /// Human-readable description of what this detector finds
    fn description(&self) -> &'static str;

    /// Analyze one file. Called concurrently from worker threads.
    fn scan_file(&self, path: &Path) -> FileScan;

    /// Warnings that concern the whole session rather than one file,
    /// collected once after all files are scanned
    fn session_warnings(&self) -> Vec<ScanWarning> {
        vec![]
    }
}

/// Per-detector statistics for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionSummary {
    pub files_scanned: usize,
    pub findings: usize,
    pub warnings: usize,
    /// Files whose scan panicked and was abandoned
    pub panics: usize,
}

impl DetectionSummary {
    pub fn add_file(&mut self, scan: &FileScan) {
        self.files_scanned += 1;
        self.findings += scan.findings.len();
        self.warnings += scan.warnings.len();
    }

    pub fn merge(&mut self, other: &DetectionSummary) {
        self.files_scanned += other.files_scanned;
        self.findings += other.findings;
        self.warnings += other.warnings;
        self.panics += other.panics;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MatchRecord, WarningKind};
    use std::path::PathBuf;

    fn text_finding() -> Finding {
        Finding::Text(MatchRecord {
            source: PathBuf::from("a.py"),
            offset: 3,
            pattern: "evil.test".to_string(),
        })
    }

    #[test]
    fn test_file_scan_extend() {
        let mut scan = FileScan::default();
        assert!(scan.is_empty());
        scan.extend(FileScan {
            findings: vec![text_finding()],
            warnings: vec![],
        });
        scan.extend(FileScan::warning(ScanWarning::new(WarningKind::Parse, "x", "bad")));
        assert_eq!(scan.findings.len(), 1);
        assert_eq!(scan.warnings.len(), 1);
    }

    #[test]
    fn test_detection_summary() {
        let mut summary = DetectionSummary::default();
        summary.add_file(&FileScan {
            findings: vec![text_finding(), text_finding()],
            warnings: vec![],
        });
        summary.add_file(&FileScan::warning(ScanWarning::new(WarningKind::Decode, "x", "bin")));

        let mut total = DetectionSummary::default();
        total.merge(&summary);
        total.merge(&summary);
        assert_eq!(total.files_scanned, 4);
        assert_eq!(total.findings, 4);
        assert_eq!(total.warnings, 2);
    }
}
