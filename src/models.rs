//! Core data models for pkgaudit
//!
//! These are the shapes handed to the reporting layer: text matches,
//! structural matches, the warnings that explain what could not be analyzed,
//! and the report that collects them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A blacklist string found in a file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchRecord {
    /// File the match was found in
    pub source: PathBuf,
    /// Absolute byte offset of the first matched byte
    pub offset: u64,
    /// Normalized (lowercase) pattern that matched
    pub pattern: String,
}

/// A forbidden syntax-tree pattern found in a file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructuralMatch {
    pub file: PathBuf,
    /// Index into the forbidden pattern corpus
    pub pattern_index: usize,
    /// Human-readable name of the pattern (sample file stem)
    pub pattern_name: String,
    /// Tree edit distance that confirmed the match
    pub distance: u32,
}

/// A package name suspiciously close to a popular one
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TyposquatMatch {
    /// Metadata file the name was read from
    pub file: PathBuf,
    /// Normalized name of the scanned package
    pub package: String,
    /// Popular package it resembles
    pub similar_to: String,
    /// Damerau-Levenshtein edits between the two names
    pub edits: usize,
}

/// One finding produced by a detector
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    Text(MatchRecord),
    Structural(StructuralMatch),
    Typosquat(TyposquatMatch),
}

impl Finding {
    /// File this finding belongs to
    pub fn path(&self) -> &Path {
        match self {
            Finding::Text(m) => &m.source,
            Finding::Structural(m) => &m.file,
            Finding::Typosquat(m) => &m.file,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Finding::Text(_))
    }

    pub fn is_structural(&self) -> bool {
        matches!(self, Finding::Structural(_))
    }

    pub fn is_typosquat(&self) -> bool {
        matches!(self, Finding::Typosquat(_))
    }

    /// Sort key giving findings a stable order regardless of which worker produced them
    fn sort_key(&self) -> (&Path, u8, u64, &str) {
        match self {
            Finding::Text(m) => (&m.source, 0, m.offset, &m.pattern),
            Finding::Structural(m) => (&m.file, 1, m.pattern_index as u64, &m.pattern_name),
            Finding::Typosquat(m) => (&m.file, 2, m.edits as u64, &m.similar_to),
        }
    }
}

/// Category of a recovered error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// File is not valid text; excluded from text matching
    Decode,
    /// File is not valid source; excluded from structural matching
    Parse,
    /// Forbidden corpus absent; structural matching disabled for the session
    CorpusMissing,
    /// A persisted cache did not belong to the current corpus and was rebuilt
    CacheStale,
    /// File could not be read
    Io,
    /// Syntax tree exceeded the per-file node or nesting bound
    TreeTooLarge,
}

impl std::fmt::Display for WarningKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WarningKind::Decode => write!(f, "decode"),
            WarningKind::Parse => write!(f, "parse"),
            WarningKind::CorpusMissing => write!(f, "corpus_missing"),
            WarningKind::CacheStale => write!(f, "cache_stale"),
            WarningKind::Io => write!(f, "io"),
            WarningKind::TreeTooLarge => write!(f, "tree_too_large"),
        }
    }
}

/// A recovered error, surfaced so "nothing found" can be told apart from "not analyzed"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanWarning {
    pub kind: WarningKind,
    /// Detector (or session stage) that produced the warning
    pub detector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub message: String,
}

impl ScanWarning {
    pub fn new(kind: WarningKind, detector: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            detector: detector.into(),
            path: None,
            message: message.into(),
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Counters describing a scan session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingsSummary {
    pub files_scanned: usize,
    pub text_matches: usize,
    pub structural_matches: usize,
    pub typosquat_matches: usize,
    pub warnings: usize,
    pub duration_ms: u64,
}

/// Everything a scan session hands to the reporting layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindingsReport {
    pub findings: Vec<Finding>,
    pub warnings: Vec<ScanWarning>,
    pub summary: FindingsSummary,
}

impl FindingsReport {
    /// Sort findings and warnings and recompute the counters.
    ///
    /// Workers finish in arbitrary order; after this call two reports built
    /// from the same inputs compare equal.
    pub fn normalize(&mut self) {
        self.findings.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        self.warnings.sort_by(|a, b| {
            (&a.path, a.kind, &a.detector, &a.message).cmp(&(&b.path, b.kind, &b.detector, &b.message))
        });
        self.summary.text_matches = self.findings.iter().filter(|f| f.is_text()).count();
        self.summary.structural_matches = self.findings.iter().filter(|f| f.is_structural()).count();
        self.summary.typosquat_matches = self.findings.iter().filter(|f| f.is_typosquat()).count();
        self.summary.warnings = self.warnings.len();
    }

    /// Findings grouped by file
    pub fn by_file(&self) -> BTreeMap<&Path, Vec<&Finding>> {
        let mut grouped: BTreeMap<&Path, Vec<&Finding>> = BTreeMap::new();
        for finding in &self.findings {
            grouped.entry(finding.path()).or_default().push(finding);
        }
        grouped
    }

    pub fn text_matches(&self) -> impl Iterator<Item = &MatchRecord> {
        self.findings.iter().filter_map(|f| match f {
            Finding::Text(m) => Some(m),
            _ => None,
        })
    }

    pub fn structural_matches(&self) -> impl Iterator<Item = &StructuralMatch> {
        self.findings.iter().filter_map(|f| match f {
            Finding::Structural(m) => Some(m),
            _ => None,
        })
    }

    pub fn typosquat_matches(&self) -> impl Iterator<Item = &TyposquatMatch> {
        self.findings.iter().filter_map(|f| match f {
            Finding::Typosquat(m) => Some(m),
            _ => None,
        })
    }

    pub fn warnings_of(&self, kind: WarningKind) -> impl Iterator<Item = &ScanWarning> {
        self.warnings.iter().filter(move |w| w.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(path: &str, offset: u64) -> Finding {
        Finding::Text(MatchRecord {
            source: PathBuf::from(path),
            offset,
            pattern: "evil.test".to_string(),
        })
    }

    fn structural(path: &str, index: usize) -> Finding {
        Finding::Structural(StructuralMatch {
            file: PathBuf::from(path),
            pattern_index: index,
            pattern_name: format!("p{index}"),
            distance: 0,
        })
    }

    #[test]
    fn test_normalize_is_order_independent() {
        let mut a = FindingsReport::default();
        a.findings = vec![text("b.py", 9), structural("a.py", 1), text("a.py", 3)];
        let mut b = FindingsReport::default();
        b.findings = vec![text("a.py", 3), text("b.py", 9), structural("a.py", 1)];

        a.normalize();
        b.normalize();
        assert_eq!(a.findings, b.findings);
        assert_eq!(a.summary.text_matches, 2);
        assert_eq!(a.summary.structural_matches, 1);
    }

    #[test]
    fn test_by_file_groups() {
        let mut report = FindingsReport::default();
        report.findings = vec![text("a.py", 1), structural("a.py", 0), text("b.py", 2)];
        let grouped = report.by_file();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[Path::new("a.py")].len(), 2);
    }

    #[test]
    fn test_finding_serializes_with_kind_tag() {
        let json = serde_json::to_value(text("a.py", 42)).expect("serialize finding");
        assert_eq!(json["kind"], "text");
        assert_eq!(json["offset"], 42);
    }

    #[test]
    fn test_normalize_counts_warnings() {
        let mut report = FindingsReport::default();
        report.warnings.push(ScanWarning::new(WarningKind::Parse, "structural", "bad").with_path("x.txt"));
        report.warnings.push(ScanWarning::new(WarningKind::Decode, "blacklist", "binary").with_path("a.bin"));
        report.normalize();
        assert_eq!(report.summary.warnings, 2);
        assert_eq!(report.warnings[0].path.as_deref(), Some(Path::new("a.bin")));
        assert_eq!(report.warnings_of(WarningKind::Parse).count(), 1);
    }

    #[test]
    fn test_typosquat_finding_counts() {
        let mut report = FindingsReport::default();
        report.findings = vec![
            Finding::Typosquat(TyposquatMatch {
                file: PathBuf::from("PKG-INFO"),
                package: "reqeusts".to_string(),
                similar_to: "requests".to_string(),
                edits: 1,
            }),
            text("PKG-INFO", 0),
        ];
        report.normalize();
        assert!(report.findings[0].is_text());
        assert_eq!(report.summary.typosquat_matches, 1);
        assert_eq!(report.typosquat_matches().count(), 1);
        let json = serde_json::to_value(&report.findings[1]).expect("serialize finding");
        assert_eq!(json["kind"], "typosquat");
    }
}
