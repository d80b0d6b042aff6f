//! Typosquatting detector
//!
//! Reads the package name from metadata files (`PKG-INFO`, `METADATA`,
//! `pyproject.toml`) and compares it with a local list of popular package
//! names. A name is suspicious when
//!
//! ```text
//! 2 * damerau_levenshtein(a, b) / (len(a) + len(b)) < threshold
//! ```
//!
//! for some popular name `b`. An exact match is the popular package itself
//! and is never reported. Names are compared in their normalized form
//! (lowercase, runs of `-`, `_` and `.` collapsed to `-`).

use crate::detectors::base::{Detector, FileScan};
use crate::error::{ScanError, ScanResult};
use crate::models::{Finding, ScanWarning, TyposquatMatch, WarningKind};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, warn};

const NAME: &str = "typosquat";

/// Default similarity threshold
pub const DEFAULT_TYPOSQUAT_THRESHOLD: f64 = 0.3;

/// Lowercase and collapse separator runs to a single `-`
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            in_separator = true;
            continue;
        }
        if in_separator && !out.is_empty() {
            out.push('-');
        }
        in_separator = false;
        out.extend(c.to_lowercase());
    }
    out
}

/// Edit distance between two names scaled by their mean length.
///
/// `None` for identical names, which are never typosquats of each other.
pub fn name_distance(a: &str, b: &str) -> Option<(usize, f64)> {
    if a == b {
        return None;
    }
    let edits = strsim::damerau_levenshtein(a, b);
    let total = a.chars().count() + b.chars().count();
    if total == 0 {
        return None;
    }
    Some((edits, 2.0 * edits as f64 / total as f64))
}

/// `{"rows": [{"project": "..."}]}`, the layout of the public top-packages dumps
#[derive(Deserialize)]
struct TopPackagesDump {
    rows: Vec<TopPackageRow>,
}

#[derive(Deserialize)]
struct TopPackageRow {
    project: String,
}

/// Normalized popular package names
#[derive(Debug, Clone, Default)]
pub struct PopularPackages {
    names: BTreeSet<String>,
}

impl PopularPackages {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = names
            .into_iter()
            .map(|n| normalize_name(n.as_ref()))
            .filter(|n| !n.is_empty())
            .collect();
        Self { names }
    }

    /// Load a `.json` top-packages dump, or a newline-delimited list
    /// (blank lines and `#` comments ignored)
    pub fn load(path: &Path) -> ScanResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ScanError::io(path, e))?;
        let is_json = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let popular = if is_json {
            let dump: TopPackagesDump =
                serde_json::from_str(&content).map_err(|e| ScanError::serialization("popular packages", e))?;
            Self::new(dump.rows.into_iter().map(|row| row.project))
        } else {
            Self::new(
                content
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#')),
            )
        };

        if popular.is_empty() {
            warn!("Popular package list {} is empty", path.display());
        }
        info!("Loaded {} popular package names from {}", popular.len(), path.display());
        Ok(popular)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&normalize_name(name))
    }

    /// Popular names within `threshold` of `package`, with their edit counts
    pub fn similar_to(&self, package: &str, threshold: f64) -> Vec<(&str, usize)> {
        let package = normalize_name(package);
        self.names
            .iter()
            .filter_map(|popular| {
                let (edits, score) = name_distance(&package, popular)?;
                (score < threshold).then_some((popular.as_str(), edits))
            })
            .collect()
    }
}

/// Metadata files the package name is read from
fn is_metadata_file(path: &Path) -> bool {
    matches!(
        path.file_name().and_then(|n| n.to_str()),
        Some("PKG-INFO" | "METADATA" | "pyproject.toml")
    )
}

/// `Name:` header of core metadata; headers end at the first blank line
fn name_from_core_metadata(text: &str) -> Option<String> {
    text.lines()
        .take_while(|line| !line.trim().is_empty())
        .find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case("name")
                .then(|| value.trim().to_string())
        })
        .filter(|name| !name.is_empty())
}

/// `[project] name` of a pyproject file
fn name_from_pyproject(text: &str) -> Result<Option<String>, toml::de::Error> {
    let value: toml::Value = toml::from_str(text)?;
    Ok(value
        .get("project")
        .and_then(|project| project.get("name"))
        .and_then(|name| name.as_str())
        .map(str::to_string))
}

pub struct TyposquatDetector {
    popular: PopularPackages,
    threshold: f64,
}

impl TyposquatDetector {
    pub fn new(popular: PopularPackages, threshold: f64) -> Self {
        Self { popular, threshold }
    }

    fn warning(&self, kind: WarningKind, path: &Path, message: impl Into<String>) -> FileScan {
        let message = message.into();
        warn!("Typosquat check skipped {}: {}", path.display(), message);
        FileScan::warning(ScanWarning::new(kind, NAME, message).with_path(path))
    }

    fn package_name(&self, path: &Path) -> Result<Option<String>, FileScan> {
        let bytes = std::fs::read(path)
            .map_err(|e| self.warning(WarningKind::Io, path, ScanError::io(path, e).to_string()))?;
        let text = std::str::from_utf8(&bytes).map_err(|e| {
            let err = ScanError::Decode {
                path: path.to_path_buf(),
                offset: e.valid_up_to() as u64,
            };
            self.warning(WarningKind::Decode, path, err.to_string())
        })?;

        if path.file_name().is_some_and(|n| n == "pyproject.toml") {
            name_from_pyproject(text).map_err(|e| {
                let err = ScanError::Parse {
                    path: path.to_path_buf(),
                    grammar: "toml",
                };
                self.warning(WarningKind::Parse, path, format!("{}: {}", err, e.message()))
            })
        } else {
            Ok(name_from_core_metadata(text))
        }
    }
}

impl Detector for TyposquatDetector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Flags package names a few edits away from popular packages"
    }

    fn scan_file(&self, path: &Path) -> FileScan {
        if !is_metadata_file(path) {
            return FileScan::default();
        }
        let package = match self.package_name(path) {
            Ok(Some(name)) => normalize_name(&name),
            Ok(None) => return FileScan::default(),
            Err(scan) => return scan,
        };

        let findings: Vec<Finding> = self
            .popular
            .similar_to(&package, self.threshold)
            .into_iter()
            .map(|(popular, edits)| {
                Finding::Typosquat(TyposquatMatch {
                    file: path.to_path_buf(),
                    package: package.clone(),
                    similar_to: popular.to_string(),
                    edits,
                })
            })
            .collect();
        debug!(
            "{}: package '{}' resembles {} popular package(s)",
            path.display(),
            package,
            findings.len()
        );

        FileScan {
            findings,
            warnings: Vec::new(),
        }
    }
}
