//! Forbidden syntax-tree pattern corpus
//!
//! Forbidden patterns are compiled from a directory of sample source files,
//! one pattern per file, in file-name order. The compiled corpus is persisted
//! as a bundle keyed by the sample contents, so later sessions skip parsing
//! unless a sample changed.
//!
//! Nothing here is fatal: a missing or unusable corpus disables structural
//! matching for the session and is reported as a warning.

use super::parser::SyntaxTreeBuilder;
use super::tree::{Signature, SyntaxNode};
use crate::cache::{Artifact, ArtifactCache};
use crate::error::{ScanError, ScanResult};
use crate::models::{ScanWarning, WarningKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use xxhash_rust::xxh3::Xxh3;

const DETECTOR: &str = "malicious_pattern";

/// One forbidden pattern: its tree and the signature derived from it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForbiddenPattern {
    /// Sample file stem
    pub name: String,
    pub tree: SyntaxNode,
    pub signature: Signature,
}

impl ForbiddenPattern {
    pub fn new(name: impl Into<String>, tree: SyntaxNode) -> Self {
        let signature = tree.signature();
        Self {
            name: name.into(),
            tree,
            signature,
        }
    }
}

/// Ordered forbidden patterns; a match refers to a pattern by its index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForbiddenCorpus {
    patterns: Vec<ForbiddenPattern>,
}

impl ForbiddenCorpus {
    pub fn new(patterns: Vec<ForbiddenPattern>) -> Self {
        Self { patterns }
    }

    pub fn patterns(&self) -> &[ForbiddenPattern] {
        &self.patterns
    }

    pub fn get(&self, index: usize) -> Option<&ForbiddenPattern> {
        self.patterns.get(index)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Artifact for ForbiddenCorpus {
    const KIND: &'static str = "forbidden_patterns";
    const VERSION: u32 = 1;

    /// Signatures must come from the current traversal order
    fn validate(&self) -> ScanResult<()> {
        for pattern in &self.patterns {
            if pattern.signature != pattern.tree.signature() {
                return Err(ScanError::serialization(
                    Self::KIND,
                    format!("signature of pattern '{}' does not match its tree", pattern.name),
                ));
            }
        }
        Ok(())
    }
}

struct Sample {
    name: String,
    path: PathBuf,
    bytes: Vec<u8>,
}

/// Sample files in `dir`, sorted by file name. Hidden files are ignored.
fn read_samples(dir: &Path) -> ScanResult<Vec<Sample>> {
    let entries = std::fs::read_dir(dir).map_err(|e| ScanError::io(dir, e))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ScanError::io(dir, e))?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if path.is_file() && !hidden {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    paths
        .into_iter()
        .map(|path| {
            let bytes = std::fs::read(&path).map_err(|e| ScanError::io(&path, e))?;
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(Sample { name, path, bytes })
        })
        .collect()
}

fn samples_key(samples: &[Sample]) -> u64 {
    let mut hasher = Xxh3::new();
    for sample in samples {
        hasher.update(sample.name.as_bytes());
        hasher.update(&[0]);
        hasher.update(&(sample.bytes.len() as u64).to_le_bytes());
        hasher.update(&sample.bytes);
    }
    hasher.digest()
}

fn compile_samples(samples: &[Sample], builder: &dyn SyntaxTreeBuilder) -> (ForbiddenCorpus, Vec<ScanWarning>) {
    let mut patterns = Vec::with_capacity(samples.len());
    let mut warnings = Vec::new();

    for sample in samples {
        let source = match std::str::from_utf8(&sample.bytes) {
            Ok(source) => source,
            Err(e) => {
                let err = ScanError::Decode {
                    path: sample.path.clone(),
                    offset: e.valid_up_to() as u64,
                };
                warn!("Skipping forbidden sample: {}", err);
                warnings.push(
                    ScanWarning::new(WarningKind::Decode, DETECTOR, err.to_string()).with_path(&sample.path),
                );
                continue;
            }
        };

        match builder.parse(source, &sample.path) {
            Ok(tree) if tree.is_empty() => {
                warn!("Skipping forbidden sample {}: no statements", sample.path.display());
                warnings.push(
                    ScanWarning::new(WarningKind::Parse, DETECTOR, "forbidden sample has no statements")
                        .with_path(&sample.path),
                );
            }
            Ok(tree) => {
                debug!(
                    "Compiled forbidden pattern '{}' ({} nodes)",
                    sample.name,
                    tree.size()
                );
                patterns.push(ForbiddenPattern::new(sample.name.clone(), tree));
            }
            Err(e) => {
                warn!("Skipping forbidden sample: {}", e);
                let kind = match e {
                    ScanError::TreeTooLarge { .. } => WarningKind::TreeTooLarge,
                    _ => WarningKind::Parse,
                };
                warnings.push(ScanWarning::new(kind, DETECTOR, e.to_string()).with_path(&sample.path));
            }
        }
    }

    (ForbiddenCorpus::new(patterns), warnings)
}

/// Corpus compiled from a sample directory
#[derive(Debug)]
pub struct CompiledCorpus {
    pub corpus: ForbiddenCorpus,
    /// Content key of the samples it was compiled from
    pub key: u64,
    /// Samples that were skipped
    pub warnings: Vec<ScanWarning>,
}

/// Parse every sample in `dir` into a forbidden pattern.
///
/// Unreadable directories are errors; individual samples that fail to
/// decode or parse are skipped with a warning.
pub fn compile_from_dir(dir: &Path, builder: &dyn SyntaxTreeBuilder) -> ScanResult<CompiledCorpus> {
    let samples = read_samples(dir)?;
    let key = samples_key(&samples);
    let (corpus, warnings) = compile_samples(&samples, builder);
    Ok(CompiledCorpus { corpus, key, warnings })
}

/// Samples shipped with the crate, in file-name order
const BUILTIN_SAMPLES: &[(&str, &[u8])] = &[
    ("exec_b64", include_bytes!("../../resources/forbidden_patterns/exec_b64.py")),
    ("exec_remote", include_bytes!("../../resources/forbidden_patterns/exec_remote.py")),
    ("os_system_shell", include_bytes!("../../resources/forbidden_patterns/os_system_shell.py")),
    ("subprocess_shell", include_bytes!("../../resources/forbidden_patterns/subprocess_shell.py")),
];

/// Compile the samples embedded in the binary
pub fn compile_builtin(builder: &dyn SyntaxTreeBuilder) -> CompiledCorpus {
    let samples: Vec<Sample> = BUILTIN_SAMPLES
        .iter()
        .map(|(name, bytes)| Sample {
            name: name.to_string(),
            path: PathBuf::from(format!("<builtin>/{name}.py")),
            bytes: bytes.to_vec(),
        })
        .collect();
    let key = samples_key(&samples);
    let (corpus, warnings) = compile_samples(&samples, builder);
    debug!("Compiled {} built-in forbidden patterns", corpus.len());
    CompiledCorpus { corpus, key, warnings }
}

/// Forbidden corpus for the session plus warnings raised obtaining it
#[derive(Debug, Default)]
pub struct PreparedCorpus {
    pub corpus: Option<ForbiddenCorpus>,
    pub warnings: Vec<ScanWarning>,
}

impl PreparedCorpus {
    fn warn(&mut self, kind: WarningKind, path: &Path, message: impl Into<String>) {
        self.warnings
            .push(ScanWarning::new(kind, DETECTOR, message).with_path(path));
    }
}

/// Obtain the forbidden corpus.
///
/// With a sample directory, a bundle compiled from exactly those samples is
/// reused and anything else is recompiled and rewritten. Without one, an
/// existing bundle is trusted as-is. With neither, a single
/// [`WarningKind::CorpusMissing`] warning is returned and no corpus.
pub fn prepare_forbidden_corpus(
    samples_dir: Option<&Path>,
    bundle: Option<&ArtifactCache<ForbiddenCorpus>>,
    builder: &dyn SyntaxTreeBuilder,
) -> PreparedCorpus {
    let mut prepared = PreparedCorpus::default();
    let mut looked_at: Vec<String> = Vec::new();

    if let Some(dir) = samples_dir {
        looked_at.push(dir.display().to_string());
        if dir.is_dir() {
            match read_samples(dir) {
                Ok(samples) => {
                    compile_with_bundle(&mut prepared, dir, &samples, bundle, builder);
                    return prepared;
                }
                Err(e) => {
                    warn!("Cannot read forbidden samples: {}", e);
                    prepared.warn(WarningKind::Io, dir, e.to_string());
                }
            }
        }
    }

    if let Some(bundle) = bundle {
        looked_at.push(bundle.path().display().to_string());
        match bundle.load(None) {
            Ok(Some(corpus)) => {
                info!(
                    "Loaded {} forbidden patterns from {}",
                    corpus.len(),
                    bundle.path().display()
                );
                prepared.corpus = Some(corpus);
                return prepared;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Ignoring unreadable forbidden pattern bundle: {}", e);
                prepared.warn(WarningKind::Io, bundle.path(), e.to_string());
            }
        }
    }

    let missing = ScanError::CorpusMissing(if looked_at.is_empty() {
        "no sample directory or bundle configured".to_string()
    } else {
        looked_at.join(", ")
    });
    warn!("{}; structural matching disabled", missing);
    prepared
        .warnings
        .push(ScanWarning::new(WarningKind::CorpusMissing, DETECTOR, missing.to_string()));
    prepared
}

fn compile_with_bundle(
    prepared: &mut PreparedCorpus,
    dir: &Path,
    samples: &[Sample],
    bundle: Option<&ArtifactCache<ForbiddenCorpus>>,
    builder: &dyn SyntaxTreeBuilder,
) {
    let key = samples_key(samples);

    if let Some(bundle) = bundle {
        match bundle.load(Some(key)) {
            Ok(Some(corpus)) => {
                info!(
                    "Loaded {} forbidden patterns from {}",
                    corpus.len(),
                    bundle.path().display()
                );
                prepared.corpus = Some(corpus);
                return;
            }
            Ok(None) => {}
            Err(e @ ScanError::CacheStale { .. }) => {
                warn!("{}; recompiling", e);
                prepared.warn(WarningKind::CacheStale, bundle.path(), e.to_string());
            }
            Err(e) => {
                warn!("Ignoring unreadable forbidden pattern bundle: {}", e);
                prepared.warn(WarningKind::Io, bundle.path(), e.to_string());
            }
        }
    }

    info!(
        "Compiling {} forbidden samples from {}",
        samples.len(),
        dir.display()
    );
    let (corpus, warnings) = compile_samples(samples, builder);
    prepared.warnings.extend(warnings);

    if corpus.is_empty() {
        let missing = ScanError::CorpusMissing(format!("{} (no usable samples)", dir.display()));
        warn!("{}; structural matching disabled", missing);
        prepared.warn(WarningKind::CorpusMissing, dir, missing.to_string());
        return;
    }

    if let Some(bundle) = bundle {
        if let Err(e) = bundle.store(&corpus, key) {
            warn!("Failed to persist forbidden pattern bundle: {}", e);
            prepared.warn(WarningKind::Io, bundle.path(), e.to_string());
        }
    }
    prepared.corpus = Some(corpus);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parser::TreeSitterBuilder;

    fn write_samples(dir: &Path, samples: &[(&str, &str)]) {
        for (name, body) in samples {
            std::fs::write(dir.join(name), body).expect("should write sample");
        }
    }

    #[test]
    fn test_compile_in_file_name_order() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        write_samples(
            dir.path(),
            &[
                ("b_exec.py", "exec(base64.b64decode(x))\n"),
                ("a_spawn.py", "os.system(cmd)\n"),
            ],
        );

        let compiled = compile_from_dir(dir.path(), &TreeSitterBuilder::python()).expect("compile");
        let names: Vec<&str> = compiled.corpus.patterns().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a_spawn", "b_exec"]);
        assert!(compiled.warnings.is_empty());
    }

    #[test]
    fn test_bad_samples_are_skipped() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        write_samples(
            dir.path(),
            &[
                ("good.py", "exec(x)\n"),
                ("broken.py", "def (:\n"),
                ("empty.py", "# nothing here\n"),
            ],
        );
        std::fs::write(dir.path().join("binary.py"), [0xffu8, 0xfe, 0x00]).expect("write");

        let compiled = compile_from_dir(dir.path(), &TreeSitterBuilder::python()).expect("compile");
        assert_eq!(compiled.corpus.len(), 1);
        assert_eq!(compiled.warnings.len(), 3);
        assert!(compiled.warnings.iter().any(|w| w.kind == WarningKind::Decode));
    }

    #[test]
    fn test_bundle_reused_then_recompiled_on_change() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let samples = dir.path().join("samples");
        std::fs::create_dir(&samples).expect("mkdir");
        write_samples(&samples, &[("exec.py", "exec(x)\n")]);
        let bundle = ArtifactCache::new(dir.path().join("bundle.bin"));
        let builder = TreeSitterBuilder::python();

        let first = prepare_forbidden_corpus(Some(samples.as_path()), Some(&bundle), &builder);
        assert!(first.warnings.is_empty());
        assert!(bundle.exists());

        let second = prepare_forbidden_corpus(Some(samples.as_path()), Some(&bundle), &builder);
        assert!(second.warnings.is_empty());
        assert_eq!(first.corpus, second.corpus);

        write_samples(&samples, &[("spawn.py", "os.system(cmd)\n")]);
        let third = prepare_forbidden_corpus(Some(samples.as_path()), Some(&bundle), &builder);
        assert_eq!(third.warnings.len(), 1);
        assert_eq!(third.warnings[0].kind, WarningKind::CacheStale);
        assert_eq!(third.corpus.expect("corpus").len(), 2);
    }

    #[test]
    fn test_builtin_samples_compile() {
        let compiled = compile_builtin(&TreeSitterBuilder::python());
        assert!(compiled.warnings.is_empty(), "{:?}", compiled.warnings);
        let names: Vec<&str> = compiled.corpus.patterns().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["exec_b64", "exec_remote", "os_system_shell", "subprocess_shell"]);
    }

    #[test]
    fn test_bundle_alone_is_trusted() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let bundle = ArtifactCache::new(dir.path().join("bundle.bin"));
        let corpus = ForbiddenCorpus::new(vec![ForbiddenPattern::new(
            "p",
            SyntaxNode::root(vec![SyntaxNode::leaf("pass_statement")]),
        )]);
        bundle.store(&corpus, 7).expect("store");

        let prepared = prepare_forbidden_corpus(None, Some(&bundle), &TreeSitterBuilder::python());
        assert_eq!(prepared.corpus, Some(corpus));
    }

    #[test]
    fn test_missing_corpus_is_a_single_warning() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let bundle = ArtifactCache::new(dir.path().join("absent.bin"));
        let prepared = prepare_forbidden_corpus(
            Some(dir.path().join("no-samples").as_path()),
            Some(&bundle),
            &TreeSitterBuilder::python(),
        );
        assert!(prepared.corpus.is_none());
        assert_eq!(prepared.warnings.len(), 1);
        assert_eq!(prepared.warnings[0].kind, WarningKind::CorpusMissing);
    }

    #[test]
    fn test_inconsistent_signature_rejected() {
        let mut pattern = ForbiddenPattern::new("p", SyntaxNode::root(vec![SyntaxNode::leaf("a")]));
        pattern.signature = Signature::from(vec!["a".to_string(), "root".to_string()]);
        let corpus = ForbiddenCorpus::new(vec![pattern]);
        assert!(corpus.validate().is_err());
    }
}
