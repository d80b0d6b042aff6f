//! Scan configuration (pkgaudit.toml)
//!
//! Configuration is loaded from (in order of precedence):
//! 1. `pkgaudit.toml` in the working directory
//! 2. `.pkgauditrc.json` in the working directory
//!
//! Every field is optional; anything not set falls back to the defaults
//! below. CLI flags override whatever is loaded here.
//!
//! # Example
//!
//! ```toml
//! [text]
//! blacklist = "data/blacklist.txt"
//! memory_budget_bytes = 268435456
//!
//! [structural]
//! samples_dir = "resources/forbidden_patterns"
//! threshold = 2
//! costs = { rename = 1, insert = 0, delete = 1 }
//! extensions = ["py"]
//!
//! [typosquat]
//! popular_packages = "data/top-pypi-packages.json"
//! threshold = 0.3
//!
//! [engine]
//! workers = 8
//! ```

use crate::ast::{EditCosts, TreeLimits, DEFAULT_MAX_TREE_DEPTH, DEFAULT_MAX_TREE_NODES, DEFAULT_THRESHOLD};
use crate::cache::{default_automaton_path, default_bundle_path};
use crate::detectors::DEFAULT_TYPOSQUAT_THRESHOLD;
use crate::matching::streaming::DEFAULT_MIN_CHUNK_BYTES;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub text: TextConfig,
    pub structural: StructuralConfig,
    pub typosquat: TyposquatConfig,
    pub engine: EngineConfig,
}

/// Blacklist text matching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    /// Newline-delimited blacklist file
    pub blacklist: Option<PathBuf>,
    /// Where the compiled automaton is persisted
    pub automaton_cache: Option<PathBuf>,
    /// Fixed per-worker budget; unset shares available system memory
    pub memory_budget_bytes: Option<u64>,
    pub min_chunk_bytes: usize,
    /// Carry automaton state across chunk boundaries
    pub span_chunks: bool,
    /// Always scan in chunks of this size
    pub force_chunk_bytes: Option<usize>,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            blacklist: None,
            automaton_cache: None,
            memory_budget_bytes: None,
            min_chunk_bytes: DEFAULT_MIN_CHUNK_BYTES,
            span_chunks: true,
            force_chunk_bytes: None,
        }
    }
}

impl TextConfig {
    pub fn automaton_cache_path(&self) -> PathBuf {
        self.automaton_cache
            .clone()
            .unwrap_or_else(default_automaton_path)
    }
}

/// Structural (syntax tree) matching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuralConfig {
    /// Matches need a tree edit distance strictly below this
    pub threshold: u32,
    pub costs: EditCosts,
    /// Precompiled forbidden pattern bundle
    pub bundle: Option<PathBuf>,
    /// Directory of malicious samples, one pattern per file
    pub samples_dir: Option<PathBuf>,
    /// Use the samples shipped in the binary when neither a sample
    /// directory nor a bundle is available
    pub builtin_samples: bool,
    /// 0 disables the bound
    pub max_tree_nodes: usize,
    /// Nesting bound below the root; 0 disables it
    pub max_tree_depth: usize,
    /// File extensions to parse; empty parses every file
    pub extensions: Vec<String>,
}

impl Default for StructuralConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            costs: EditCosts::default(),
            bundle: None,
            samples_dir: None,
            builtin_samples: true,
            max_tree_nodes: DEFAULT_MAX_TREE_NODES,
            max_tree_depth: DEFAULT_MAX_TREE_DEPTH,
            extensions: Vec::new(),
        }
    }
}

impl StructuralConfig {
    pub fn bundle_path(&self) -> PathBuf {
        self.bundle.clone().unwrap_or_else(default_bundle_path)
    }

    pub fn tree_limits(&self) -> TreeLimits {
        TreeLimits {
            max_nodes: self.max_tree_nodes,
            max_depth: self.max_tree_depth,
        }
    }
}

/// Package name similarity against popular packages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TyposquatConfig {
    /// Local popular package list (top-packages JSON dump or one name per line);
    /// unset disables the detector
    pub popular_packages: Option<PathBuf>,
    /// Normalized edit distance strictly below this is reported
    pub threshold: f64,
}

impl Default for TyposquatConfig {
    fn default() -> Self {
        Self {
            popular_packages: None,
            threshold: DEFAULT_TYPOSQUAT_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads (0 = auto)
    pub workers: usize,
}

/// Load configuration from the working directory.
///
/// A missing file yields defaults; an invalid one is logged and ignored.
pub fn load_scan_config(dir: &Path) -> ScanConfig {
    let toml_path = dir.join("pkgaudit.toml");
    if toml_path.exists() {
        match load_config_file(&toml_path) {
            Ok(config) => {
                debug!("Loaded config from {}", toml_path.display());
                return config;
            }
            Err(e) => {
                warn!("Failed to load {}: {}", toml_path.display(), e);
            }
        }
    }

    let json_path = dir.join(".pkgauditrc.json");
    if json_path.exists() {
        match load_config_file(&json_path) {
            Ok(config) => {
                debug!("Loaded config from {}", json_path.display());
                return config;
            }
            Err(e) => {
                warn!("Failed to load {}: {}", json_path.display(), e);
            }
        }
    }

    debug!("No config found, using defaults");
    ScanConfig::default()
}

/// Load an explicit config file; the format follows the extension
pub fn load_config_file(path: &Path) -> anyhow::Result<ScanConfig> {
    let content = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let config = if is_json {
        serde_json::from_str(&content)?
    } else {
        toml::from_str(&content)?
    };
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScanConfig::default();
        assert_eq!(config.structural.threshold, 2);
        assert_eq!(config.structural.costs, EditCosts { rename: 1, insert: 0, delete: 1 });
        assert_eq!(config.structural.max_tree_nodes, 100_000);
        assert_eq!(config.structural.max_tree_depth, 1_000);
        assert!(config.structural.builtin_samples);
        assert_eq!(config.text.min_chunk_bytes, 64 * 1024);
        assert!(config.text.span_chunks);
        assert_eq!(config.engine.workers, 0);
        assert!(config.typosquat.popular_packages.is_none());
        assert_eq!(config.typosquat.threshold, 0.3);
    }

    #[test]
    fn test_partial_toml() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        std::fs::write(
            dir.path().join("pkgaudit.toml"),
            r#"
[text]
blacklist = "bl.txt"
span_chunks = false

[structural]
threshold = 3
costs = { insert = 1 }
extensions = ["py"]
"#,
        )
        .expect("should write config");

        let config = load_scan_config(dir.path());
        assert_eq!(config.text.blacklist, Some(PathBuf::from("bl.txt")));
        assert!(!config.text.span_chunks);
        assert_eq!(config.text.min_chunk_bytes, 64 * 1024);
        assert_eq!(config.structural.threshold, 3);
        assert_eq!(config.structural.costs, EditCosts { rename: 1, insert: 1, delete: 1 });
        assert_eq!(config.structural.extensions, vec!["py".to_string()]);
    }

    #[test]
    fn test_json_fallback() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        std::fs::write(
            dir.path().join(".pkgauditrc.json"),
            r#"{"engine": {"workers": 3}}"#,
        )
        .expect("should write config");
        assert_eq!(load_scan_config(dir.path()).engine.workers, 3);
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        std::fs::write(dir.path().join("pkgaudit.toml"), "[structural\nthreshold =").expect("write");
        assert_eq!(load_scan_config(dir.path()), ScanConfig::default());
    }

    #[test]
    fn test_explicit_file_errors_surface() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[engine]\nworkers = \"many\"\n").expect("write");
        assert!(load_config_file(&path).is_err());
    }
}
