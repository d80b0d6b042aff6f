//! CLI command definitions and handlers

mod compile;
mod files;
mod scan;

use crate::config::{load_config_file, load_scan_config, ScanConfig};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Parse and validate workers count (1-64)
fn parse_workers(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if n == 0 {
        Err("workers must be at least 1".to_string())
    } else if n > 64 {
        Err("workers cannot exceed 64".to_string())
    } else {
        Ok(n)
    }
}

/// pkgaudit - Malicious package detection
#[derive(Parser, Debug)]
#[command(name = "pkgaudit")]
#[command(
    version,
    about = "Scan package files for blacklisted domains and known-malicious code shapes",
    after_help = "\
Examples:
  pkgaudit scan ./extracted-pkg --blacklist domains.txt --samples malicious/
  pkgaudit scan setup.py --bundle forbidden.bin
  pkgaudit compile --blacklist domains.txt --samples malicious/"
)]
pub struct Cli {
    /// Config file (default: pkgaudit.toml or .pkgauditrc.json in the working directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    /// Number of parallel workers (1-64, default: auto)
    #[arg(long, global = true, value_parser = parse_workers)]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where the corpora come from; each flag overrides the config file
#[derive(Args, Debug, Clone, Default)]
pub struct CorpusArgs {
    /// Newline-delimited blacklist of domains/URLs
    #[arg(long)]
    pub blacklist: Option<PathBuf>,

    /// Compiled automaton cache file
    #[arg(long)]
    pub automaton_cache: Option<PathBuf>,

    /// Precompiled forbidden pattern bundle
    #[arg(long)]
    pub bundle: Option<PathBuf>,

    /// Directory of malicious samples, one forbidden pattern per file
    #[arg(long)]
    pub samples: Option<PathBuf>,
}

impl CorpusArgs {
    fn apply(&self, config: &mut ScanConfig) {
        if let Some(ref path) = self.blacklist {
            config.text.blacklist = Some(path.clone());
        }
        if let Some(ref path) = self.automaton_cache {
            config.text.automaton_cache = Some(path.clone());
        }
        if let Some(ref path) = self.bundle {
            config.structural.bundle = Some(path.clone());
        }
        if let Some(ref path) = self.samples {
            config.structural.samples_dir = Some(path.clone());
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan files and directories, printing a JSON report to stdout
    #[command(after_help = "\
Examples:
  pkgaudit scan pkg/ --blacklist domains.txt          Text matching only
  pkgaudit scan pkg/ --samples malicious/             Structural matching only
  pkgaudit scan pkg/ --threshold 3 -o report.json     Looser structural matching
  pkgaudit scan pkg/ --popular-packages top.json      Also check the package name
  pkgaudit scan pkg/ --fail-on-findings               Exit code 1 if anything is found (CI mode)")]
    Scan {
        /// Files or directories to scan (directories are walked recursively)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        corpus: CorpusArgs,

        /// Structural matches need a tree edit distance below this
        #[arg(long)]
        threshold: Option<u32>,

        /// Popular package list; enables the typosquat check on package metadata
        #[arg(long)]
        popular_packages: Option<PathBuf>,

        /// Write the report to a file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Exit with code 1 when any finding is reported
        #[arg(long)]
        fail_on_findings: bool,
    },

    /// Precompile the blacklist automaton and the forbidden pattern bundle
    Compile {
        #[command(flatten)]
        corpus: CorpusArgs,
    },
}

/// Load configuration: an explicit `--config` must load, the implicit one may fall back to defaults
fn load_config(cli: &Cli) -> Result<ScanConfig> {
    let mut config = match cli.config {
        Some(ref path) => load_config_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => {
            let cwd = std::env::current_dir().context("Cannot determine working directory")?;
            load_scan_config(&cwd)
        }
    };
    if let Some(workers) = cli.workers {
        config.engine.workers = workers;
    }
    Ok(config)
}

/// Run the CLI; returns the process exit code
pub fn run(cli: Cli) -> Result<i32> {
    let mut config = load_config(&cli)?;

    match cli.command {
        Commands::Scan {
            paths,
            corpus,
            threshold,
            popular_packages,
            output,
            fail_on_findings,
        } => {
            corpus.apply(&mut config);
            if let Some(threshold) = threshold {
                config.structural.threshold = threshold;
            }
            if let Some(list) = popular_packages {
                config.typosquat.popular_packages = Some(list);
            }
            scan::run(&config, &paths, output.as_deref(), fail_on_findings)
        }

        Commands::Compile { corpus } => {
            corpus.apply(&mut config);
            compile::run(&config)?;
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_workers() {
        assert_eq!(parse_workers("4"), Ok(4));
        assert!(parse_workers("0").is_err());
        assert!(parse_workers("65").is_err());
        assert!(parse_workers("many").is_err());
    }

    #[test]
    fn test_scan_args() {
        let cli = Cli::try_parse_from([
            "pkgaudit",
            "--workers",
            "2",
            "scan",
            "a.py",
            "pkg/",
            "--blacklist",
            "bl.txt",
            "--threshold",
            "3",
        ])
        .expect("should parse");
        assert_eq!(cli.workers, Some(2));
        match cli.command {
            Commands::Scan {
                paths,
                corpus,
                threshold,
                ..
            } => {
                assert_eq!(paths, vec![PathBuf::from("a.py"), PathBuf::from("pkg/")]);
                assert_eq!(corpus.blacklist, Some(PathBuf::from("bl.txt")));
                assert_eq!(threshold, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_scan_requires_paths() {
        assert!(Cli::try_parse_from(["pkgaudit", "scan"]).is_err());
    }

    #[test]
    fn test_corpus_args_override_config() {
        let mut config = ScanConfig::default();
        config.text.blacklist = Some(PathBuf::from("from-config.txt"));
        config.structural.samples_dir = Some(PathBuf::from("config-samples"));

        let args = CorpusArgs {
            blacklist: Some(PathBuf::from("from-cli.txt")),
            ..Default::default()
        };
        args.apply(&mut config);
        assert_eq!(config.text.blacklist, Some(PathBuf::from("from-cli.txt")));
        assert_eq!(config.structural.samples_dir, Some(PathBuf::from("config-samples")));
    }
}
