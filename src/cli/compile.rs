//! Compile command - rebuild both corpus caches from scratch

use crate::ast::{compile_from_dir, ForbiddenCorpus, TreeSitterBuilder};
use crate::cache::ArtifactCache;
use crate::config::ScanConfig;
use crate::matching::{prepare_automaton, Automaton};
use anyhow::{bail, Context, Result};
use tracing::warn;

pub(super) fn run(config: &ScanConfig) -> Result<()> {
    let blacklist = config.text.blacklist.as_deref();
    let samples = config.structural.samples_dir.as_deref();
    if blacklist.is_none() && samples.is_none() {
        bail!("Nothing to compile: pass --blacklist and/or --samples (or set them in pkgaudit.toml)");
    }

    if let Some(blacklist) = blacklist {
        let cache = ArtifactCache::<Automaton>::new(config.text.automaton_cache_path());
        cache.invalidate()?;
        let prepared = prepare_automaton(Some(blacklist), Some(&cache))
            .with_context(|| format!("Failed to compile blacklist {}", blacklist.display()))?;
        if let Some(automaton) = prepared.automaton {
            println!(
                "automaton: {} patterns, {} states -> {}",
                automaton.pattern_count(),
                automaton.state_count(),
                cache.path().display()
            );
        }
    }

    if let Some(samples) = samples {
        // A failed compile must not leave an older bundle behind for scans to trust
        let bundle = ArtifactCache::<ForbiddenCorpus>::new(config.structural.bundle_path());
        bundle.invalidate()?;

        let compiled = compile_from_dir(
            samples,
            &TreeSitterBuilder::python().with_limits(config.structural.tree_limits()),
        )
            .with_context(|| format!("Failed to read samples from {}", samples.display()))?;
        for warning in &compiled.warnings {
            warn!("{}", warning.message);
        }
        if compiled.corpus.is_empty() {
            bail!("No usable samples in {}", samples.display());
        }

        bundle.store(&compiled.corpus, compiled.key)?;
        println!(
            "forbidden patterns: {} compiled, {} skipped -> {}",
            compiled.corpus.len(),
            compiled.warnings.len(),
            bundle.path().display()
        );
    }

    Ok(())
}
