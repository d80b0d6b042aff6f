//! Blacklist text matching
//!
//! - [`corpus`]: load and normalize the blacklist
//! - [`automaton`]: compile it into an Aho-Corasick automaton
//! - [`streaming`]: scan files against the automaton under a memory budget
//! - [`memory`]: how much memory a worker may use

pub mod automaton;
pub mod corpus;
pub mod memory;
pub mod streaming;

pub use automaton::Automaton;
pub use corpus::PatternCorpus;
pub use memory::{MemoryBudget, MemorySource};
pub use streaming::{ScanPlan, StreamOptions, StreamOutcome, StreamingScanner};

use crate::cache::ArtifactCache;
use crate::error::{ScanError, ScanResult};
use crate::models::{ScanWarning, WarningKind};
use std::path::Path;
use tracing::{info, warn};

/// Automaton for the session plus any warnings raised while obtaining it
#[derive(Debug, Default)]
pub struct PreparedAutomaton {
    pub automaton: Option<Automaton>,
    pub warnings: Vec<ScanWarning>,
}

/// Obtain the session automaton.
///
/// With a blacklist, the cache is used only when it was built from that
/// exact corpus; otherwise the automaton is rebuilt and the cache rewritten.
/// Without a blacklist, an existing cache is trusted as-is. With neither,
/// text matching is disabled.
///
/// Corpus errors (unreadable blacklist, empty entries) are fatal.
pub fn prepare_automaton(
    blacklist: Option<&Path>,
    cache: Option<&ArtifactCache<Automaton>>,
) -> ScanResult<PreparedAutomaton> {
    let mut prepared = PreparedAutomaton::default();

    let Some(blacklist) = blacklist else {
        if let Some(cache) = cache {
            if let Some(automaton) = cache.load(None)? {
                info!(
                    "Loaded automaton ({} patterns) from {} without a blacklist to check it against",
                    automaton.pattern_count(),
                    cache.path().display()
                );
                prepared.automaton = Some(automaton);
                return Ok(prepared);
            }
        }
        info!("No blacklist configured, text matching disabled");
        return Ok(prepared);
    };

    let corpus = PatternCorpus::load(blacklist)?;
    let key = corpus.content_key();

    if let Some(cache) = cache {
        match cache.load(Some(key)) {
            Ok(Some(automaton)) => {
                info!(
                    "Loaded automaton ({} patterns) from {}",
                    automaton.pattern_count(),
                    cache.path().display()
                );
                prepared.automaton = Some(automaton);
                return Ok(prepared);
            }
            Ok(None) => {}
            Err(e @ ScanError::CacheStale { .. }) => {
                warn!("{}; rebuilding", e);
                prepared
                    .warnings
                    .push(ScanWarning::new(WarningKind::CacheStale, "blacklist", e.to_string()).with_path(cache.path()));
            }
            Err(e) => {
                warn!("Ignoring unreadable automaton cache: {}", e);
                prepared
                    .warnings
                    .push(ScanWarning::new(WarningKind::Io, "blacklist", e.to_string()).with_path(cache.path()));
            }
        }
    }

    info!("Compiling automaton for {} blacklist patterns", corpus.len());
    let automaton = Automaton::build(&corpus);

    if let Some(cache) = cache {
        if let Err(e) = cache.store(&automaton, key) {
            warn!("Failed to persist automaton: {}", e);
            prepared
                .warnings
                .push(ScanWarning::new(WarningKind::Io, "blacklist", e.to_string()).with_path(cache.path()));
        }
    }

    prepared.automaton = Some(automaton);
    Ok(prepared)
}
