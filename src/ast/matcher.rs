//! Two-stage approximate tree matching
//!
//! Stage one compares signatures with a weighted sequence edit distance
//! under the same costs as the tree edit distance. A tree mapping preserves
//! the order of the stack traversal, so the sequence distance never exceeds
//! the tree distance: a pattern rejected here could not have matched in
//! stage two. Stage two runs the full tree edit distance on the survivors.

use super::forbidden::ForbiddenPattern;
use super::ted::{tree_edit_distance, EditCosts};
use super::tree::{Signature, SyntaxNode};
use tracing::trace;

/// Reference acceptance threshold: a match needs distance < 2
pub const DEFAULT_THRESHOLD: u32 = 2;

/// A forbidden pattern confirmed in a candidate tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternHit {
    pub pattern_index: usize,
    pub distance: u32,
}

/// Weighted edit distance turning the `pattern` signature into `candidate`.
///
/// With the default costs this is `len(pattern) - LCS(pattern, candidate)`.
pub fn signature_distance(pattern: &Signature, candidate: &Signature, costs: &EditCosts) -> u32 {
    let p = pattern.labels();
    let c = candidate.labels();

    // Column over the (short) pattern, rolled along the candidate
    let mut prev: Vec<u32> = (0..=p.len() as u32).map(|i| i.saturating_mul(costs.delete)).collect();
    let mut cur = vec![0u32; p.len() + 1];

    for (j, label) in c.iter().enumerate() {
        cur[0] = (j as u32 + 1).saturating_mul(costs.insert);
        for i in 1..=p.len() {
            let insert = prev[i].saturating_add(costs.insert);
            let delete = cur[i - 1].saturating_add(costs.delete);
            let substitute = prev[i - 1].saturating_add(costs.substitute(&p[i - 1], label));
            cur[i] = insert.min(delete).min(substitute);
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    prev[p.len()]
}

/// Filters and confirms forbidden patterns against candidate trees
#[derive(Debug, Clone, Copy)]
pub struct TreeMatcher {
    pub costs: EditCosts,
    /// Matches need a distance strictly below this
    pub threshold: u32,
}

impl Default for TreeMatcher {
    fn default() -> Self {
        Self {
            costs: EditCosts::default(),
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl TreeMatcher {
    pub fn new(costs: EditCosts, threshold: u32) -> Self {
        Self { costs, threshold }
    }

    /// Every pattern within the threshold of `candidate`, in corpus order.
    ///
    /// A candidate with no statements never matches.
    pub fn find_matches(
        &self,
        candidate: &SyntaxNode,
        signature: &Signature,
        patterns: &[ForbiddenPattern],
    ) -> Vec<PatternHit> {
        if candidate.is_empty() {
            return Vec::new();
        }

        let mut hits = Vec::new();
        for (index, pattern) in patterns.iter().enumerate() {
            let lower_bound = signature_distance(&pattern.signature, signature, &self.costs);
            if lower_bound >= self.threshold {
                continue;
            }

            let distance = tree_edit_distance(&pattern.tree, candidate, &self.costs);
            trace!(
                "pattern {} ({}): signature distance {}, tree distance {}",
                index,
                pattern.name,
                lower_bound,
                distance
            );
            if distance < self.threshold {
                hits.push(PatternHit {
                    pattern_index: index,
                    distance,
                });
            }
        }
        hits
    }
}
