//! Tree edit distance (Zhang-Shasha) with per-operation costs
//!
//! The distance is asymmetric: the first tree is the forbidden pattern and
//! the second the candidate. Deleting a pattern node costs `delete`,
//! inserting a candidate node costs `insert`, relabeling costs `rename`.
//! With the default costs inserts are free, so a candidate that *contains*
//! the pattern among unrelated code stays at distance zero.

use super::tree::SyntaxNode;
use serde::{Deserialize, Serialize};

/// Per-operation costs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditCosts {
    pub rename: u32,
    pub insert: u32,
    pub delete: u32,
}

impl Default for EditCosts {
    fn default() -> Self {
        Self {
            rename: 1,
            insert: 0,
            delete: 1,
        }
    }
}

impl EditCosts {
    #[inline]
    pub(crate) fn substitute(&self, a: &str, b: &str) -> u32 {
        if a == b {
            0
        } else {
            self.rename
        }
    }
}

/// Postorder view of a tree: labels, leftmost leaf descendants, keyroots
struct Postorder<'a> {
    labels: Vec<&'a str>,
    leftmost: Vec<usize>,
    keyroots: Vec<usize>,
}

impl<'a> Postorder<'a> {
    fn new(root: &'a SyntaxNode) -> Self {
        let mut labels = Vec::new();
        let mut leftmost = Vec::new();

        // (node, next child to visit, postorder index of its first child)
        let mut stack: Vec<(&SyntaxNode, usize, Option<usize>)> = vec![(root, 0, None)];
        while let Some(top) = stack.last_mut() {
            let (node, next, _) = *top;
            if next < node.children.len() {
                top.1 += 1;
                stack.push((&node.children[next], 0, None));
                continue;
            }

            let (node, _, first_child) = match stack.pop() {
                Some(frame) => frame,
                None => break,
            };
            let index = labels.len();
            labels.push(node.label.as_str());
            leftmost.push(first_child.map_or(index, |child| leftmost[child]));

            if let Some(parent) = stack.last_mut() {
                // The parent's first child is the one that finished first
                if parent.2.is_none() {
                    parent.2 = Some(index);
                }
            }
        }

        // A keyroot is the highest node for each distinct leftmost leaf
        let mut seen = vec![false; labels.len()];
        let mut keyroots = Vec::new();
        for i in (0..labels.len()).rev() {
            let l = leftmost[i];
            if !seen[l] {
                seen[l] = true;
                keyroots.push(i);
            }
        }
        keyroots.reverse();

        Self {
            labels,
            leftmost,
            keyroots,
        }
    }

    fn len(&self) -> usize {
        self.labels.len()
    }
}

/// Minimum cost to transform `pattern` into `candidate`
pub fn tree_edit_distance(pattern: &SyntaxNode, candidate: &SyntaxNode, costs: &EditCosts) -> u32 {
    let a = Postorder::new(pattern);
    let b = Postorder::new(candidate);
    let (n, m) = (a.len(), b.len());

    // Subtree distances, row-major n x m
    let mut tree_dist = vec![0u32; n * m];
    // Forest distances, reused across keyroot pairs
    let mut forest = vec![0u32; (n + 1) * (m + 1)];

    for &i in &a.keyroots {
        for &j in &b.keyroots {
            forest_distance(&a, &b, i, j, costs, &mut tree_dist, &mut forest);
        }
    }

    tree_dist[n * m - 1]
}

fn forest_distance(
    a: &Postorder<'_>,
    b: &Postorder<'_>,
    i: usize,
    j: usize,
    costs: &EditCosts,
    tree_dist: &mut [u32],
    forest: &mut [u32],
) {
    let m = b.len();
    let li = a.leftmost[i];
    let lj = b.leftmost[j];
    let rows = i - li + 2;
    let cols = j - lj + 2;
    let at = |r: usize, c: usize| r * cols + c;

    forest[at(0, 0)] = 0;
    for r in 1..rows {
        forest[at(r, 0)] = forest[at(r - 1, 0)].saturating_add(costs.delete);
    }
    for c in 1..cols {
        forest[at(0, c)] = forest[at(0, c - 1)].saturating_add(costs.insert);
    }

    for r in 1..rows {
        let x = li + r - 1;
        for c in 1..cols {
            let y = lj + c - 1;
            let delete = forest[at(r - 1, c)].saturating_add(costs.delete);
            let insert = forest[at(r, c - 1)].saturating_add(costs.insert);

            if a.leftmost[x] == li && b.leftmost[y] == lj {
                let rename = forest[at(r - 1, c - 1)]
                    .saturating_add(costs.substitute(a.labels[x], b.labels[y]));
                let best = delete.min(insert).min(rename);
                forest[at(r, c)] = best;
                tree_dist[x * m + y] = best;
            } else {
                let p = a.leftmost[x] - li;
                let q = b.leftmost[y] - lj;
                let subtree = forest[at(p, q)].saturating_add(tree_dist[x * m + y]);
                forest[at(r, c)] = delete.min(insert).min(subtree);
            }
        }
    }
}
