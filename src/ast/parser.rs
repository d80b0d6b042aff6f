//! Source text to [`SyntaxNode`] via tree-sitter

use super::tree::{Signature, SyntaxNode};
use crate::error::{ScanError, ScanResult};
use std::path::Path;
use tree_sitter::{Language, Parser, Tree};

/// Default bound on the number of nodes in one syntax tree
pub const DEFAULT_MAX_TREE_NODES: usize = 100_000;

/// Default bound on nesting depth below the synthetic root
pub const DEFAULT_MAX_TREE_DEPTH: usize = 1_000;

/// A parsed file together with its signature
#[derive(Debug, Clone)]
pub struct ParsedSource {
    pub tree: SyntaxNode,
    pub signature: Signature,
}

/// Builds labeled syntax trees for one grammar
pub trait SyntaxTreeBuilder: Send + Sync {
    /// Grammar name, reported in parse errors
    fn grammar(&self) -> &'static str;

    /// Parse `source` into a tree rooted at the synthetic `root` node.
    /// `path` is only used for error reporting.
    fn parse(&self, source: &str, path: &Path) -> ScanResult<SyntaxNode>;

    fn parse_with_signature(&self, source: &str, path: &Path) -> ScanResult<ParsedSource> {
        let tree = self.parse(source, path)?;
        let signature = tree.signature();
        Ok(ParsedSource { tree, signature })
    }
}

/// Size bounds enforced while a tree is being built. 0 disables a bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeLimits {
    pub max_nodes: usize,
    pub max_depth: usize,
}

impl Default for TreeLimits {
    fn default() -> Self {
        Self {
            max_nodes: DEFAULT_MAX_TREE_NODES,
            max_depth: DEFAULT_MAX_TREE_DEPTH,
        }
    }
}

/// tree-sitter backed builder.
///
/// Labels are node kinds. Only named nodes are kept and extras (comments)
/// are skipped, so punctuation and comments never influence distances.
/// Trees over the [`TreeLimits`] are rejected with
/// [`ScanError::TreeTooLarge`] before they are fully built.
#[derive(Clone)]
pub struct TreeSitterBuilder {
    language: Language,
    grammar: &'static str,
    limits: TreeLimits,
}

impl TreeSitterBuilder {
    pub fn new(language: Language, grammar: &'static str) -> Self {
        Self {
            language,
            grammar,
            limits: TreeLimits::default(),
        }
    }

    pub fn python() -> Self {
        Self::new(tree_sitter_python::LANGUAGE.into(), "python")
    }

    pub fn with_limits(mut self, limits: TreeLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> TreeLimits {
        self.limits
    }
}

impl std::fmt::Debug for TreeSitterBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeSitterBuilder")
            .field("grammar", &self.grammar)
            .field("limits", &self.limits)
            .finish()
    }
}

impl SyntaxTreeBuilder for TreeSitterBuilder {
    fn grammar(&self) -> &'static str {
        self.grammar
    }

    fn parse(&self, source: &str, path: &Path) -> ScanResult<SyntaxNode> {
        let parse_error = || ScanError::Parse {
            path: path.to_path_buf(),
            grammar: self.grammar,
        };

        // Parser is not Sync; one per call
        let mut parser = Parser::new();
        parser
            .set_language(&self.language)
            .map_err(|e| ScanError::Config(format!("{} grammar: {}", self.grammar, e)))?;

        let tree = parser.parse(source, None).ok_or_else(parse_error)?;
        if tree.root_node().has_error() {
            return Err(parse_error());
        }

        convert(&tree, self.limits, path)
    }
}

/// Walk the tree-sitter tree with a cursor and rebuild it as a [`SyntaxNode`].
///
/// `open` holds the chain of nodes from the root to the current one; a node
/// is attached to its parent when the cursor climbs back out of it.
/// Anonymous nodes and extras are skipped together with their subtrees.
fn convert(tree: &Tree, limits: TreeLimits, path: &Path) -> ScanResult<SyntaxNode> {
    let too_large = |bound: &'static str, limit: usize| ScanError::TreeTooLarge {
        path: path.to_path_buf(),
        bound,
        limit,
    };

    let mut cursor = tree.walk();
    let mut nodes = 1usize;
    if !cursor.goto_first_child() {
        return Ok(SyntaxNode::root(Vec::new()));
    }
    let mut open = vec![SyntaxNode::root(Vec::new())];
    // Cursor depth below the module node
    let mut depth = 1usize;

    loop {
        let node = cursor.node();
        if node.is_named() && !node.is_extra() {
            nodes += 1;
            if limits.max_nodes > 0 && nodes > limits.max_nodes {
                return Err(too_large("nodes", limits.max_nodes));
            }
            if limits.max_depth > 0 && open.len() > limits.max_depth {
                return Err(too_large("levels of nesting", limits.max_depth));
            }
            open.push(SyntaxNode::leaf(node.kind()));
            if cursor.goto_first_child() {
                depth += 1;
                continue;
            }
            close_last(&mut open);
        }

        // Next sibling, closing every node we climb out of
        while !cursor.goto_next_sibling() {
            if depth == 1 || !cursor.goto_parent() {
                return Ok(open.swap_remove(0));
            }
            depth -= 1;
            close_last(&mut open);
        }
    }
}

fn close_last(open: &mut Vec<SyntaxNode>) {
    if open.len() < 2 {
        return;
    }
    if let Some(done) = open.pop() {
        if let Some(parent) = open.last_mut() {
            parent.children.push(done);
        }
    }
}
