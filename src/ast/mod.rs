//! Structural (syntax-tree) matching
//!
//! - [`tree`]: labeled trees and signatures
//! - [`parser`]: source text to trees
//! - [`ted`]: tree edit distance
//! - [`matcher`]: signature pre-filter, then tree edit distance
//! - [`forbidden`]: the forbidden pattern corpus

pub mod forbidden;
pub mod matcher;
pub mod parser;
pub mod ted;
pub mod tree;

pub use forbidden::{
    compile_builtin, compile_from_dir, prepare_forbidden_corpus, CompiledCorpus, ForbiddenCorpus,
    ForbiddenPattern,
    PreparedCorpus,
};
pub use matcher::{signature_distance, PatternHit, TreeMatcher, DEFAULT_THRESHOLD};
pub use parser::{
    ParsedSource, SyntaxTreeBuilder, TreeLimits, TreeSitterBuilder, DEFAULT_MAX_TREE_DEPTH,
    DEFAULT_MAX_TREE_NODES,
};
pub use ted::{tree_edit_distance, EditCosts};
pub use tree::{Signature, SyntaxNode};
