//! Labeled ordered trees and their flattened signatures
//!
//! A [`SyntaxNode`] keeps only the node-type label and the ordered children;
//! identifiers, literals and positions are dropped. Trees are rooted at a
//! synthetic `root` node whose children are the top-level statements.
//!
//! The [`Signature`] of a tree uses a stack traversal: push the root, then
//! repeatedly pop a node, emit its label and push its children in source
//! order. The last child is therefore visited first. Signatures built with
//! any other order are not comparable with persisted ones.
//!
//! Source files can nest arbitrarily deep, so nothing on a tree recurses:
//! dropping, cloning, comparing, hashing and printing all use explicit stacks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Label of the synthetic node above the top-level statements
pub const ROOT_LABEL: &str = "root";

/// A node of a labeled ordered tree; owns its children
#[derive(Serialize, Deserialize)]
#[serde(into = "FlatTree", try_from = "FlatTree")]
pub struct SyntaxNode {
    pub label: String,
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    pub fn new(label: impl Into<String>, children: Vec<SyntaxNode>) -> Self {
        Self {
            label: label.into(),
            children,
        }
    }

    pub fn leaf(label: impl Into<String>) -> Self {
        Self::new(label, Vec::new())
    }

    /// Synthetic root over `statements`
    pub fn root(statements: Vec<SyntaxNode>) -> Self {
        Self::new(ROOT_LABEL, statements)
    }

    /// True when a root has no statements under it
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of nodes in the tree, including this one
    pub fn size(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }

    /// Flatten the tree with the stack traversal described in the module docs
    pub fn signature(&self) -> Signature {
        let mut labels = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            labels.push(node.label.clone());
            for child in &node.children {
                stack.push(child);
            }
        }
        Signature(labels)
    }
}

impl Drop for SyntaxNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

impl Clone for SyntaxNode {
    fn clone(&self) -> Self {
        // Source nodes still being copied, with the copies of their finished children
        let mut stack: Vec<(&SyntaxNode, Vec<SyntaxNode>)> =
            vec![(self, Vec::with_capacity(self.children.len()))];
        let mut copy = None;

        while let Some((source, done)) = stack.last_mut() {
            let source: &SyntaxNode = *source;
            if let Some(child) = source.children.get(done.len()) {
                stack.push((child, Vec::with_capacity(child.children.len())));
                continue;
            }
            let children = std::mem::take(done);
            stack.pop();
            let node = SyntaxNode::new(source.label.clone(), children);
            match stack.last_mut() {
                Some((_, siblings)) => siblings.push(node),
                None => copy = Some(node),
            }
        }

        copy.unwrap_or_else(|| SyntaxNode::leaf(self.label.clone()))
    }
}

impl PartialEq for SyntaxNode {
    fn eq(&self, other: &Self) -> bool {
        let mut stack = vec![(self, other)];
        while let Some((a, b)) = stack.pop() {
            if a.label != b.label || a.children.len() != b.children.len() {
                return false;
            }
            stack.extend(a.children.iter().zip(&b.children));
        }
        true
    }
}

impl Eq for SyntaxNode {}

impl Hash for SyntaxNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            node.label.hash(state);
            node.children.len().hash(state);
            stack.extend(node.children.iter().rev());
        }
    }
}

impl fmt::Display for SyntaxNode {
    /// S-expression form, e.g. `(root (call identifier argument_list))`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        enum Step<'a> {
            Node(&'a SyntaxNode),
            Close,
        }

        let mut stack = vec![Step::Node(self)];
        let mut first = true;
        while let Some(step) = stack.pop() {
            let node = match step {
                Step::Close => {
                    write!(f, ")")?;
                    continue;
                }
                Step::Node(node) => node,
            };
            if !first {
                write!(f, " ")?;
            }
            first = false;
            if node.children.is_empty() {
                write!(f, "{}", node.label)?;
            } else {
                write!(f, "({}", node.label)?;
                stack.push(Step::Close);
                stack.extend(node.children.iter().rev().map(Step::Node));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for SyntaxNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyntaxNode({})", self)
    }
}

/// Persisted form of a tree: preorder labels with child counts
#[derive(Serialize, Deserialize)]
struct FlatTree {
    labels: Vec<String>,
    arity: Vec<u32>,
}

impl From<SyntaxNode> for FlatTree {
    fn from(root: SyntaxNode) -> Self {
        let mut labels = Vec::new();
        let mut arity = Vec::new();
        let mut stack = vec![root];
        while let Some(mut node) = stack.pop() {
            labels.push(std::mem::take(&mut node.label));
            arity.push(node.children.len() as u32);
            stack.extend(std::mem::take(&mut node.children).into_iter().rev());
        }
        FlatTree { labels, arity }
    }
}

impl TryFrom<FlatTree> for SyntaxNode {
    type Error = String;

    fn try_from(flat: FlatTree) -> Result<Self, Self::Error> {
        if flat.labels.len() != flat.arity.len() {
            return Err("label and arity tables differ in length".to_string());
        }

        let mut root = None;
        // Open nodes with the number of children they still expect
        let mut stack: Vec<(SyntaxNode, u32)> = Vec::new();
        for (label, arity) in flat.labels.into_iter().zip(flat.arity) {
            if root.is_some() {
                return Err("nodes after the root is complete".to_string());
            }
            stack.push((SyntaxNode::leaf(label), arity));

            while let Some((_, 0)) = stack.last() {
                let Some((done, _)) = stack.pop() else { break };
                match stack.last_mut() {
                    Some((parent, remaining)) => {
                        parent.children.push(done);
                        *remaining -= 1;
                    }
                    None => root = Some(done),
                }
            }
        }

        match root {
            Some(root) if stack.is_empty() => Ok(root),
            _ => Err("truncated tree".to_string()),
        }
    }
}

/// Flattened label sequence of a tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature(Vec<String>);

impl Signature {
    pub fn labels(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for Signature {
    fn from(labels: Vec<String>) -> Self {
        Signature(labels)
    }
}
