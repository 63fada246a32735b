// Copyright (c) 2024-present, phylocore developers
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A rooted newick tree model.
//!
//! A [`Forest`] is an arena of nodes; any node with no parent is the root
//! of its own tree, so one arena can hold several independent trees at
//! once (cloning, re-rooting, and parsing all allocate within a forest).
//! Per-node client data is carried as the `Info` type parameter: ownership
//! and lifetime fall out of ordinary Rust rules instead of an opaque,
//! caller-managed pointer.

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// A stable handle to a node within a [`Forest`].
pub type NodeId = usize;

#[derive(Debug, Clone)]
struct NodeRecord<Info> {
    label: Option<String>,
    branch_length: Option<f64>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    info: Option<Info>,
}

/// An arena of newick tree nodes.
///
/// Invariant: a node's parent's children list contains it exactly once.
/// A root's branch length is conventionally unset.
#[derive(Debug, Clone)]
pub struct Forest<Info> {
    nodes: Vec<NodeRecord<Info>>,
}

impl<Info> Default for Forest<Info> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Info> Forest<Info> {
    /// Creates an empty forest.
    #[must_use]
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Allocates a new, parentless, childless node.
    pub fn new_node(&mut self, label: Option<String>, branch_length: Option<f64>) -> NodeId {
        self.nodes.push(NodeRecord {
            label,
            branch_length,
            children: Vec::new(),
            parent: None,
            info: None,
        });
        self.nodes.len() - 1
    }

    /// The node's label, if any.
    #[must_use]
    pub fn label(&self, id: NodeId) -> Option<&str> {
        self.nodes[id].label.as_deref()
    }

    /// Sets the node's label.
    pub fn set_label(&mut self, id: NodeId, label: Option<String>) {
        self.nodes[id].label = label;
    }

    /// The length of the branch connecting this node to its parent, or
    /// `None` if unset.
    #[must_use]
    pub fn branch_length(&self, id: NodeId) -> Option<f64> {
        self.nodes[id].branch_length
    }

    /// Sets the node's branch length.
    pub fn set_branch_length(&mut self, id: NodeId, length: Option<f64>) {
        self.nodes[id].branch_length = length;
    }

    /// The node's children, in order.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    /// The node's parent, if any.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    /// The opaque client-data slot attached to this node.
    #[must_use]
    pub fn info(&self, id: NodeId) -> Option<&Info> {
        self.nodes[id].info.as_ref()
    }

    /// A mutable reference to the node's client-data slot.
    pub fn info_mut(&mut self, id: NodeId) -> Option<&mut Info> {
        self.nodes[id].info.as_mut()
    }

    /// Overwrites the node's client-data slot.
    pub fn set_info(&mut self, id: NodeId, info: Info) {
        self.nodes[id].info = Some(info);
    }

    /// Removes and returns the node's client-data slot.
    pub fn take_info(&mut self, id: NodeId) -> Option<Info> {
        self.nodes[id].info.take()
    }

    fn detach(&mut self, child: NodeId) {
        if let Some(old_parent) = self.nodes[child].parent {
            self.nodes[old_parent].children.retain(|&c| c != child);
        }
        self.nodes[child].parent = None;
    }

    /// Attaches `child` to `parent`, appending it to `parent`'s children
    /// list. Detaches `child` from any previous parent first.
    pub fn set_parent(&mut self, child: NodeId, parent: NodeId) {
        self.detach(child);
        self.nodes[parent].children.push(child);
        self.nodes[child].parent = Some(parent);
    }

    /// Sets `parent`'s child at `index` to `child`, detaching `child` from
    /// any previous parent first. `index == parent`'s current child count
    /// appends; any larger index is a programmer error.
    ///
    /// # Panics
    ///
    /// Panics if `index` is more than one past the end of `parent`'s
    /// current children.
    pub fn set_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.detach(child);
        let len = self.nodes[parent].children.len();
        match index.cmp(&len) {
            Ordering::Less => {
                let old = self.nodes[parent].children[index];
                self.nodes[parent].children[index] = child;
                self.nodes[old].parent = None;
            }
            Ordering::Equal => self.nodes[parent].children.push(child),
            Ordering::Greater => panic!("set_child index out of bounds"),
        }
        self.nodes[child].parent = Some(parent);
    }

    /// The first child of `parent` whose label is exactly `label`.
    #[must_use]
    pub fn find_child(&self, parent: NodeId, label: &str) -> Option<NodeId> {
        self.nodes[parent]
            .children
            .iter()
            .copied()
            .find(|&c| self.nodes[c].label.as_deref() == Some(label))
    }

    /// Walks parent links from `node` up to the root of its tree.
    #[must_use]
    pub fn get_root(&self, node: NodeId) -> NodeId {
        let mut current = node;
        while let Some(parent) = self.nodes[current].parent {
            current = parent;
        }
        current
    }

    /// Total number of nodes in the subtree rooted at `root`, inclusive.
    #[must_use]
    pub fn get_num_nodes(&self, root: NodeId) -> usize {
        1 + self.nodes[root]
            .children
            .iter()
            .map(|&c| self.get_num_nodes(c))
            .sum::<usize>()
    }

    /// The deepest node that is an ancestor of both `a` and `b` (walking
    /// to the root from each), or `None` if they have no common ancestor
    /// (they live in different trees within this forest).
    #[must_use]
    pub fn get_mrca(&self, a: NodeId, b: NodeId) -> Option<NodeId> {
        let mut ancestors = HashSet::new();
        let mut cur = Some(a);
        while let Some(id) = cur {
            ancestors.insert(id);
            cur = self.nodes[id].parent;
        }
        let mut cur = Some(b);
        while let Some(id) = cur {
            if ancestors.contains(&id) {
                return Some(id);
            }
            cur = self.nodes[id].parent;
        }
        None
    }

    /// Structural equality: same labels and branch lengths throughout,
    /// same number of children at every node, in the same order.
    /// `Info` is not compared (it's an opaque side channel, not part of
    /// tree identity).
    #[must_use]
    pub fn equals(&self, a: NodeId, b: NodeId) -> bool {
        let (ra, rb) = (&self.nodes[a], &self.nodes[b]);
        if ra.label != rb.label || ra.branch_length != rb.branch_length {
            return false;
        }
        if ra.children.len() != rb.children.len() {
            return false;
        }
        ra.children
            .iter()
            .zip(rb.children.iter())
            .all(|(&x, &y)| self.equals(x, y))
    }

    /// Reorders `node`'s immediate children according to `cmp`.
    pub fn sort_children(&mut self, node: NodeId, mut cmp: impl FnMut(&Self, NodeId, NodeId) -> Ordering) {
        let mut children = std::mem::take(&mut self.nodes[node].children);
        children.sort_by(|&a, &b| cmp(self, a, b));
        self.nodes[node].children = children;
    }

    fn reverse_chain_to_root(&mut self, p: NodeId) {
        let mut current = p;
        let mut next_parent = self.nodes[p].parent;
        while let Some(par) = next_parent {
            let edge_len = self.nodes[current].branch_length;
            next_parent = self.nodes[par].parent;
            self.nodes[par].children.retain(|&c| c != current);
            self.nodes[par].parent = Some(current);
            self.nodes[par].branch_length = edge_len;
            self.nodes[current].children.push(par);
            current = par;
        }
        self.nodes[p].parent = None;
    }
}

impl<Info: Clone> Forest<Info> {
    /// Clones a single node (label, branch length, client data), detached
    /// from any parent or children.
    pub fn clone_node(&mut self, id: NodeId) -> NodeId {
        let rec = self.nodes[id].clone();
        self.nodes.push(NodeRecord {
            label: rec.label,
            branch_length: rec.branch_length,
            children: Vec::new(),
            parent: None,
            info: rec.info,
        });
        self.nodes.len() - 1
    }

    /// Deep-clones the subtree rooted at `id` within the same arena,
    /// returning the new root.
    pub fn clone_subtree(&mut self, id: NodeId) -> NodeId {
        let new_id = self.clone_node(id);
        let children: Vec<NodeId> = self.nodes[id].children.clone();
        for c in children {
            let new_child = self.clone_subtree(c);
            self.set_parent(new_child, new_id);
        }
        new_id
    }

    fn clone_into(src: &Self, id: NodeId, dst: &mut Self, map: &mut HashMap<NodeId, NodeId>) -> NodeId {
        let rec = &src.nodes[id];
        let new_id = dst.new_node(rec.label.clone(), rec.branch_length);
        dst.nodes[new_id].info = rec.info.clone();
        map.insert(id, new_id);
        let children: Vec<NodeId> = rec.children.clone();
        for c in children {
            let new_child = Self::clone_into(src, c, dst, map);
            dst.set_parent(new_child, new_id);
        }
        new_id
    }

    /// Returns a new tree whose root sits on the branch above `node` at
    /// `distance_above_node`, leaving `self` untouched.
    ///
    /// The new root has two children: `node`'s own subtree (branch length
    /// `distance_above_node`) and everything else (branch length
    /// `node`'s original branch length minus `distance_above_node`).
    #[must_use]
    pub fn re_root(&self, node: NodeId, distance_above_node: f64) -> (Self, NodeId) {
        let tree_root = self.get_root(node);
        let mut new_forest = Self::new();
        let mut map = HashMap::new();
        Self::clone_into(self, tree_root, &mut new_forest, &mut map);
        let new_node = map[&node];

        let Some(old_parent) = new_forest.nodes[new_node].parent else {
            // `node` is already the root of its tree: just add a new unary
            // parent above it at the requested distance.
            let new_root = new_forest.new_node(None, None);
            new_forest.set_parent(new_node, new_root);
            new_forest.nodes[new_node].branch_length = Some(distance_above_node);
            return (new_forest, new_root);
        };

        let edge_len = new_forest.nodes[new_node].branch_length.unwrap_or(0.0);
        new_forest.detach(new_node);
        new_forest.reverse_chain_to_root(old_parent);

        let new_root = new_forest.new_node(None, None);
        new_forest.set_parent(new_node, new_root);
        new_forest.nodes[new_node].branch_length = Some(distance_above_node);
        new_forest.set_parent(old_parent, new_root);
        new_forest.nodes[old_parent].branch_length = Some(edge_len - distance_above_node);

        (new_forest, new_root)
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(s: &'a str) -> Self {
        Self {
            bytes: s.as_bytes(),
            pos: 0,
        }
    }

    fn skip_ws(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek();
        if b.is_some() {
            self.pos += 1;
        }
        b
    }

    fn parse_label(&mut self) -> Option<String> {
        self.skip_ws();
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b'(' | b')' | b',' | b':' | b';') || b.is_ascii_whitespace() {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            None
        } else {
            Some(String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned())
        }
    }

    fn parse_branch_length(&mut self) -> Result<Option<f64>> {
        self.skip_ws();
        if self.peek() != Some(b':') {
            return Ok(None);
        }
        self.bump();
        self.skip_ws();
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap_or("");
        text.parse::<f64>()
            .map(Some)
            .map_err(|_| Error::NewickParse(format!("bad branch length: {text:?}")))
    }

    fn parse_subtree<Info>(&mut self, forest: &mut Forest<Info>) -> Result<NodeId> {
        self.skip_ws();
        let children = if self.peek() == Some(b'(') {
            self.bump();
            let mut kids = Vec::new();
            loop {
                kids.push(self.parse_subtree(forest)?);
                self.skip_ws();
                match self.bump() {
                    Some(b',') => continue,
                    Some(b')') => break,
                    other => {
                        return Err(Error::NewickParse(format!(
                            "expected ',' or ')' in branch list, found {other:?}"
                        )))
                    }
                }
            }
            Some(kids)
        } else {
            None
        };

        let label = self.parse_label();
        let branch_length = self.parse_branch_length()?;
        let id = forest.new_node(label, branch_length);
        if let Some(kids) = children {
            for k in kids {
                forest.set_parent(k, id);
            }
        }
        Ok(id)
    }
}

impl<Info> Forest<Info> {
    /// Parses a newick string, lax grammar: whitespace is skipped
    /// between tokens, unary internal nodes are accepted, labels may be
    /// absent anywhere, and a top-level `;` is required.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NewickParse`] if the input doesn't match the
    /// grammar.
    pub fn parse(s: &str) -> Result<(Self, NodeId)> {
        let mut forest = Self::new();
        let mut parser = Parser::new(s);
        let root = parser.parse_subtree(&mut forest)?;
        parser.skip_ws();
        if parser.bump() != Some(b';') {
            return Err(Error::NewickParse("missing top-level ';'".to_string()));
        }
        parser.skip_ws();
        if parser.pos != parser.bytes.len() {
            return Err(Error::NewickParse("trailing content after ';'".to_string()));
        }
        Ok((forest, root))
    }

    fn serialize_node(&self, id: NodeId, out: &mut String) {
        let rec = &self.nodes[id];
        if !rec.children.is_empty() {
            out.push('(');
            for (i, &c) in rec.children.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                self.serialize_node(c, out);
            }
            out.push(')');
        }
        if let Some(label) = &rec.label {
            out.push_str(label);
        }
        if let Some(len) = rec.branch_length {
            out.push(':');
            out.push_str(&len.to_string());
        }
    }

    /// Serializes the subtree rooted at `root` to newick, terminated with
    /// `;`. Branch length is emitted only when set.
    #[must_use]
    pub fn serialize(&self, root: NodeId) -> String {
        let mut out = String::new();
        self.serialize_node(root, &mut out);
        out.push(';');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_battery() {
        for input in ["(((a,b,(c,))d),e)f;", ";", "f;", "();"] {
            let (forest, root) = Forest::<()>::parse(input).unwrap();
            assert_eq!(forest.serialize(root), input, "round trip failed for {input:?}");
        }
    }

    #[test]
    fn find_child_locates_exact_label() {
        let (forest, root) = Forest::<()>::parse("(a,b,c)r;").unwrap();
        let b = forest.find_child(root, "b").unwrap();
        assert_eq!(forest.label(b), Some("b"));
        assert!(forest.find_child(root, "z").is_none());
    }

    #[test]
    fn reroot_on_branch_above_b() {
        let (forest, root) = Forest::<()>::parse("((a,b)c,d)e;").unwrap();
        let c = forest.find_child(root, "c").unwrap();
        let b = forest.find_child(c, "b").unwrap();
        // give the b branch an explicit length so the split is meaningful
        let mut forest = forest;
        forest.set_branch_length(b, Some(1.0));

        let (rerooted, new_root) = forest.re_root(b, 0.25);
        let kids = rerooted.children(new_root);
        assert_eq!(kids.len(), 2);
        let b_side = kids.iter().copied().find(|&k| rerooted.label(k) == Some("b")).unwrap();
        assert_eq!(rerooted.branch_length(b_side), Some(0.25));
        let other_side = kids.iter().copied().find(|&k| k != b_side).unwrap();
        assert_eq!(rerooted.branch_length(other_side), Some(0.75));
        assert_eq!(rerooted.get_num_nodes(new_root), forest.get_num_nodes(root) + 1);
    }

    #[test]
    fn mrca_within_same_tree() {
        let (forest, root) = Forest::<()>::parse("((a,b)c,d)e;").unwrap();
        let a = forest.find_child(forest.find_child(root, "c").unwrap(), "a").unwrap();
        let d = forest.find_child(root, "d").unwrap();
        assert_eq!(forest.get_mrca(a, d), Some(root));
    }

    #[test]
    fn mrca_across_trees_is_none() {
        let (mut forest, root_a) = Forest::<()>::parse("(a,b)r1;").unwrap();
        let (forest_b, root_b) = Forest::<()>::parse("(c,d)r2;").unwrap();
        // splice forest_b's nodes into the same arena without attaching them
        let mut map = HashMap::new();
        let imported_root = Forest::clone_into(&forest_b, root_b, &mut forest, &mut map);
        assert_eq!(forest.get_mrca(root_a, imported_root), None);
    }

    #[test]
    fn sort_children_by_label() {
        let (mut forest, root) = Forest::<()>::parse("(c,a,b)r;").unwrap();
        forest.sort_children(root, |f, x, y| f.label(x).cmp(&f.label(y)));
        let labels: Vec<_> = forest.children(root).iter().map(|&c| forest.label(c)).collect();
        assert_eq!(labels, vec![Some("a"), Some("b"), Some("c")]);
    }

    #[test]
    fn equals_is_structural_and_ignores_info() {
        let (mut forest, root) = Forest::<i64>::parse("(a,b)r;").unwrap();
        let clone = forest.clone_subtree(root);
        forest.set_info(clone, 42);
        assert!(forest.equals(root, clone));
    }
}
