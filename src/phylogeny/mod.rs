// Copyright (c) 2024-present, phylocore developers
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Distance-based phylogenetic inference: neighbor-joining, species-guided
//! neighbor-joining, bootstrap-partition scoring, and gene-tree/
//! species-tree reconciliation with duplication/loss accounting.
//!
//! Every phylogeny-tree node's per-node payload is [`PhylogenyInfo`], the
//! `Info` type parameter of a [`newick::Forest`](crate::newick::Forest)
//! specialized as [`PhyloTree`]. Every node of a tree built by
//! [`neighbor_joining`] or [`guided_nj`] carries an [`IndexedTreeInfo`];
//! nodes produced by [`reconciliation`] additionally carry a
//! [`ReconciliationInfo`].

pub mod bootstrap;
pub mod guided_nj;
pub mod neighbor_joining;
pub mod reconciliation;

use crate::error::{Error, Result};
use crate::newick::{Forest, NodeId};

/// Indexing information attached to every node of a neighbor-joined tree.
#[derive(Debug, Clone)]
pub struct IndexedTreeInfo {
    /// Index into the distance/similarity matrix at a leaf; `-1` on
    /// internal nodes.
    pub matrix_index: i64,
    /// `leaves_below[i]` is set when leaf `i` sits below this node.
    pub leaves_below: Vec<bool>,
    /// The length of `leaves_below` (same at every node of one tree).
    pub total_num_leaves: usize,
    /// Number of bootstrap replicates supporting this node's partition.
    pub num_bootstraps: i64,
    /// `num_bootstraps / total bootstraps`.
    pub bootstrap_support: f64,
}

impl IndexedTreeInfo {
    fn leaf(matrix_index: i64) -> Self {
        Self {
            matrix_index,
            leaves_below: Vec::new(),
            total_num_leaves: 0,
            num_bootstraps: 0,
            bootstrap_support: 0.0,
        }
    }

    fn internal() -> Self {
        Self::leaf(-1)
    }
}

/// The reconciliation event a gene-tree node is tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationEvent {
    /// A leaf, reconciled directly via the caller-supplied leaf map.
    Leaf,
    /// A duplication: this node reconciles to the same species as one of
    /// its children.
    Duplication,
    /// A speciation: both children reconcile to proper descendants of this
    /// node's species.
    Speciation,
}

/// Reconciliation information: which species-tree node a gene-tree node
/// maps to, and the event tagging it.
#[derive(Debug, Clone)]
pub struct ReconciliationInfo {
    /// The species-tree node this gene-tree node reconciles to.
    pub species: NodeId,
    /// Duplication, speciation, or leaf.
    pub event: ReconciliationEvent,
}

/// The `clientData` record attached to nodes of a phylogeny tree: an
/// indexing sub-record (always present once [`add_indexed_tree_info`] has
/// run) and an optional reconciliation sub-record (present once
/// [`reconciliation::reconcile_at_most_binary`] has run).
#[derive(Debug, Clone, Default)]
pub struct PhylogenyInfo {
    /// Matrix index and leaf-set bitmap; `None` before indexing.
    pub index: Option<IndexedTreeInfo>,
    /// Species mapping and event; `None` before reconciliation.
    pub recon: Option<ReconciliationInfo>,
}

/// A newick tree whose nodes carry [`PhylogenyInfo`].
pub type PhyloTree = Forest<PhylogenyInfo>;

/// Adds valid [`IndexedTreeInfo`] to every node of a tree whose leaves are
/// labeled `"0"`, `"1"`, ... and whose internal nodes are unlabeled. Fails
/// if a leaf's label isn't a plain non-negative integer.
///
/// Any reconciliation info already present on a node is preserved; only the
/// indexing sub-record is (re)built.
///
/// # Errors
///
/// Returns [`Error::NewickParse`] if a leaf is unlabeled or its label isn't
/// an integer.
pub fn add_indexed_tree_info(tree: &mut PhyloTree, root: NodeId) -> Result<()> {
    add_indexed_tree_info_r(tree, root)?;
    let total_num_leaves = (tree.get_num_nodes(root) + 1) / 2;
    set_leaves_below(tree, root, total_num_leaves);
    Ok(())
}

fn add_indexed_tree_info_r(tree: &mut PhyloTree, node: NodeId) -> Result<()> {
    let children = tree.children(node).to_vec();
    let index = if children.is_empty() {
        let label = tree
            .label(node)
            .ok_or_else(|| Error::NewickParse("leaf has no label".to_string()))?;
        let matrix_index = label
            .parse::<i64>()
            .map_err(|_| Error::NewickParse(format!("leaf label {label:?} is not an integer index")))?;
        IndexedTreeInfo::leaf(matrix_index)
    } else {
        for &child in &children {
            add_indexed_tree_info_r(tree, child)?;
        }
        IndexedTreeInfo::internal()
    };
    let existing_recon = tree.info(node).and_then(|info| info.recon.clone());
    tree.set_info(
        node,
        PhylogenyInfo {
            index: Some(index),
            recon: existing_recon,
        },
    );
    Ok(())
}

/// (Re)computes `leaves_below` and `total_num_leaves` for `node` and every
/// node below it. The `index` sub-record must already be present (at least
/// `matrix_index` on leaves) — see [`add_indexed_tree_info`].
pub fn set_leaves_below(tree: &mut PhyloTree, node: NodeId, total_num_leaves: usize) {
    let children: Vec<NodeId> = tree.children(node).to_vec();
    for &child in &children {
        set_leaves_below(tree, child, total_num_leaves);
    }

    let mut bits = vec![false; total_num_leaves];
    if children.is_empty() {
        if let Some(idx) = tree.info(node).and_then(|info| info.index.as_ref()) {
            let matrix_index = idx.matrix_index;
            if matrix_index >= 0 && (matrix_index as usize) < total_num_leaves {
                bits[matrix_index as usize] = true;
            }
        }
    } else {
        for &child in &children {
            if let Some(child_bits) = tree
                .info(child)
                .and_then(|info| info.index.as_ref())
                .map(|idx| &idx.leaves_below)
            {
                for (bit, child_bit) in bits.iter_mut().zip(child_bits.iter()) {
                    *bit |= *child_bit;
                }
            }
        }
    }

    if let Some(info) = tree.info_mut(node) {
        if let Some(idx) = info.index.as_mut() {
            idx.leaves_below = bits;
            idx.total_num_leaves = total_num_leaves;
        }
    }
}

/// The leaf node indexed `leaf_index` in the subtree rooted at `node`, or
/// `None` if no leaf below `node` carries that index.
#[must_use]
pub fn get_leaf_by_index(tree: &PhyloTree, node: NodeId, leaf_index: usize) -> Option<NodeId> {
    let idx = tree.info(node)?.index.as_ref()?;
    if idx.matrix_index == leaf_index as i64 {
        return Some(node);
    }
    for &child in tree.children(node) {
        let has_leaf = tree
            .info(child)
            .and_then(|info| info.index.as_ref())
            .and_then(|idx| idx.leaves_below.get(leaf_index).copied())
            .unwrap_or(false);
        if has_leaf {
            return get_leaf_by_index(tree, child, leaf_index);
        }
    }
    None
}

/// The most recent common ancestor of the leaves indexed `leaf1` and
/// `leaf2`, found by descending the `leaves_below` bitmaps rather than
/// walking to the root from both leaves (more efficient than
/// [`Forest::get_mrca`](crate::newick::Forest::get_mrca) when the index is
/// already available).
#[must_use]
pub fn get_mrca_by_leaves(tree: &PhyloTree, node: NodeId, leaf1: usize, leaf2: usize) -> NodeId {
    for &child in tree.children(node) {
        let covers_both = tree
            .info(child)
            .and_then(|info| info.index.as_ref())
            .map(|idx| {
                idx.leaves_below.get(leaf1).copied().unwrap_or(false)
                    && idx.leaves_below.get(leaf2).copied().unwrap_or(false)
            })
            .unwrap_or(false);
        if covers_both {
            return get_mrca_by_leaves(tree, child, leaf1, leaf2);
        }
    }
    node
}

fn distance_to_leaf(tree: &PhyloTree, node: NodeId, leaf_index: usize) -> f64 {
    if tree.children(node).is_empty() {
        return 0.0;
    }
    for &child in tree.children(node) {
        let has_leaf = tree
            .info(child)
            .and_then(|info| info.index.as_ref())
            .and_then(|idx| idx.leaves_below.get(leaf_index).copied())
            .unwrap_or(false);
        if has_leaf {
            return tree.branch_length(child).unwrap_or(0.0) + distance_to_leaf(tree, child, leaf_index);
        }
    }
    0.0
}

/// The patristic distance between the leaves indexed `leaf1` and `leaf2`.
#[must_use]
pub fn distance_between_leaves(tree: &PhyloTree, root: NodeId, leaf1: usize, leaf2: usize) -> f64 {
    let mrca = get_mrca_by_leaves(tree, root, leaf1, leaf2);
    distance_to_leaf(tree, mrca, leaf1) + distance_to_leaf(tree, mrca, leaf2)
}

fn path_length(tree: &PhyloTree, mut node: NodeId, ancestor: NodeId) -> f64 {
    let mut total = 0.0;
    while node != ancestor {
        total += tree.branch_length(node).unwrap_or(0.0);
        node = tree
            .parent(node)
            .expect("ancestor must be a genuine ancestor of node");
    }
    total
}

/// The patristic distance between two arbitrary nodes of the same tree.
///
/// Walks up from both nodes via
/// [`Forest::get_mrca`](crate::newick::Forest::get_mrca) and sums branch
/// lengths along both paths to the common ancestor it finds, rather than
/// re-deriving the relationship from `leaves_below` bitmaps.
///
/// # Panics
///
/// Panics if `node1` and `node2` are not in the same tree.
#[must_use]
pub fn distance_between_nodes(tree: &PhyloTree, node1: NodeId, node2: NodeId) -> f64 {
    if node1 == node2 {
        return 0.0;
    }
    let mrca = tree
        .get_mrca(node1, node2)
        .expect("distance_between_nodes requires both nodes in the same tree");
    path_length(tree, node1, mrca) + path_length(tree, node2, mrca)
}

/// Counts ancestors of `descendant` strictly between it and `ancestor`
/// (exclusive of both) that have more than one child — these are the nodes
/// whose "missing" branch would manifest as a loss during reconciliation.
#[must_use]
pub fn num_skips_to_ancestor<Info>(tree: &Forest<Info>, descendant: NodeId, ancestor: NodeId) -> i64 {
    if descendant == ancestor {
        return 0;
    }
    let mut current = descendant;
    let mut count = 0i64;
    while let Some(parent) = tree.parent(current) {
        if parent == ancestor {
            return count;
        }
        if tree.children(parent).len() != 1 {
            count += 1;
        }
        current = parent;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labeled_tree(newick: &str) -> (PhyloTree, NodeId) {
        let (forest, root) = Forest::<()>::parse(newick).unwrap();
        let mut tree = PhyloTree::new();
        let mut map = std::collections::HashMap::new();
        fn copy(
            src: &Forest<()>,
            id: NodeId,
            dst: &mut PhyloTree,
            map: &mut std::collections::HashMap<NodeId, NodeId>,
        ) -> NodeId {
            let new_id = dst.new_node(src.label(id).map(str::to_string), src.branch_length(id));
            map.insert(id, new_id);
            for &c in src.children(id) {
                let new_child = copy(src, c, dst, map);
                dst.set_parent(new_child, new_id);
            }
            new_id
        }
        let new_root = copy(&forest, root, &mut tree, &mut map);
        (tree, new_root)
    }

    #[test]
    fn indexed_tree_info_marks_leaves_below() {
        let (mut tree, root) = labeled_tree("((0,1),2);");
        add_indexed_tree_info(&mut tree, root).unwrap();
        let root_leaves = &tree.info(root).unwrap().index.as_ref().unwrap().leaves_below;
        assert_eq!(root_leaves, &[true, true, true]);
        let left = tree.children(root)[0];
        let left_leaves = &tree.info(left).unwrap().index.as_ref().unwrap().leaves_below;
        assert_eq!(left_leaves, &[true, true, false]);
    }

    #[test]
    fn get_leaf_by_index_finds_the_right_leaf() {
        let (mut tree, root) = labeled_tree("((0,1),2);");
        add_indexed_tree_info(&mut tree, root).unwrap();
        let leaf1 = get_leaf_by_index(&tree, root, 1).unwrap();
        assert_eq!(tree.label(leaf1), Some("1"));
    }

    #[test]
    fn distance_between_leaves_sums_branch_lengths() {
        let (mut tree, root) = labeled_tree("((0:1,1:2):3,2:4);");
        add_indexed_tree_info(&mut tree, root).unwrap();
        assert!((distance_between_leaves(&tree, root, 0, 1) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_non_integer_leaf_labels() {
        let (mut tree, root) = labeled_tree("(a,b);");
        assert!(add_indexed_tree_info(&mut tree, root).is_err());
    }
}
