// Copyright (c) 2024-present, phylocore developers
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Bootstrap partition support scoring.
//!
//! A node's bootstrap support is the fraction of bootstrap-replicate trees
//! that contain a node spanning exactly the same set of leaves (the
//! reconciliation-aware variant additionally requires the matching node to
//! carry the same reconciliation event against the same species).

use super::{PhyloTree, ReconciliationEvent};
use crate::newick::NodeId;

fn leaves_below(tree: &PhyloTree, node: NodeId) -> Option<&[bool]> {
    tree.info(node)
        .and_then(|info| info.index.as_ref())
        .map(|idx| idx.leaves_below.as_slice())
}

fn is_superset(a: &[bool], b: &[bool]) -> bool {
    a.iter().zip(b).all(|(&a_bit, &b_bit)| a_bit || !b_bit)
}

/// Finds a node in the subtree rooted at `node` whose `leaves_below`
/// bitmap is identical to `target`, pruning into children whose bitmap is
/// a superset of `target` (the only ones that could contain a match).
fn find_matching_partition(tree: &PhyloTree, node: NodeId, target: &[bool]) -> Option<NodeId> {
    let bits = leaves_below(tree, node)?;
    if bits == target {
        return Some(node);
    }
    for &child in tree.children(node) {
        if let Some(child_bits) = leaves_below(tree, child) {
            if is_superset(child_bits, target) {
                if let Some(found) = find_matching_partition(tree, child, target) {
                    return Some(found);
                }
            }
        }
    }
    None
}

fn find_matching_reconciled_partition(tree: &PhyloTree, node: NodeId, target: &[bool], event: ReconciliationEvent, species: NodeId) -> Option<NodeId> {
    let bits = leaves_below(tree, node)?;
    if bits == target {
        let matches_recon = tree
            .info(node)
            .and_then(|info| info.recon.as_ref())
            .is_some_and(|recon| recon.event == event && recon.species == species);
        if matches_recon {
            return Some(node);
        }
    }
    for &child in tree.children(node) {
        if let Some(child_bits) = leaves_below(tree, child) {
            if is_superset(child_bits, target) {
                if let Some(found) = find_matching_reconciled_partition(tree, child, target, event, species) {
                    return Some(found);
                }
            }
        }
    }
    None
}

fn update_support_from_tree(tree: &mut PhyloTree, node: NodeId, bootstrap: &PhyloTree, bootstrap_root: NodeId) {
    let children: Vec<NodeId> = tree.children(node).to_vec();
    if !children.is_empty() {
        if let Some(target) = leaves_below(tree, node).map(<[bool]>::to_vec) {
            if find_matching_partition(bootstrap, bootstrap_root, &target).is_some() {
                if let Some(info) = tree.info_mut(node).and_then(|info| info.index.as_mut()) {
                    info.num_bootstraps += 1;
                }
            }
        }
        for child in children {
            update_support_from_tree(tree, child, bootstrap, bootstrap_root);
        }
    }
}

fn update_reconciliation_support_from_tree(tree: &mut PhyloTree, node: NodeId, bootstrap: &PhyloTree, bootstrap_root: NodeId) {
    let children: Vec<NodeId> = tree.children(node).to_vec();
    if !children.is_empty() {
        let target = leaves_below(tree, node).map(<[bool]>::to_vec);
        let recon = tree.info(node).and_then(|info| info.recon.clone());
        if let (Some(target), Some(recon)) = (target, recon) {
            if find_matching_reconciled_partition(bootstrap, bootstrap_root, &target, recon.event, recon.species).is_some() {
                if let Some(info) = tree.info_mut(node).and_then(|info| info.index.as_mut()) {
                    info.num_bootstraps += 1;
                }
            }
        }
        for child in children {
            update_reconciliation_support_from_tree(tree, child, bootstrap, bootstrap_root);
        }
    }
}

fn reset_bootstrap_counts(tree: &mut PhyloTree, node: NodeId) {
    if let Some(info) = tree.info_mut(node).and_then(|info| info.index.as_mut()) {
        info.num_bootstraps = 0;
    }
    let children: Vec<NodeId> = tree.children(node).to_vec();
    for child in children {
        reset_bootstrap_counts(tree, child);
    }
}

fn finalize_bootstrap_support(tree: &mut PhyloTree, node: NodeId, num_bootstraps: usize) {
    if let Some(info) = tree.info_mut(node).and_then(|info| info.index.as_mut()) {
        info.bootstrap_support = if num_bootstraps == 0 {
            0.0
        } else {
            info.num_bootstraps as f64 / num_bootstraps as f64
        };
    }
    let children: Vec<NodeId> = tree.children(node).to_vec();
    for child in children {
        finalize_bootstrap_support(tree, child, num_bootstraps);
    }
}

/// Scores every internal node of `tree` against a batch of bootstrap
/// replicate trees, by leaf-set partition alone.
///
/// `tree` and every tree in `bootstraps` must already carry
/// [`super::IndexedTreeInfo`] (see [`super::add_indexed_tree_info`]).
pub fn score_from_bootstrap(tree: &mut PhyloTree, root: NodeId, bootstraps: &[(PhyloTree, NodeId)]) {
    reset_bootstrap_counts(tree, root);
    for (bootstrap, bootstrap_root) in bootstraps {
        update_support_from_tree(tree, root, bootstrap, *bootstrap_root);
    }
    finalize_bootstrap_support(tree, root, bootstraps.len());
}

/// Scores every internal node of `tree` against a batch of bootstrap
/// replicate trees, requiring both the leaf-set partition and the
/// reconciliation event/species to match.
///
/// `tree` and every tree in `bootstraps` must already carry both
/// [`super::IndexedTreeInfo`] and [`super::ReconciliationInfo`] (see
/// [`super::reconciliation::reconcile_at_most_binary`]).
pub fn score_reconciliation_from_bootstrap(tree: &mut PhyloTree, root: NodeId, bootstraps: &[(PhyloTree, NodeId)]) {
    reset_bootstrap_counts(tree, root);
    for (bootstrap, bootstrap_root) in bootstraps {
        update_reconciliation_support_from_tree(tree, root, bootstrap, *bootstrap_root);
    }
    finalize_bootstrap_support(tree, root, bootstraps.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::newick::Forest;

    fn labeled_tree(newick: &str) -> (PhyloTree, NodeId) {
        let (forest, root) = Forest::<()>::parse(newick).unwrap();
        let mut tree = PhyloTree::new();
        fn copy(src: &Forest<()>, id: NodeId, dst: &mut PhyloTree) -> NodeId {
            let new_id = dst.new_node(src.label(id).map(str::to_string), src.branch_length(id));
            for &c in src.children(id) {
                let new_child = copy(src, c, dst);
                dst.set_parent(new_child, new_id);
            }
            new_id
        }
        let new_root = copy(&forest, root);
        super::super::add_indexed_tree_info(&mut tree, new_root).unwrap();
        (tree, new_root)
    }

    #[test]
    fn matching_replicate_raises_support_to_one() {
        let (mut tree, root) = labeled_tree("((0,1),2);");
        let bootstraps = vec![labeled_tree("((0,1),2);"), labeled_tree("((0,1),2);")];
        score_from_bootstrap(&mut tree, root, &bootstraps);
        let inner = tree.children(root)[0];
        let support = tree.info(inner).unwrap().index.as_ref().unwrap().bootstrap_support;
        assert!((support - 1.0).abs() < 1e-9);
    }

    #[test]
    fn disagreeing_replicate_lowers_support() {
        let (mut tree, root) = labeled_tree("((0,1),2);");
        let bootstraps = vec![labeled_tree("((0,1),2);"), labeled_tree("((0,2),1);")];
        score_from_bootstrap(&mut tree, root, &bootstraps);
        let inner = tree.children(root)[0];
        let support = tree.info(inner).unwrap().index.as_ref().unwrap().bootstrap_support;
        assert!((support - 0.5).abs() < 1e-9);
    }

    #[test]
    fn no_bootstraps_yields_zero_support() {
        let (mut tree, root) = labeled_tree("((0,1),2);");
        score_from_bootstrap(&mut tree, root, &[]);
        let inner = tree.children(root)[0];
        let support = tree.info(inner).unwrap().index.as_ref().unwrap().bootstrap_support;
        assert_eq!(support, 0.0);
    }
}
