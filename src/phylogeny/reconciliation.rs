// Copyright (c) 2024-present, phylocore developers
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Gene-tree/species-tree reconciliation.
//!
//! A gene tree is reconciled against a species tree by mapping every leaf
//! to the species it was sampled from and every internal node to the most
//! recent common ancestor (in the species tree) of its children's species.
//! A node is tagged [`Duplication`](super::ReconciliationEvent::Duplication)
//! when it shares its species with one of its children, and
//! [`Speciation`](super::ReconciliationEvent::Speciation) otherwise.
//! Reconciliation is "at most binary": the gene tree may have nodes with
//! any number of children, though the species tree it reconciles against
//! must be strictly binary.

use super::{PhyloTree, ReconciliationEvent, ReconciliationInfo};
use crate::container::HashMap;
use crate::error::{Error, Result};
use crate::newick::{Forest, NodeId};

/// Reconciles every node of the subtree rooted at `node` against
/// `species_tree`, writing a [`ReconciliationInfo`] into each node's
/// [`super::PhylogenyInfo`] (any existing [`super::IndexedTreeInfo`] is
/// preserved).
///
/// # Errors
///
/// Returns [`Error::UnmappedLeaf`] if a gene-tree leaf has no entry in
/// `leaf_to_species`.
pub fn reconcile_at_most_binary<Info>(
    gene_tree: &mut PhyloTree,
    node: NodeId,
    species_tree: &Forest<Info>,
    leaf_to_species: &HashMap<NodeId, NodeId>,
) -> Result<()> {
    let children: Vec<NodeId> = gene_tree.children(node).to_vec();
    let species = if children.is_empty() {
        *leaf_to_species
            .get(&node)
            .ok_or_else(|| Error::UnmappedLeaf(gene_tree.label(node).unwrap_or("<unlabeled>").to_string()))?
    } else {
        for &child in &children {
            reconcile_at_most_binary(gene_tree, child, species_tree, leaf_to_species)?;
        }
        let mut species_of = children.iter().map(|&child| {
            gene_tree
                .info(child)
                .and_then(|info| info.recon.as_ref())
                .expect("child was just reconciled")
                .species
        });
        let mut mrca = species_of.next().expect("internal node has at least one child");
        for next in children.iter().skip(1) {
            let next_species = gene_tree
                .info(*next)
                .and_then(|info| info.recon.as_ref())
                .expect("child was just reconciled")
                .species;
            mrca = species_tree
                .get_mrca(mrca, next_species)
                .expect("gene tree's species mappings must all belong to one species tree");
        }
        mrca
    };

    let event = if children.is_empty() {
        ReconciliationEvent::Leaf
    } else if children.iter().any(|&child| {
        gene_tree
            .info(child)
            .and_then(|info| info.recon.as_ref())
            .is_some_and(|recon| recon.species == species)
    }) {
        ReconciliationEvent::Duplication
    } else {
        ReconciliationEvent::Speciation
    };

    let existing_index = gene_tree.info(node).and_then(|info| info.index.clone());
    gene_tree.set_info(
        node,
        super::PhylogenyInfo {
            index: existing_index,
            recon: Some(ReconciliationInfo { species, event }),
        },
    );
    Ok(())
}

/// Counts duplications and losses implied by an already-reconciled gene
/// tree.
///
/// One duplication is counted per node tagged
/// [`Duplication`](ReconciliationEvent::Duplication). Losses are counted
/// per gene-tree edge, as the number of species-tree branch points
/// between a child's species and its parent's species (see
/// [`super::num_skips_to_ancestor`]) that the gene lineage doesn't visit,
/// plus one extra loss at a duplication node whose two children
/// reconcile to different species (the copy that didn't stay in the
/// duplicating species still had to get lost somewhere on the way to the
/// other child's species).
///
/// # Panics
///
/// Panics if any node in the subtree lacks reconciliation info (run
/// [`reconcile_at_most_binary`] first).
#[must_use]
pub fn reconciliation_cost_at_most_binary<Info>(gene_tree: &PhyloTree, node: NodeId, species_tree: &Forest<Info>) -> (i64, i64) {
    let recon = gene_tree.info(node).and_then(|info| info.recon.as_ref()).expect("node must be reconciled");
    let children = gene_tree.children(node);
    let mut num_dups = i64::from(recon.event == ReconciliationEvent::Duplication);
    let mut num_losses = 0i64;
    let mut child_species = Vec::with_capacity(children.len());
    for &child in children {
        let child_recon = gene_tree.info(child).and_then(|info| info.recon.as_ref()).expect("child must be reconciled");
        num_losses += super::num_skips_to_ancestor(species_tree, child_recon.species, recon.species);
        child_species.push(child_recon.species);
        let (child_dups, child_losses) = reconciliation_cost_at_most_binary(gene_tree, child, species_tree);
        num_dups += child_dups;
        num_losses += child_losses;
    }
    if recon.event == ReconciliationEvent::Duplication {
        if let [a, b] = child_species[..] {
            if a != b {
                num_losses += 1;
            }
        }
    }
    (num_dups, num_losses)
}

fn collect_nodes(tree: &PhyloTree, node: NodeId, out: &mut Vec<NodeId>) {
    out.push(node);
    for &child in tree.children(node) {
        collect_nodes(tree, child, out);
    }
}

/// Tries rerooting the gene tree at every edge and reconciling fresh
/// against `species_tree`, keeping whichever rerooting minimizes
/// `num_dups * cost_per_dup + num_losses * cost_per_loss`.
///
/// Never mutates the input: each candidate rerooting is reconciled on its
/// own fresh tree, and only the winning `(tree, root, cost)` triple is
/// returned.
///
/// # Errors
///
/// Returns [`Error::UnmappedLeaf`] if a leaf has no entry in
/// `leaf_to_species`.
pub fn root_and_reconcile_at_most_binary<Info>(
    gene_tree: &PhyloTree,
    gene_root: NodeId,
    species_tree: &Forest<Info>,
    leaf_to_species: &HashMap<NodeId, NodeId>,
    cost_per_dup: f64,
    cost_per_loss: f64,
) -> Result<(PhyloTree, NodeId, f64)> {
    let mut candidates = Vec::new();
    collect_nodes(gene_tree, gene_root, &mut candidates);

    let mut best: Option<(PhyloTree, NodeId, f64)> = None;
    for candidate in candidates {
        if gene_tree.parent(candidate).is_none() {
            continue;
        }
        let half = gene_tree.branch_length(candidate).unwrap_or(0.0) / 2.0;
        let (mut rerooted, new_root) = gene_tree.re_root(candidate, half);
        reconcile_at_most_binary(&mut rerooted, new_root, species_tree, leaf_to_species)?;
        let (num_dups, num_losses) = reconciliation_cost_at_most_binary(&rerooted, new_root, species_tree);
        let cost = num_dups as f64 * cost_per_dup + num_losses as f64 * cost_per_loss;
        if best.as_ref().is_none_or(|(_, _, best_cost)| cost < *best_cost) {
            best = Some((rerooted, new_root, cost));
        }
    }

    match best {
        Some(result) => Ok(result),
        None => {
            // Single-node gene tree: no edge to reroot on, reconcile as-is.
            let mut tree = gene_tree.clone();
            reconcile_at_most_binary(&mut tree, gene_root, species_tree, leaf_to_species)?;
            let (num_dups, num_losses) = reconciliation_cost_at_most_binary(&tree, gene_root, species_tree);
            let cost = num_dups as f64 * cost_per_dup + num_losses as f64 * cost_per_loss;
            Ok((tree, gene_root, cost))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::newick::Forest;

    fn copy_into(src: &Forest<()>, id: NodeId, dst: &mut PhyloTree) -> NodeId {
        let new_id = dst.new_node(src.label(id).map(str::to_string), src.branch_length(id));
        for &c in src.children(id) {
            let new_child = copy_into(src, c, dst);
            dst.set_parent(new_child, new_id);
        }
        new_id
    }

    fn gene_tree(newick: &str) -> (PhyloTree, NodeId) {
        let (forest, root) = Forest::<()>::parse(newick).unwrap();
        let mut tree = PhyloTree::new();
        let new_root = copy_into(&forest, root, &mut tree);
        (tree, new_root)
    }

    #[test]
    fn matching_topology_reconciles_to_all_speciations() {
        let (species, species_root) = Forest::<()>::parse("((a,b),c);").unwrap();
        let a = species.find_child(species.children(species_root)[0], "a").unwrap();
        let b = species.find_child(species.children(species_root)[0], "b").unwrap();
        let c = species.find_child(species_root, "c").unwrap();

        let (mut gene, gene_root) = gene_tree("((x,y),z);");
        let x = gene.find_child(gene.children(gene_root)[0], "x").unwrap();
        let y = gene.find_child(gene.children(gene_root)[0], "y").unwrap();
        let z = gene.find_child(gene_root, "z").unwrap();
        let mut leaf_to_species = HashMap::new();
        leaf_to_species.insert(x, a);
        leaf_to_species.insert(y, b);
        leaf_to_species.insert(z, c);

        reconcile_at_most_binary(&mut gene, gene_root, &species, &leaf_to_species).unwrap();
        let (num_dups, num_losses) = reconciliation_cost_at_most_binary(&gene, gene_root, &species);
        assert_eq!(num_dups, 0);
        assert_eq!(num_losses, 0);
        assert_eq!(
            gene.info(gene_root).unwrap().recon.as_ref().unwrap().event,
            ReconciliationEvent::Speciation
        );
    }

    #[test]
    fn duplication_within_one_species_is_detected() {
        let (species, species_root) = Forest::<()>::parse("(a,b);").unwrap();
        let a = species.find_child(species_root, "a").unwrap();
        let b = species.find_child(species_root, "b").unwrap();

        // Two gene copies in species a, one in species b: ((x1,x2),y).
        let (mut gene, gene_root) = gene_tree("((x1,x2),y);");
        let x1 = gene.find_child(gene.children(gene_root)[0], "x1").unwrap();
        let x2 = gene.find_child(gene.children(gene_root)[0], "x2").unwrap();
        let y = gene.find_child(gene_root, "y").unwrap();
        let mut leaf_to_species = HashMap::new();
        leaf_to_species.insert(x1, a);
        leaf_to_species.insert(x2, a);
        leaf_to_species.insert(y, b);

        reconcile_at_most_binary(&mut gene, gene_root, &species, &leaf_to_species).unwrap();
        let dup_node = gene.children(gene_root)[0];
        assert_eq!(
            gene.info(dup_node).unwrap().recon.as_ref().unwrap().event,
            ReconciliationEvent::Duplication
        );
        let (num_dups, _) = reconciliation_cost_at_most_binary(&gene, gene_root, &species);
        assert_eq!(num_dups, 1);
    }

    #[test]
    fn unmapped_leaf_is_rejected() {
        let (species, _species_root) = Forest::<()>::parse("(a,b);").unwrap();
        let (mut gene, gene_root) = gene_tree("(x,y);");
        let leaf_to_species: HashMap<NodeId, NodeId> = HashMap::new();
        assert!(reconcile_at_most_binary(&mut gene, gene_root, &species, &leaf_to_species).is_err());
    }
}
