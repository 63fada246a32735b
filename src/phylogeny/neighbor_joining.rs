// Copyright (c) 2024-present, phylocore developers
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Standard distance-based neighbor-joining.
//!
//! Implements the Saitou-Nei Q-criterion join loop directly, with the
//! usual edge-length correction: a negative computed child length is
//! clamped to zero and the deficit transferred to its sibling, preserving
//! the pair distance.

use super::{add_indexed_tree_info, PhyloTree};
use crate::error::{Error, Result};
use crate::matrix::{Matrix, Shape};
use crate::newick::NodeId;

fn read(distances: &Matrix, i: usize, j: usize) -> f64 {
    if i >= j {
        distances.get(i, j)
    } else {
        distances.get(j, i)
    }
}

/// Runs neighbor-joining over a symmetric distance matrix (only the strict
/// lower triangle, `i > j`, is read) and returns the resulting tree, rooted
/// halfway along the longest branch to an outgroup if `outgroups` is
/// non-empty, otherwise halfway along the tree's single longest branch.
///
/// Leaves are labeled `"0"` through `"{k-1}"` matching their row/column in
/// `distances`; internal nodes are unlabeled.
///
/// # Errors
///
/// Returns [`Error::ShapeMismatch`] if `distances` isn't square or has
/// fewer than 3 rows.
pub fn neighbor_join(distances: &Matrix, outgroups: &[usize]) -> Result<(PhyloTree, NodeId)> {
    let shape = distances.shape();
    if shape.rows != shape.cols || shape.rows < 3 {
        return Err(Error::ShapeMismatch {
            lhs: shape,
            rhs: Shape::new(3, 3),
        });
    }
    let k = shape.rows;

    let mut tree = PhyloTree::new();
    let mut cluster_node: Vec<Option<NodeId>> = (0..k)
        .map(|i| Some(tree.new_node(Some(i.to_string()), None)))
        .collect();
    let mut active: Vec<bool> = vec![true; k];
    let mut n_active = k;

    // Working distance matrix, read/written only at [min(i,j)][max(i,j)].
    let mut d = vec![vec![0.0; k]; k];
    for i in 0..k {
        for j in 0..k {
            d[i][j] = read(distances, i, j);
        }
    }

    // Joins run until only a trifurcation remains (3 active clusters, never
    // 1): that leaves the result unrooted at 2k-2 nodes, so that
    // `reroot_for_output`'s single new root node below lands on exactly
    // 2k-1, matching a fully resolved rooted binary tree.
    while n_active > 3 {
        let active_indices: Vec<usize> = (0..k).filter(|&i| active[i]).collect();

        // r[x] = sum of distances from x to every other active node.
        let mut r = vec![0.0; k];
        for &i in &active_indices {
            r[i] = active_indices.iter().filter(|&&j| j != i).map(|&j| d[i.min(j)][i.max(j)]).sum();
        }

        let mut best: Option<(f64, usize, usize)> = None;
        for (pi, &i) in active_indices.iter().enumerate() {
            for &j in &active_indices[pi + 1..] {
                let q = (n_active as f64 - 2.0) * d[i][j] - r[i] - r[j];
                if best.is_none_or(|(best_q, _, _)| q < best_q) {
                    best = Some((q, i, j));
                }
            }
        }
        let (_, mini, minj) = best.expect("at least one active pair when n_active > 3");

        let dist_ij = d[mini][minj];
        let denom = n_active as f64 - 2.0;
        let mut bi = 0.5 * dist_ij + (r[mini] - r[minj]) / (2.0 * denom);
        let mut bj = dist_ij - bi;
        // Edge-length correction: clamp a negative child length to 0 and
        // transfer the deficit to the sibling, preserving the pair distance.
        if bi < 0.0 {
            bi = 0.0;
            bj = dist_ij;
        } else if bj < 0.0 {
            bj = 0.0;
            bi = dist_ij;
        }

        let node_i = cluster_node[mini].take().expect("mini is active");
        let node_j = cluster_node[minj].take().expect("minj is active");
        let joined = tree.new_node(None, None);
        tree.set_parent(node_i, joined);
        tree.set_parent(node_j, joined);
        tree.set_branch_length(node_i, Some(bi));
        tree.set_branch_length(node_j, Some(bj));

        for &k2 in &active_indices {
            if k2 == mini || k2 == minj {
                continue;
            }
            let dik = d[mini.min(k2)][mini.max(k2)];
            let djk = d[minj.min(k2)][minj.max(k2)];
            let updated = 0.5 * (dik + djk - dist_ij);
            d[mini.min(k2)][mini.max(k2)] = updated;
        }

        cluster_node[mini] = Some(joined);
        cluster_node[minj] = None;
        active[minj] = false;
        n_active -= 1;
    }

    // Resolve the final trifurcation with the standard three-point
    // formula instead of forcing one more binary join.
    let remaining: Vec<usize> = (0..k).filter(|&i| active[i]).collect();
    let (i0, i1, i2) = (remaining[0], remaining[1], remaining[2]);
    let d01 = d[i0.min(i1)][i0.max(i1)];
    let d02 = d[i0.min(i2)][i0.max(i2)];
    let d12 = d[i1.min(i2)][i1.max(i2)];
    let b0 = (0.5 * (d01 + d02 - d12)).max(0.0);
    let b1 = (0.5 * (d01 + d12 - d02)).max(0.0);
    let b2 = (0.5 * (d02 + d12 - d01)).max(0.0);

    let node0 = cluster_node[i0].take().expect("i0 is active");
    let node1 = cluster_node[i1].take().expect("i1 is active");
    let node2 = cluster_node[i2].take().expect("i2 is active");
    let joined = tree.new_node(None, None);
    for (child, len) in [(node0, b0), (node1, b1), (node2, b2)] {
        tree.set_parent(child, joined);
        tree.set_branch_length(child, Some(len));
    }
    cluster_node[i0] = Some(joined);

    let root = cluster_node[0].expect("index 0 is never eliminated");
    add_indexed_tree_info(&mut tree, root)?;

    let (tree, root) = reroot_for_output(tree, root, outgroups)?;
    Ok((tree, root))
}

fn reroot_for_output(mut tree: PhyloTree, root: NodeId, outgroups: &[usize]) -> Result<(PhyloTree, NodeId)> {
    let reroot_node = if outgroups.is_empty() {
        longest_branch_node(&tree, root)
    } else {
        let mut best: Option<(f64, NodeId)> = None;
        for &leaf_index in outgroups {
            let Some(leaf) = super::get_leaf_by_index(&tree, root, leaf_index) else {
                continue;
            };
            let len = tree.branch_length(leaf).unwrap_or(0.0);
            if best.is_none_or(|(best_len, _)| len > best_len) {
                best = Some((len, leaf));
            }
        }
        best.map(|(_, node)| node)
    };

    let Some(reroot_node) = reroot_node else {
        return Ok((tree, root));
    };
    let half = tree.branch_length(reroot_node).unwrap_or(0.0) / 2.0;
    let (mut rerooted, new_root) = tree.re_root(reroot_node, half);
    add_indexed_tree_info(&mut rerooted, new_root)?;
    Ok((rerooted, new_root))
}

fn longest_branch_node(tree: &PhyloTree, root: NodeId) -> Option<NodeId> {
    fn walk(tree: &PhyloTree, node: NodeId, best: &mut Option<(f64, NodeId)>) {
        if let Some(len) = tree.branch_length(node) {
            if best.is_none_or(|(best_len, _)| len > best_len) {
                *best = Some((len, node));
            }
        }
        for &child in tree.children(node) {
            walk(tree, child, best);
        }
    }
    let mut best = None;
    walk(tree, root, &mut best);
    best.map(|(_, node)| node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_too_few_leaves() {
        let m = Matrix::zeros(2, 2);
        assert!(neighbor_join(&m, &[]).is_err());
    }

    #[test]
    fn four_leaf_topology_respects_known_distances() {
        // D[0][3] < D[0][2] < D[0][1] (strict lower triangle only).
        let d = Matrix::from_row_major(
            4,
            4,
            vec![
                0.0, 0.0, 0.0, 0.0, //
                9.0, 0.0, 0.0, 0.0, //
                3.0, 6.0, 0.0, 0.0, //
                0.1, 8.9, 3.0, 0.0,
            ],
        );
        let (tree, root) = neighbor_join(&d, &[]).unwrap();
        let dist = |a, b| super::super::distance_between_leaves(&tree, root, a, b);
        assert!(dist(0, 3) < dist(0, 2));
        assert!(dist(0, 2) < dist(0, 1));
    }

    #[test]
    fn output_tree_has_expected_node_count() {
        let d = Matrix::from_row_major(
            5,
            5,
            vec![
                0.0, 0.0, 0.0, 0.0, 0.0, //
                5.0, 0.0, 0.0, 0.0, 0.0, //
                9.0, 10.0, 0.0, 0.0, 0.0, //
                9.0, 10.0, 8.0, 0.0, 0.0, //
                8.0, 9.0, 7.0, 3.0, 0.0,
            ],
        );
        let (tree, root) = neighbor_join(&d, &[]).unwrap();
        assert_eq!(tree.get_num_nodes(root), 2 * 5 - 1);
    }

    #[test]
    fn outgroup_rooting_places_outgroup_as_a_direct_child_of_the_root() {
        let d = Matrix::from_row_major(
            4,
            4,
            vec![
                0.0, 0.0, 0.0, 0.0, //
                9.0, 0.0, 0.0, 0.0, //
                3.0, 6.0, 0.0, 0.0, //
                0.1, 8.9, 3.0, 0.0,
            ],
        );
        let (tree, root) = neighbor_join(&d, &[1]).unwrap();
        let outgroup_leaf = super::super::get_leaf_by_index(&tree, root, 1).unwrap();
        assert_eq!(tree.parent(outgroup_leaf), Some(root));
    }
}
