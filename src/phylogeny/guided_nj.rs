// Copyright (c) 2024-present, phylocore developers
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Species-guided neighbor-joining.
//!
//! Guided NJ differs from plain [`neighbor_joining`](super::neighbor_joining)
//! in three ways: the input is a similarity matrix (not a distance matrix),
//! each pairwise join is penalized by a precomputed species-tree join cost,
//! and every live node carries a running reconciliation against the species
//! tree so the join cost of the *next* merge can be looked up directly.

use super::{add_indexed_tree_info, num_skips_to_ancestor, PhyloTree};
use crate::container::HashMap;
use crate::error::{Error, Result};
use crate::matrix::{Matrix, Shape};
use crate::newick::{Forest, NodeId};

/// Assigns every species-tree node a dense `0..numSpecies` index, visited
/// in stack (LIFO) order, and returns the forward map.
fn index_species<Info>(species_tree: &Forest<Info>, root: NodeId) -> HashMap<NodeId, i64> {
    let mut species_to_index = HashMap::new();
    let mut stack = vec![root];
    let mut next_index = 0i64;
    while let Some(node) = stack.pop() {
        for &child in species_tree.children(node) {
            stack.push(child);
        }
        species_to_index.insert(node, next_index);
        next_index += 1;
    }
    species_to_index
}

fn require_binary<Info>(tree: &Forest<Info>, node: NodeId) -> Result<()> {
    let n = tree.children(node).len();
    if n != 0 && n != 2 {
        return Err(Error::NotBinary);
    }
    for &child in tree.children(node) {
        require_binary(tree, child)?;
    }
    Ok(())
}

/// Computes the join-cost matrix for a species tree: for every ordered
/// pair of species nodes `(i, j)` with
/// MRCA `m`, one duplication cost is added when `i == m || j == m`, plus
/// `cost_per_loss * (skips(i, m) + skips(j, m))`, plus one extra loss when
/// `i` and `j` are ancestor/descendant (but not equal).
///
/// Returns the cost matrix together with the `species -> cost index`
/// mapping it's indexed by.
///
/// # Errors
///
/// Returns [`Error::NotBinary`] if the species tree isn't strictly binary.
pub fn compute_join_costs<Info>(
    species_tree: &Forest<Info>,
    root: NodeId,
    cost_per_dup: f64,
    cost_per_loss: f64,
) -> Result<(Matrix, HashMap<NodeId, i64>)> {
    require_binary(species_tree, root)?;
    let species_to_index = index_species(species_tree, root);
    let num_species = species_to_index.len();
    let index_to_species: HashMap<i64, NodeId> = species_to_index
        .iter()
        .map(|(&node, &idx)| (idx, node))
        .collect();

    let mut costs = Matrix::zeros(num_species, num_species);
    for i in 0..num_species {
        let species_i = *index_to_species.get(&(i as i64)).expect("dense index");
        for j in i..num_species {
            let species_j = *index_to_species.get(&(j as i64)).expect("dense index");
            let mrca = species_tree
                .get_mrca(species_i, species_j)
                .expect("species_i and species_j share one species tree");

            let mut cell = 0.0;
            if species_i == mrca || species_j == mrca {
                cell += cost_per_dup;
            }
            let mut num_losses = num_skips_to_ancestor(species_tree, species_i, mrca)
                + num_skips_to_ancestor(species_tree, species_j, mrca);
            if (species_i == mrca || species_j == mrca) && species_i != species_j {
                num_losses += 1;
            }
            cell += cost_per_loss * num_losses as f64;

            costs.set(i, j, costs.get(i, j) + cell);
            if j != i {
                costs.set(j, i, costs.get(j, i) + cell);
            }
        }
    }
    Ok((costs, species_to_index))
}

/// Builds the `(numSpecies x numSpecies)` table of cost-indices of pairwise
/// MRCAs, for fast reconciliation lookups during the join loop.
#[must_use]
pub fn compute_mrca_matrix<Info>(species_tree: &Forest<Info>, species_to_index: &HashMap<NodeId, i64>) -> Vec<Vec<i64>> {
    let num_species = species_to_index.len();
    let index_to_species: HashMap<i64, NodeId> = species_to_index.iter().map(|(&node, &idx)| (idx, node)).collect();
    let mut mrca_matrix = vec![vec![0i64; num_species]; num_species];
    for i in 0..num_species {
        let species_i = *index_to_species.get(&(i as i64)).expect("dense index");
        for j in i..num_species {
            let species_j = *index_to_species.get(&(j as i64)).expect("dense index");
            let mrca = species_tree
                .get_mrca(species_i, species_j)
                .expect("species_i and species_j share one species tree");
            let mrca_index = *species_to_index.get(&mrca).expect("mrca is a species-tree node");
            mrca_matrix[i][j] = mrca_index;
            mrca_matrix[j][i] = mrca_index;
        }
    }
    mrca_matrix
}

/// Composes a gene-leaf-index -> species-node map and a
/// species-node -> cost-index map into the gene-leaf-index -> cost-index
/// map [`guided_neighbor_joining`] expects.
///
/// # Errors
///
/// Returns [`Error::UnmappedLeaf`] if any leaf `0..num_leaves` has no entry
/// in `leaf_index_to_species`, or if its species has no entry in
/// `species_to_index`.
pub fn build_matrix_index_to_join_cost_index(
    num_leaves: usize,
    leaf_index_to_species: &HashMap<usize, NodeId>,
    species_to_index: &HashMap<NodeId, i64>,
) -> Result<HashMap<usize, i64>> {
    let mut out = HashMap::new();
    for leaf_index in 0..num_leaves {
        let species = leaf_index_to_species
            .get(&leaf_index)
            .ok_or_else(|| Error::UnmappedLeaf(leaf_index.to_string()))?;
        let cost_index = species_to_index
            .get(species)
            .ok_or_else(|| Error::UnmappedLeaf(leaf_index.to_string()))?;
        out.insert(leaf_index, *cost_index);
    }
    Ok(out)
}

fn pair(i: usize, j: usize) -> (usize, usize) {
    if i < j {
        (i, j)
    } else {
        (j, i)
    }
}

/// Neighbor-joining guided by a species tree. `similarity` is a
/// similarity matrix: cell `(i, j)` with `i <
/// j` is the similarity count between leaves `i` and `j`, cell `(j, i)` is
/// the difference count. `join_costs` and `species_mrca_matrix` come from
/// [`compute_join_costs`] and [`compute_mrca_matrix`];
/// `matrix_index_to_join_cost_index` maps each row/column of `similarity`
/// to its initial reconciliation in cost-index space (see
/// [`build_matrix_index_to_join_cost_index`]).
///
/// The join score for live nodes `i, j` is `distance(i,j) +
/// joinCost(recon(i), recon(j)) - r(i) - r(j)`, where `r(v)` is the average
/// distance from `v` to all other live nodes; the reconciliation of a
/// joined node is the MRCA (in cost-index space, via
/// `species_mrca_matrix`) of its children's reconciliations.
///
/// Returns a tree with exactly `2 * num_leaves - 1` nodes and fresh
/// [`super::IndexedTreeInfo`].
///
/// # Errors
///
/// Returns [`Error::ShapeMismatch`] if `similarity` isn't square or has
/// fewer than 3 rows, or [`Error::UnmappedLeaf`] if
/// `matrix_index_to_join_cost_index` is missing an entry for some leaf.
pub fn guided_neighbor_joining(
    similarity: &Matrix,
    join_costs: &Matrix,
    matrix_index_to_join_cost_index: &HashMap<usize, i64>,
    species_mrca_matrix: &[Vec<i64>],
) -> Result<(PhyloTree, crate::newick::NodeId)> {
    let shape = similarity.shape();
    if shape.rows != shape.cols || shape.rows < 3 {
        return Err(Error::ShapeMismatch {
            lhs: shape,
            rhs: Shape::new(3, 3),
        });
    }
    let num_leaves = shape.rows;

    let mut recon = vec![0i64; num_leaves];
    for i in 0..num_leaves {
        recon[i] = *matrix_index_to_join_cost_index
            .get(&i)
            .ok_or_else(|| Error::UnmappedLeaf(i.to_string()))?;
    }

    let mut distances = vec![vec![0.0; num_leaves]; num_leaves];
    let mut confidences = vec![vec![0.0; num_leaves]; num_leaves];
    for i in 0..num_leaves {
        for j in (i + 1)..num_leaves {
            let similarities = similarity.get(i, j);
            let differences = similarity.get(j, i);
            let count = similarities + differences;
            confidences[i][j] = count;
            distances[i][j] = if count != 0.0 { differences / count } else { i64::MAX as f64 };
        }
    }

    let mut r = vec![0.0; num_leaves];
    for i in 0..num_leaves {
        let mut sum = 0.0;
        for j in 0..num_leaves {
            if i == j {
                continue;
            }
            let (a, b) = pair(i, j);
            sum += distances[a][b];
        }
        r[i] = sum / (num_leaves as f64 - 2.0);
    }

    let mut join_distances = vec![vec![0.0; num_leaves]; num_leaves];
    for i in 0..num_leaves {
        for j in (i + 1)..num_leaves {
            let cost = join_costs.get(recon[i] as usize, recon[j] as usize);
            join_distances[i][j] = if confidences[i][j] != 0.0 { cost / confidences[i][j] } else { cost };
        }
    }

    let mut tree = PhyloTree::new();
    let mut nodes: Vec<Option<NodeId>> = (0..num_leaves)
        .map(|i| Some(tree.new_node(Some(i.to_string()), None)))
        .collect();
    // recon[k] becomes -1 once k has been merged away.
    let mut num_joins_left = num_leaves as i64 - 1;

    while num_joins_left > 0 {
        let mut min_dist = f64::MAX;
        let mut mini = usize::MAX;
        let mut minj = usize::MAX;
        for i in 0..num_leaves {
            if recon[i] == -1 {
                continue;
            }
            for j in (i + 1)..num_leaves {
                if recon[j] == -1 {
                    continue;
                }
                let dist = distances[i][j] + join_distances[i][j] - r[i] - r[j];
                if dist < min_dist {
                    min_dist = dist;
                    mini = i;
                    minj = j;
                }
            }
        }
        assert!(mini != usize::MAX && minj != usize::MAX, "at least one live pair remains");

        let dist_mini_minj = distances[mini][minj];
        let mut branch_mini = (dist_mini_minj + r[mini] - r[minj]) / 2.0;
        let mut branch_minj = dist_mini_minj - branch_mini;
        if (branch_mini <= 0.0 || branch_minj <= 0.0) && dist_mini_minj < 0.0 {
            branch_mini = 0.0;
            branch_minj = 0.0;
        } else if branch_mini < 0.0 {
            branch_mini = 0.0;
            branch_minj = dist_mini_minj;
        } else if branch_minj < 0.0 {
            branch_mini = dist_mini_minj;
            branch_minj = 0.0;
        }

        let node_i = nodes[mini].take().expect("mini is live");
        let node_j = nodes[minj].take().expect("minj is live");
        let joined = tree.new_node(None, None);
        tree.set_parent(node_i, joined);
        tree.set_parent(node_j, joined);
        tree.set_branch_length(node_i, Some(branch_mini));
        tree.set_branch_length(node_j, Some(branch_minj));
        nodes[mini] = Some(joined);

        let (recon_i, recon_j) = (recon[mini], recon[minj]);
        recon[mini] = species_mrca_matrix[recon_i as usize][recon_j as usize];
        recon[minj] = -1;

        for k in 0..num_leaves {
            if recon[k] == -1 || k == mini {
                continue;
            }
            let (mi_row, mi_col) = pair(mini, k);
            let (mj_row, mj_col) = pair(minj, k);

            let dist_mini_k = distances[mi_row][mi_col];
            let dist_minj_k = distances[mj_row][mj_col];
            confidences[mi_row][mi_col] = (confidences[mi_row][mi_col] + confidences[mj_row][mj_col]) / 2.0;
            distances[mi_row][mi_col] = (dist_mini_k + dist_minj_k - dist_mini_minj) / 2.0;

            let cost = join_costs.get(recon[mini] as usize, recon[k] as usize);
            join_distances[mi_row][mi_col] = if confidences[mi_row][mi_col] != 0.0 {
                cost / confidences[mi_row][mi_col]
            } else {
                cost
            };

            if num_joins_left > 2 {
                r[k] = (r[k] * (num_joins_left - 1) as f64 - dist_mini_k - dist_minj_k + distances[mi_row][mi_col])
                    / (num_joins_left - 2) as f64;
            } else {
                r[k] = 0.0;
            }
        }

        r[mini] = 0.0;
        if num_joins_left > 2 {
            let mut sum = 0.0;
            for k in 0..num_leaves {
                if recon[k] == -1 || k == mini {
                    continue;
                }
                let (a, b) = pair(mini, k);
                sum += distances[a][b];
            }
            r[mini] = sum / (num_joins_left - 2) as f64;
        }
        num_joins_left -= 1;
    }

    let root = nodes[0].expect("index 0 is never eliminated");
    assert_eq!(tree.get_num_nodes(root), num_leaves * 2 - 1);
    add_indexed_tree_info(&mut tree, root)?;
    Ok((tree, root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::newick::Forest;

    fn caterpillar_species_tree() -> (Forest<()>, NodeId, HashMap<usize, NodeId>) {
        // ((s0,s1),s2) — 3 species, leaves s0, s1, s2.
        let (tree, root) = Forest::<()>::parse("((0,1),2);").unwrap();
        let s0 = tree.find_child(tree.children(root)[0], "0").unwrap();
        let s1 = tree.find_child(tree.children(root)[0], "1").unwrap();
        let s2 = tree.find_child(root, "2").unwrap();
        let mut leaf_to_species = HashMap::new();
        leaf_to_species.insert(0, s0);
        leaf_to_species.insert(1, s1);
        leaf_to_species.insert(2, s2);
        (tree, root, leaf_to_species)
    }

    #[test]
    fn join_costs_are_symmetric_and_zero_cost_on_diagonal() {
        let (species, root, _) = caterpillar_species_tree();
        let (costs, species_to_index) = compute_join_costs(&species, root, 1.0, 0.5).unwrap();
        assert_eq!(species_to_index.len(), 5); // 3 leaves + 2 internal nodes
        for i in 0..5 {
            for j in 0..5 {
                assert!((costs.get(i, j) - costs.get(j, i)).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn guided_nj_with_zero_join_cost_builds_a_fully_resolved_tree() {
        // Similarity matrix for 4 leaves; (i, j) with i<j is the similarity
        // count, (j, i) the difference count.
        let similarity = Matrix::from_row_major(
            4,
            4,
            vec![
                0.0, 10.0, 6.0, 9.0, //
                0.0, 0.0, 4.0, 1.0, //
                0.0, 0.0, 0.0, 7.0, //
                0.0, 0.0, 0.0, 0.0,
            ],
        );
        let zero_costs = Matrix::zeros(4, 4);
        let mut matrix_index_to_join_cost_index = HashMap::new();
        for i in 0..4 {
            matrix_index_to_join_cost_index.insert(i, i as i64);
        }
        let species_mrca_matrix: Vec<Vec<i64>> = (0..4)
            .map(|i| (0..4).map(|j| if i == j { i as i64 } else { 0 }).collect())
            .collect();

        let (guided_tree, guided_root) =
            guided_neighbor_joining(&similarity, &zero_costs, &matrix_index_to_join_cost_index, &species_mrca_matrix)
                .unwrap();
        assert_eq!(guided_tree.get_num_nodes(guided_root), 2 * 4 - 1);
        for leaf_index in 0..4 {
            assert!(super::super::get_leaf_by_index(&guided_tree, guided_root, leaf_index).is_some());
        }
    }

    #[test]
    fn rejects_unmapped_leaf() {
        let zero_costs = Matrix::zeros(2, 2);
        let similarity = Matrix::zeros(3, 3);
        let matrix_index_to_join_cost_index: HashMap<usize, i64> = HashMap::new();
        let species_mrca_matrix = vec![vec![0i64; 2]; 2];
        assert!(guided_neighbor_joining(&similarity, &zero_costs, &matrix_index_to_join_cost_index, &species_mrca_matrix).is_err());
    }
}
