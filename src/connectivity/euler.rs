// Copyright (c) 2024-present, phylocore developers
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The Euler-tour forest: every graph vertex is an Euler vertex;
//! every tree edge owns a forward half-edge and a backward half-edge,
//! each embedded as a treap node at its position in the component's
//! Euler tour.
//!
//! `link` makes both endpoints tour-roots (treap rotation) and concats
//! `tour(a) ++ [a->b] ++ tour(b) ++ [b->a]`; `cut` splits the tour just
//! before the forward half-edge and just after the backward half-edge,
//! discards both half-edge nodes, and rejoins what's left of `a`'s side.

use super::treap::Treap;

enum Slot {
    /// A vertex's permanent anchor, present even for an isolated vertex
    /// with no incident tree edges.
    Vertex(usize),
    /// One direction of a tree edge's pair of tour visits.
    HalfEdge,
}

pub struct EulerForest {
    treap: Treap<Slot>,
}

impl EulerForest {
    #[must_use]
    pub fn new() -> Self {
        Self { treap: Treap::new() }
    }

    /// Adds a brand-new, isolated vertex and returns its permanent anchor
    /// id (the handle every later operation on this vertex uses).
    pub fn add_vertex(&mut self, vertex: usize) -> usize {
        self.treap.new_singleton(Slot::Vertex(vertex))
    }

    #[must_use]
    pub fn same_tree(&self, a_anchor: usize, b_anchor: usize) -> bool {
        self.treap.same_tree(a_anchor, b_anchor)
    }

    /// Links the components containing `a_anchor` and `b_anchor` with a
    /// new tree edge, returning the `(forward, backward)` half-edge node
    /// ids, which callers must remember to `cut` later.
    pub fn link(&mut self, a_anchor: usize, b_anchor: usize) -> (usize, usize) {
        let tour_a = self.treap.rotate_to_front(a_anchor);
        let tour_b = self.treap.rotate_to_front(b_anchor);
        let forward = self.treap.new_singleton(Slot::HalfEdge);
        let backward = self.treap.new_singleton(Slot::HalfEdge);

        let mut root = self.treap.merge(Some(tour_a), Some(forward));
        root = self.treap.merge(root, Some(tour_b));
        self.treap.merge(root, Some(backward));

        (forward, backward)
    }

    /// Cuts the tree edge whose visits are `forward`/`backward` (as
    /// returned by the matching [`EulerForest::link`]), splitting one
    /// component into two. Returns the anchor lists of both resulting
    /// pieces so the caller can rebuild its own component index; the
    /// first list is the piece still containing whatever was rooted
    /// before `forward`, the second is the piece that was embedded
    /// between the two half-edges.
    pub fn cut(&mut self, forward: usize, backward: usize) -> (Vec<usize>, Vec<usize>) {
        // [before] [forward] [embedded] [backward] [after]  ->  before ++ after, and embedded on its own.
        let (before, _) = self.treap.split_before(forward);
        let (_, after) = self.treap.split_after(backward);
        let (_, _) = self.treap.split_after(forward);
        let (embedded, _) = self.treap.split_before(backward);

        let remaining_root = self.treap.merge(before, after);
        let remaining = self.vertices_of(remaining_root);
        let embedded_vertices = self.vertices_of(embedded);

        (remaining, embedded_vertices)
    }

    /// Every vertex anchor in the treap rooted at `root` (half-edge
    /// markers are skipped).
    fn vertices_of(&self, root: Option<usize>) -> Vec<usize> {
        self.treap
            .in_order(root)
            .into_iter()
            .filter(|&id| matches!(self.treap.value(id), Slot::Vertex(_)))
            .collect()
    }

    /// The vertex ids currently in the same component as `anchor`.
    #[must_use]
    pub fn component_vertices(&self, anchor: usize) -> Vec<usize> {
        let root = self.treap.root_of(anchor);
        self.vertices_of(Some(root))
    }

    /// The original vertex id a vertex anchor was created with.
    ///
    /// # Panics
    ///
    /// Panics if `anchor` is a half-edge node rather than a vertex anchor.
    #[must_use]
    pub fn vertex_label(&self, anchor: usize) -> usize {
        match self.treap.value(anchor) {
            Slot::Vertex(label) => *label,
            Slot::HalfEdge => panic!("vertex_label called on a half-edge node"),
        }
    }
}

impl Default for EulerForest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_merges_two_components_into_one_tour() {
        let mut forest = EulerForest::new();
        let a = forest.add_vertex(1);
        let b = forest.add_vertex(2);
        assert!(!forest.same_tree(a, b));
        forest.link(a, b);
        assert!(forest.same_tree(a, b));

        let mut members = forest.component_vertices(a);
        members.sort_unstable();
        assert_eq!(members, vec![1, 2]);
    }

    #[test]
    fn cut_restores_two_disjoint_components() {
        let mut forest = EulerForest::new();
        let a = forest.add_vertex(1);
        let b = forest.add_vertex(2);
        let (fwd, bwd) = forest.link(a, b);
        let (left, right) = forest.cut(fwd, bwd);

        assert!(!forest.same_tree(a, b));
        assert_eq!(left.len(), 1);
        assert_eq!(right.len(), 1);
    }

    #[test]
    fn cut_on_a_three_vertex_path_separates_the_right_subtree() {
        let mut forest = EulerForest::new();
        let a = forest.add_vertex(1);
        let b = forest.add_vertex(2);
        let c = forest.add_vertex(3);
        forest.link(a, b);
        let (fwd_bc, bwd_bc) = forest.link(b, c);

        assert!(forest.same_tree(a, c));
        let (left, right) = forest.cut(fwd_bc, bwd_bc);
        assert!(!forest.same_tree(a, c));
        assert_eq!(left.len() + right.len(), 3);
        // The edge (b, c) is the one being cut, so c ends up alone.
        assert_eq!(right.len(), 1);
    }
}
