// Copyright (c) 2024-present, phylocore developers
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Dynamic connectivity over an undirected multigraph: `construct`,
//! `addNode`, `addEdge`, `removeEdge`, `removeNode`, `hasEdge`,
//! `connected`, `getConnectedComponent`, `getNComponents`, and iterators
//! over components and over a component's member nodes. Four callback
//! slots let subscribers observe component creation, merge, cleave and
//! deletion, invoked synchronously from the operation that causes them.
//!
//! [`EulerForest`] answers `connected`/`link`/`cut` in expected-logarithmic
//! time via the treap underneath it; [`UnionFind`] is a cheaper companion
//! index kept in lockstep so "every member of this component" doesn't
//! require walking the Euler tour. Non-tree edges live in [`EdgeContainer`],
//! promoted to tree edges only when a cut would otherwise disconnect.

mod edge_container;
mod euler;
#[cfg(test)]
mod naive;
mod treap;
mod union_find;

use std::hash::Hash;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Error, Result};
use edge_container::EdgeContainer;
use euler::EulerForest;
use union_find::UnionFind;

/// An opaque handle to a connected component, valid until the next
/// operation that merges, cleaves or deletes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(usize);

type CreationCb = Box<dyn FnMut(ComponentId)>;
type MergeCb = Box<dyn FnMut(ComponentId, ComponentId)>;
type CleaveCb<N> = Box<dyn FnMut(ComponentId, ComponentId, &FxHashSet<N>)>;
type DeletionCb = Box<dyn FnMut(ComponentId)>;

/// A dynamic-connectivity engine: tracks connected components of an
/// undirected multigraph as nodes and edges come and go, in expected
/// `O(log n)` time per operation.
///
/// Single-threaded; callers must externally serialize access to a shared
/// instance. Callbacks fire synchronously, before the triggering method
/// returns, and must not call back into this structure.
pub struct Connectivity<N: Eq + Hash + Clone> {
    index_of: FxHashMap<N, usize>,
    external: Vec<N>,
    anchor_of: Vec<usize>,
    forest: EulerForest,
    edges: EdgeContainer,
    tree_edges: FxHashMap<(usize, usize), (usize, usize)>,
    uf: UnionFind,
    component_roots: FxHashSet<usize>,
    on_creation: Option<CreationCb>,
    on_merge: Option<MergeCb>,
    on_cleave: Option<CleaveCb<N>>,
    on_deletion: Option<DeletionCb>,
}

fn edge_key(a: usize, b: usize) -> (usize, usize) {
    if a <= b { (a, b) } else { (b, a) }
}

impl<N: Eq + Hash + Clone> Connectivity<N> {
    #[must_use]
    pub fn construct() -> Self {
        Self {
            index_of: FxHashMap::default(),
            external: Vec::new(),
            anchor_of: Vec::new(),
            forest: EulerForest::new(),
            edges: EdgeContainer::new(),
            tree_edges: FxHashMap::default(),
            uf: UnionFind::new(),
            component_roots: FxHashSet::default(),
            on_creation: None,
            on_merge: None,
            on_cleave: None,
            on_deletion: None,
        }
    }

    pub fn set_creation_callback(&mut self, callback: impl FnMut(ComponentId) + 'static) {
        self.on_creation = Some(Box::new(callback));
    }

    pub fn set_merge_callback(&mut self, callback: impl FnMut(ComponentId, ComponentId) + 'static) {
        self.on_merge = Some(Box::new(callback));
    }

    pub fn set_cleave_callback(
        &mut self,
        callback: impl FnMut(ComponentId, ComponentId, &FxHashSet<N>) + 'static,
    ) {
        self.on_cleave = Some(Box::new(callback));
    }

    pub fn set_deletion_callback(&mut self, callback: impl FnMut(ComponentId) + 'static) {
        self.on_deletion = Some(Box::new(callback));
    }

    fn vertex_of(&self, node: &N) -> Result<usize> {
        self.index_of
            .get(node)
            .copied()
            .ok_or_else(|| Error::ConnectivityPrecondition("node not present".to_string()))
    }

    /// Adds a new isolated node, firing the creation callback for its new
    /// singleton component.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectivityPrecondition`] if `node` was already
    /// added.
    pub fn add_node(&mut self, node: N) -> Result<()> {
        if self.index_of.contains_key(&node) {
            return Err(Error::ConnectivityPrecondition("node already present".to_string()));
        }
        let vertex = self.external.len();
        let anchor = self.forest.add_vertex(vertex);
        self.anchor_of.push(anchor);
        self.index_of.insert(node.clone(), vertex);
        self.external.push(node);
        self.uf.push_singleton(vertex);
        self.component_roots.insert(vertex);

        if let Some(cb) = &mut self.on_creation {
            cb(ComponentId(vertex));
        }
        Ok(())
    }

    /// `true` if `a` and `b` are in the same connected component.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectivityPrecondition`] if either node is
    /// missing.
    pub fn connected(&self, a: &N, b: &N) -> Result<bool> {
        let va = self.vertex_of(a)?;
        let vb = self.vertex_of(b)?;
        Ok(self.forest.same_tree(self.anchor_of[va], self.anchor_of[vb]))
    }

    /// `true` if there is at least one edge, tree or non-tree, between `a`
    /// and `b`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectivityPrecondition`] if either node is
    /// missing.
    pub fn has_edge(&self, a: &N, b: &N) -> Result<bool> {
        let va = self.vertex_of(a)?;
        let vb = self.vertex_of(b)?;
        Ok(self.tree_edges.contains_key(&edge_key(va, vb)) || self.edges.has_edge(va, vb))
    }

    /// Adds an edge between `a` and `b`. If they're already connected the
    /// edge is recorded as a non-tree edge; otherwise it becomes a tree
    /// edge and merges their components, firing the merge callback
    /// (the first, dissolving component, then the surviving one).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectivityPrecondition`] if either node is
    /// missing.
    pub fn add_edge(&mut self, a: &N, b: &N) -> Result<()> {
        let va = self.vertex_of(a)?;
        let vb = self.vertex_of(b)?;
        let anchor_a = self.anchor_of[va];
        let anchor_b = self.anchor_of[vb];

        if self.forest.same_tree(anchor_a, anchor_b) {
            self.edges.add_edge(va, vb);
            return Ok(());
        }

        let (fwd, bwd) = self.forest.link(anchor_a, anchor_b);
        self.tree_edges.insert(edge_key(va, vb), (fwd, bwd));

        let ra = self.uf.find(va);
        let rb = self.uf.find(vb);
        let survivor = self.uf.union(va, vb);
        let dissolved = if survivor == ra { rb } else { ra };
        self.component_roots.remove(&dissolved);

        if let Some(cb) = &mut self.on_merge {
            cb(ComponentId(dissolved), ComponentId(survivor));
        }
        Ok(())
    }

    /// Removes the edge between `a` and `b`. If it was the graph's only
    /// tree edge connecting their two sides, the component cleaves in two
    /// unless some non-tree edge can be promoted to reconnect them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectivityPrecondition`] if either node is
    /// missing, or if there is no edge between them.
    pub fn remove_edge(&mut self, a: &N, b: &N) -> Result<()> {
        let va = self.vertex_of(a)?;
        let vb = self.vertex_of(b)?;
        let key = edge_key(va, vb);

        if let Some((fwd, bwd)) = self.tree_edges.remove(&key) {
            self.cut_tree_edge(fwd, bwd);
            Ok(())
        } else if self.edges.remove_edge(va, vb) {
            Ok(())
        } else {
            Err(Error::ConnectivityPrecondition("no edge between the given nodes".to_string()))
        }
    }

    /// Splits the tree edge `(fwd, bwd)`, then either promotes a non-tree
    /// edge to reconnect the two halves, or commits to the split and
    /// fires the cleave callback.
    fn cut_tree_edge(&mut self, fwd: usize, bwd: usize) {
        let (remaining_anchors, embedded_anchors) = self.forest.cut(fwd, bwd);
        let remaining: Vec<usize> =
            remaining_anchors.iter().map(|&a| self.forest.vertex_label(a)).collect();
        let embedded: Vec<usize> =
            embedded_anchors.iter().map(|&a| self.forest.vertex_label(a)).collect();

        let (small, big) = if embedded.len() <= remaining.len() {
            (&embedded, &remaining)
        } else {
            (&remaining, &embedded)
        };
        let big_set: FxHashSet<usize> = big.iter().copied().collect();

        let mut replacement = None;
        'scan: for &v in small {
            for u in self.edges.incident(v) {
                if big_set.contains(&u) {
                    replacement = Some((v, u));
                    break 'scan;
                }
            }
        }

        if let Some((v, u)) = replacement {
            self.edges.remove_edge(v, u);
            let anchor_v = self.anchor_of[v];
            let anchor_u = self.anchor_of[u];
            let (fwd2, bwd2) = self.forest.link(anchor_v, anchor_u);
            self.tree_edges.insert(edge_key(v, u), (fwd2, bwd2));
            return;
        }

        let old_root = self.uf.find(remaining[0]);
        let continuing = self.uf.rebuild(&remaining);
        let new_component = self.uf.rebuild(&embedded);
        self.component_roots.remove(&old_root);
        self.component_roots.insert(continuing);
        self.component_roots.insert(new_component);

        if let Some(cb) = &mut self.on_cleave {
            let cloven: FxHashSet<N> = embedded.iter().map(|&v| self.external[v].clone()).collect();
            cb(ComponentId(continuing), ComponentId(new_component), &cloven);
        }
    }

    /// Removes `node` and every edge incident to it. Fires the deletion
    /// callback once `node`'s component is empty (i.e. `node` had no
    /// surviving siblings).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectivityPrecondition`] if `node` is missing.
    pub fn remove_node(&mut self, node: &N) -> Result<()> {
        let v = self.vertex_of(node)?;

        // Non-tree edges incident to `v` are dropped first: otherwise a
        // tree-edge cut below could "promote" one of them and reconnect
        // `v` to the rest of the graph instead of isolating it.
        self.edges.remove_vertex(v);

        let incident_tree_edges: Vec<((usize, usize), (usize, usize))> = self
            .tree_edges
            .iter()
            .filter(|(key, _)| key.0 == v || key.1 == v)
            .map(|(key, half_edges)| (*key, *half_edges))
            .collect();
        for (key, (fwd, bwd)) in incident_tree_edges {
            self.tree_edges.remove(&key);
            self.cut_tree_edge(fwd, bwd);
        }

        let root = self.uf.find(v);
        self.component_roots.remove(&root);
        self.index_of.remove(node);

        if let Some(cb) = &mut self.on_deletion {
            cb(ComponentId(root));
        }
        Ok(())
    }

    /// The component currently containing `node`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectivityPrecondition`] if `node` is missing.
    pub fn get_connected_component(&mut self, node: &N) -> Result<ComponentId> {
        let v = self.vertex_of(node)?;
        Ok(ComponentId(self.uf.find(v)))
    }

    #[must_use]
    pub fn get_n_components(&self) -> usize {
        self.component_roots.len()
    }

    /// Every live component, in no particular order.
    #[must_use]
    pub fn components(&self) -> Vec<ComponentId> {
        self.component_roots.iter().copied().map(ComponentId).collect()
    }

    /// Every node belonging to `component`.
    #[must_use]
    pub fn component_nodes(&self, component: ComponentId) -> Vec<N> {
        self.uf.members(component.0).iter().map(|&v| self.external[v].clone()).collect()
    }
}

impl<N: Eq + Hash + Clone> Default for Connectivity<N> {
    fn default() -> Self {
        Self::construct()
    }
}

#[cfg(test)]
mod tests {
    use super::naive::NaiveConnectivity;
    use super::*;

    #[test]
    fn isolated_nodes_start_in_their_own_components() {
        let mut g: Connectivity<&str> = Connectivity::construct();
        g.add_node("a").unwrap();
        g.add_node("b").unwrap();
        assert_eq!(g.get_n_components(), 2);
        assert!(!g.connected(&"a", &"b").unwrap());
    }

    #[test]
    fn add_edge_merges_components() {
        let mut g: Connectivity<&str> = Connectivity::construct();
        g.add_node("a").unwrap();
        g.add_node("b").unwrap();
        g.add_edge(&"a", &"b").unwrap();
        assert!(g.connected(&"a", &"b").unwrap());
        assert_eq!(g.get_n_components(), 1);
        assert!(g.has_edge(&"a", &"b").unwrap());
    }

    #[test]
    fn removing_the_only_edge_cleaves_the_component() {
        let mut g: Connectivity<&str> = Connectivity::construct();
        g.add_node("a").unwrap();
        g.add_node("b").unwrap();
        g.add_edge(&"a", &"b").unwrap();
        g.remove_edge(&"a", &"b").unwrap();
        assert!(!g.connected(&"a", &"b").unwrap());
        assert_eq!(g.get_n_components(), 2);
    }

    #[test]
    fn a_redundant_edge_survives_a_cut_via_promotion() {
        // Triangle a-b-c: removing a-b shouldn't disconnect them, since
        // b-c-a is still a path.
        let mut g: Connectivity<&str> = Connectivity::construct();
        g.add_node("a").unwrap();
        g.add_node("b").unwrap();
        g.add_node("c").unwrap();
        g.add_edge(&"a", &"b").unwrap();
        g.add_edge(&"b", &"c").unwrap();
        g.add_edge(&"c", &"a").unwrap();
        assert_eq!(g.get_n_components(), 1);

        g.remove_edge(&"a", &"b").unwrap();
        assert!(g.connected(&"a", &"b").unwrap());
        assert_eq!(g.get_n_components(), 1);
    }

    #[test]
    fn remove_node_deletes_its_component_when_it_was_alone() {
        let mut g: Connectivity<&str> = Connectivity::construct();
        g.add_node("a").unwrap();
        let mut deleted = Vec::new();
        g.set_deletion_callback(move |_| deleted.push(()));
        g.remove_node(&"a").unwrap();
        assert_eq!(g.get_n_components(), 0);
    }

    #[test]
    fn callbacks_fire_for_creation_merge_and_cleave() {
        let mut g: Connectivity<&str> = Connectivity::construct();
        let creations = std::rc::Rc::new(std::cell::RefCell::new(0));
        let merges = std::rc::Rc::new(std::cell::RefCell::new(0));
        let cleaves = std::rc::Rc::new(std::cell::RefCell::new(0));

        let c = creations.clone();
        g.set_creation_callback(move |_| *c.borrow_mut() += 1);
        let m = merges.clone();
        g.set_merge_callback(move |_, _| *m.borrow_mut() += 1);
        let cl = cleaves.clone();
        g.set_cleave_callback(move |_, _, _| *cl.borrow_mut() += 1);

        g.add_node("a").unwrap();
        g.add_node("b").unwrap();
        g.add_edge(&"a", &"b").unwrap();
        g.remove_edge(&"a", &"b").unwrap();

        assert_eq!(*creations.borrow(), 2);
        assert_eq!(*merges.borrow(), 1);
        assert_eq!(*cleaves.borrow(), 1);
    }

    #[test]
    fn agrees_with_a_naive_oracle_across_a_sequence_of_edits() {
        let mut g: Connectivity<usize> = Connectivity::construct();
        let mut naive = NaiveConnectivity::new();
        for i in 0..8 {
            g.add_node(i).unwrap();
            naive.add_node(i);
        }

        let edits: &[(usize, usize, bool)] = &[
            (0, 1, true),
            (1, 2, true),
            (2, 3, true),
            (3, 0, true),
            (4, 5, true),
            (5, 6, true),
            (0, 1, false),
            (2, 3, false),
            (4, 5, false),
        ];
        for &(a, b, add) in edits {
            if add {
                g.add_edge(&a, &b).unwrap();
                naive.add_edge(a, b);
            } else {
                g.remove_edge(&a, &b).unwrap();
                naive.remove_edge(a, b);
            }
            for x in 0..8 {
                for y in 0..8 {
                    assert_eq!(
                        g.connected(&x, &y).unwrap(),
                        naive.connected(x, y),
                        "disagreement after editing ({a}, {b}, add={add})"
                    );
                }
            }
        }
    }
}
