// Copyright (c) 2024-present, phylocore developers
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Non-tree edge bookkeeping, indexed by endpoint. Non-tree edges are
//! tracked separately from the spanning forest; they are only promoted to
//! tree edges during a cut that would otherwise disconnect.
//!
//! An edge is stored once per endpoint so that "every edge incident to
//! `v`" is a direct lookup rather than a scan, at the cost of keeping both
//! directions in sync on insert/remove.

use rustc_hash::FxHashMap;

#[derive(Default)]
pub struct EdgeContainer {
    by_endpoint: FxHashMap<usize, FxHashMap<usize, ()>>,
}

impl EdgeContainer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_edge(&self, u: usize, v: usize) -> bool {
        self.by_endpoint.get(&u).is_some_and(|m| m.contains_key(&v))
    }

    pub fn add_edge(&mut self, u: usize, v: usize) {
        self.by_endpoint.entry(u).or_default().insert(v, ());
        self.by_endpoint.entry(v).or_default().insert(u, ());
    }

    /// Removes one edge between `u` and `v`, returning `true` if one was
    /// present.
    pub fn remove_edge(&mut self, u: usize, v: usize) -> bool {
        let removed = self.by_endpoint.get_mut(&u).is_some_and(|m| m.remove(&v).is_some());
        if removed {
            if let Some(m) = self.by_endpoint.get_mut(&v) {
                m.remove(&u);
            }
        }
        removed
    }

    /// Every vertex with a non-tree edge to `v`.
    #[must_use]
    pub fn incident(&self, v: usize) -> Vec<usize> {
        self.by_endpoint.get(&v).map(|m| m.keys().copied().collect()).unwrap_or_default()
    }

    /// Removes every non-tree edge incident to `v` (used when `v` itself
    /// is removed from the graph).
    pub fn remove_vertex(&mut self, v: usize) {
        let neighbors = self.incident(v);
        for u in neighbors {
            if let Some(m) = self.by_endpoint.get_mut(&u) {
                m.remove(&v);
            }
        }
        self.by_endpoint.remove(&v);
    }

    /// Removes and returns an arbitrary non-tree edge incident to `v`, if
    /// any (used to promote a replacement tree edge after a cut).
    pub fn take_any_incident(&mut self, v: usize) -> Option<usize> {
        let other = *self.by_endpoint.get(&v)?.keys().next()?;
        self.remove_edge(v, other);
        Some(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_remove_and_has_edge_agree() {
        let mut edges = EdgeContainer::new();
        assert!(!edges.has_edge(1, 2));
        edges.add_edge(1, 2);
        assert!(edges.has_edge(1, 2));
        assert!(edges.has_edge(2, 1));
        assert!(edges.remove_edge(2, 1));
        assert!(!edges.has_edge(1, 2));
        assert!(!edges.remove_edge(1, 2));
    }

    #[test]
    fn remove_vertex_clears_every_incident_edge() {
        let mut edges = EdgeContainer::new();
        edges.add_edge(1, 2);
        edges.add_edge(1, 3);
        edges.add_edge(4, 1);
        edges.remove_vertex(1);
        assert!(!edges.has_edge(1, 2));
        assert!(!edges.has_edge(1, 3));
        assert!(!edges.has_edge(4, 1));
        assert!(edges.incident(1).is_empty());
        assert!(edges.incident(2).is_empty());
    }

    #[test]
    fn take_any_incident_promotes_a_replacement() {
        let mut edges = EdgeContainer::new();
        edges.add_edge(1, 2);
        let replacement = edges.take_any_incident(1);
        assert_eq!(replacement, Some(2));
        assert!(!edges.has_edge(1, 2));
    }
}
