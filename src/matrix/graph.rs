// Copyright (c) 2024-present, phylocore developers
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A small static weighted graph with Dijkstra's algorithm.
//!
//! Vertex count is fixed at construction; each vertex owns an adjacency
//! list of `(to, weight)` pairs. Dijkstra additionally returns predecessor
//! back-pointers for path reconstruction alongside the shortest distances.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A static, non-negative-weighted graph with a fixed vertex count.
#[derive(Debug, Clone)]
pub struct Graph {
    adjacency: Vec<Vec<(usize, f64)>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct HeapEntry {
    distance: f64,
    vertex: usize,
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so `BinaryHeap` (a max-heap) pops the smallest distance.
        other
            .distance
            .partial_cmp(&self.distance)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The result of a single-source shortest-path query.
#[derive(Debug, Clone)]
pub struct ShortestPaths {
    /// `distances[v]` is the shortest distance from the source to `v`, or
    /// `f64::INFINITY` if `v` is unreachable.
    pub distances: Vec<f64>,
    /// `predecessors[v]` is the vertex preceding `v` on the shortest path
    /// from the source, or `None` if `v` is the source or unreachable.
    pub predecessors: Vec<Option<usize>>,
}

impl Graph {
    /// Builds a graph with `n` vertices and no edges.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            adjacency: vec![Vec::new(); n],
        }
    }

    /// Number of vertices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    /// Returns `true` if the graph has no vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    /// Adds a directed edge `from -> to` with the given weight.
    ///
    /// # Panics
    ///
    /// Panics if either endpoint is out of range.
    pub fn add_edge(&mut self, from: usize, to: usize, weight: f64) {
        self.adjacency[from].push((to, weight));
    }

    /// Adds an undirected edge, i.e. both directed edges with the same
    /// weight.
    ///
    /// # Panics
    ///
    /// Panics if either endpoint is out of range.
    pub fn add_undirected_edge(&mut self, a: usize, b: usize, weight: f64) {
        self.add_edge(a, b, weight);
        self.add_edge(b, a, weight);
    }

    /// Neighbors of `vertex` as `(to, weight)` pairs.
    #[must_use]
    pub fn neighbors(&self, vertex: usize) -> &[(usize, f64)] {
        &self.adjacency[vertex]
    }

    /// Runs Dijkstra's algorithm from `source`, using a binary-heap
    /// priority queue over `(distance, vertex)` pairs.
    ///
    /// # Panics
    ///
    /// Panics if `source` is out of range.
    #[must_use]
    pub fn shortest_paths(&self, source: usize) -> ShortestPaths {
        let n = self.adjacency.len();
        let mut distances = vec![f64::INFINITY; n];
        let mut predecessors = vec![None; n];
        let mut visited = vec![false; n];
        distances[source] = 0.0;

        let mut heap = BinaryHeap::new();
        heap.push(HeapEntry {
            distance: 0.0,
            vertex: source,
        });

        while let Some(HeapEntry { distance, vertex }) = heap.pop() {
            if visited[vertex] {
                continue;
            }
            visited[vertex] = true;
            if distance > distances[vertex] {
                continue;
            }
            for &(to, weight) in &self.adjacency[vertex] {
                let candidate = distance + weight;
                if candidate < distances[to] {
                    distances[to] = candidate;
                    predecessors[to] = Some(vertex);
                    heap.push(HeapEntry {
                        distance: candidate,
                        vertex: to,
                    });
                }
            }
        }

        ShortestPaths {
            distances,
            predecessors,
        }
    }

    /// Reconstructs the shortest path from the source used to compute
    /// `paths` to `target`, inclusive of both endpoints, or `None` if
    /// `target` is unreachable.
    #[must_use]
    pub fn reconstruct_path(paths: &ShortestPaths, mut target: usize) -> Option<Vec<usize>> {
        if paths.distances[target].is_infinite() {
            return None;
        }
        let mut path = vec![target];
        while let Some(prev) = paths.predecessors[target] {
            path.push(prev);
            target = prev;
        }
        path.reverse();
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortest_path_on_a_line() {
        let mut g = Graph::new(4);
        g.add_edge(0, 1, 1.0);
        g.add_edge(1, 2, 2.0);
        g.add_edge(2, 3, 3.0);
        let paths = g.shortest_paths(0);
        assert_eq!(paths.distances, vec![0.0, 1.0, 3.0, 6.0]);
        assert_eq!(Graph::reconstruct_path(&paths, 3), Some(vec![0, 1, 2, 3]));
    }

    #[test]
    fn picks_cheaper_of_two_routes() {
        let mut g = Graph::new(3);
        g.add_edge(0, 1, 5.0);
        g.add_edge(0, 2, 1.0);
        g.add_edge(2, 1, 1.0);
        let paths = g.shortest_paths(0);
        assert_eq!(paths.distances[1], 2.0);
        assert_eq!(Graph::reconstruct_path(&paths, 1), Some(vec![0, 2, 1]));
    }

    #[test]
    fn unreachable_vertex_has_infinite_distance_and_no_path() {
        let mut g = Graph::new(3);
        g.add_edge(0, 1, 1.0);
        let paths = g.shortest_paths(0);
        assert!(paths.distances[2].is_infinite());
        assert_eq!(Graph::reconstruct_path(&paths, 2), None);
    }
}
