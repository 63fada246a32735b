// Copyright (c) 2024-present, phylocore developers
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A comparator-keyed, randomized balanced binary search tree.
//!
//! Two sets may only participate in set algebra when their comparators are
//! literally the same function pointer; `fn(&T, &T) -> Ordering` pointers
//! support `==` directly in Rust, so that check is exact, not an
//! approximation.

use crate::error::{Error, Result};
use crate::random::Rng32;
use std::cmp::Ordering;

type Link = Option<usize>;

struct Node<T> {
    value: T,
    priority: u64,
    left: Link,
    right: Link,
}

/// Comparator signature: `(a, b) -> {<0, 0, >0}`.
pub type Comparator<T> = fn(&T, &T) -> Ordering;

/// A balanced BST-backed ordered set, keyed by an arbitrary comparator
/// rather than `Ord`.
pub struct SortedSet<T> {
    nodes: Vec<Node<T>>,
    root: Link,
    cmp: Comparator<T>,
    rng: Rng32,
    len: usize,
}

impl<T> SortedSet<T> {
    /// Creates an empty set ordered by `cmp`.
    #[must_use]
    pub fn new(cmp: Comparator<T>) -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
            cmp,
            rng: Rng32::seeded(0xC0FF_EE00_D15E_A5E5),
            len: 0,
        }
    }

    /// Number of elements in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the set has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` if `self` and `other` use the identical comparator
    /// function (required before any set-algebra operation).
    #[must_use]
    pub fn same_comparator(&self, other: &Self) -> bool {
        std::ptr::eq(self.cmp as *const (), other.cmp as *const ())
    }

    fn rotate_right(&mut self, y: usize) -> usize {
        let x = self.nodes[y].left.expect("rotate_right requires a left child");
        let x_right = self.nodes[x].right;
        self.nodes[y].left = x_right;
        self.nodes[x].right = Some(y);
        x
    }

    fn rotate_left(&mut self, x: usize) -> usize {
        let y = self.nodes[x].right.expect("rotate_left requires a right child");
        let y_left = self.nodes[y].left;
        self.nodes[x].right = y_left;
        self.nodes[y].left = Some(x);
        y
    }

    fn insert_at(&mut self, node: Link, value: T, priority: u64) -> usize {
        let Some(idx) = node else {
            self.nodes.push(Node {
                value,
                priority,
                left: None,
                right: None,
            });
            return self.nodes.len() - 1;
        };

        match (self.cmp)(&value, &self.nodes[idx].value) {
            Ordering::Less => {
                let left = self.nodes[idx].left;
                let new_left = self.insert_at(left, value, priority);
                self.nodes[idx].left = Some(new_left);
                if self.nodes[new_left].priority > self.nodes[idx].priority {
                    self.rotate_right(idx)
                } else {
                    idx
                }
            }
            Ordering::Greater => {
                let right = self.nodes[idx].right;
                let new_right = self.insert_at(right, value, priority);
                self.nodes[idx].right = Some(new_right);
                if self.nodes[new_right].priority > self.nodes[idx].priority {
                    self.rotate_left(idx)
                } else {
                    idx
                }
            }
            Ordering::Equal => {
                self.nodes[idx].value = value;
                idx
            }
        }
    }

    /// Inserts `value`, replacing any existing element that compares equal.
    pub fn insert(&mut self, value: T) {
        let priority = self.rng.random_u64();
        let before = self.nodes.len();
        self.root = Some(self.insert_at(self.root, value, priority));
        if self.nodes.len() > before {
            self.len += 1;
        }
    }

    fn remove_at(&mut self, node: Link, value: &T) -> (Link, bool) {
        let Some(idx) = node else {
            return (None, false);
        };

        match (self.cmp)(value, &self.nodes[idx].value) {
            Ordering::Less => {
                let left = self.nodes[idx].left;
                let (new_left, removed) = self.remove_at(left, value);
                self.nodes[idx].left = new_left;
                (Some(idx), removed)
            }
            Ordering::Greater => {
                let right = self.nodes[idx].right;
                let (new_right, removed) = self.remove_at(right, value);
                self.nodes[idx].right = new_right;
                (Some(idx), removed)
            }
            Ordering::Equal => (self.remove_root(idx), true),
        }
    }

    /// Merges two treaps whose in-order ranges don't overlap, preserving
    /// heap order on priority.
    fn merge(&mut self, left: Link, right: Link) -> Link {
        match (left, right) {
            (None, other) | (other, None) => other,
            (Some(l), Some(r)) => {
                if self.nodes[l].priority > self.nodes[r].priority {
                    let l_right = self.nodes[l].right;
                    let merged = self.merge(l_right, Some(r));
                    self.nodes[l].right = merged;
                    Some(l)
                } else {
                    let r_left = self.nodes[r].left;
                    let merged = self.merge(Some(l), r_left);
                    self.nodes[r].left = merged;
                    Some(r)
                }
            }
        }
    }

    /// Drops `idx` from the tree shape by merging its two children,
    /// returning the link that should replace `idx` wherever it hung.
    /// `idx` itself is left untouched in the arena; the caller
    /// (`remove`) swap-removes its slot separately.
    fn remove_root(&mut self, idx: usize) -> Link {
        let left = self.nodes[idx].left;
        let right = self.nodes[idx].right;
        self.merge(left, right)
    }

    /// Removes an element comparing equal to `value`, returning it.
    ///
    /// Destruction-through-remove is the caller's responsibility: in Rust,
    /// simply dropping the returned value, or not, if the caller still
    /// needs it.
    pub fn remove(&mut self, value: &T) -> Option<T> {
        // Find the node first so we can extract its value by swap-remove
        // after detaching it from the tree shape.
        let found = self.find_node(self.root, value)?;
        let (new_root, removed) = self.remove_at(self.root, value);
        self.root = new_root;
        if removed {
            self.len -= 1;
        }
        self.swap_remove_node(found)
    }

    fn find_node(&self, mut node: Link, value: &T) -> Link {
        while let Some(idx) = node {
            match (self.cmp)(value, &self.nodes[idx].value) {
                Ordering::Less => node = self.nodes[idx].left,
                Ordering::Greater => node = self.nodes[idx].right,
                Ordering::Equal => return Some(idx),
            }
        }
        None
    }

    /// Removes the arena slot at `idx` by swapping with the last slot and
    /// fixing up the one reference that might have pointed at the moved
    /// slot. `idx` must already be detached from the tree shape.
    fn swap_remove_node(&mut self, idx: usize) -> Option<T> {
        let last = self.nodes.len() - 1;
        if idx != last {
            self.nodes.swap(idx, last);
            self.fix_links_after_swap(last, idx);
        }
        self.nodes.pop().map(|n| n.value)
    }

    fn fix_links_after_swap(&mut self, old_idx: usize, new_idx: usize) {
        if self.root == Some(old_idx) {
            self.root = Some(new_idx);
        }
        for node in &mut self.nodes {
            if node.left == Some(old_idx) {
                node.left = Some(new_idx);
            }
            if node.right == Some(old_idx) {
                node.right = Some(new_idx);
            }
        }
    }

    /// Finds the element comparing equal to `value`, if any.
    #[must_use]
    pub fn find(&self, value: &T) -> Option<&T> {
        self.find_node(self.root, value).map(|i| &self.nodes[i].value)
    }

    fn extreme(&self, mut node: Link, left: bool) -> Link {
        let mut last = None;
        while let Some(idx) = node {
            last = Some(idx);
            node = if left {
                self.nodes[idx].left
            } else {
                self.nodes[idx].right
            };
        }
        last
    }

    /// Smallest element under the comparator.
    #[must_use]
    pub fn first(&self) -> Option<&T> {
        self.extreme(self.root, true).map(|i| &self.nodes[i].value)
    }

    /// Largest element under the comparator.
    #[must_use]
    pub fn last(&self) -> Option<&T> {
        self.extreme(self.root, false).map(|i| &self.nodes[i].value)
    }

    /// Nearest element `<= value` (or exactly `value`).
    #[must_use]
    pub fn search_less_equal(&self, value: &T) -> Option<&T> {
        let mut node = self.root;
        let mut best: Link = None;
        while let Some(idx) = node {
            match (self.cmp)(&self.nodes[idx].value, value) {
                Ordering::Greater => node = self.nodes[idx].left,
                _ => {
                    best = Some(idx);
                    node = self.nodes[idx].right;
                }
            }
        }
        best.map(|i| &self.nodes[i].value)
    }

    /// Nearest element strictly `< value`.
    #[must_use]
    pub fn search_less(&self, value: &T) -> Option<&T> {
        let mut node = self.root;
        let mut best: Link = None;
        while let Some(idx) = node {
            match (self.cmp)(&self.nodes[idx].value, value) {
                Ordering::Less => {
                    best = Some(idx);
                    node = self.nodes[idx].right;
                }
                _ => node = self.nodes[idx].left,
            }
        }
        best.map(|i| &self.nodes[i].value)
    }

    /// Nearest element `>= value` (or exactly `value`).
    #[must_use]
    pub fn search_greater_equal(&self, value: &T) -> Option<&T> {
        let mut node = self.root;
        let mut best: Link = None;
        while let Some(idx) = node {
            match (self.cmp)(&self.nodes[idx].value, value) {
                Ordering::Less => node = self.nodes[idx].right,
                _ => {
                    best = Some(idx);
                    node = self.nodes[idx].left;
                }
            }
        }
        best.map(|i| &self.nodes[i].value)
    }

    /// Nearest element strictly `> value`.
    #[must_use]
    pub fn search_greater(&self, value: &T) -> Option<&T> {
        let mut node = self.root;
        let mut best: Link = None;
        while let Some(idx) = node {
            match (self.cmp)(&self.nodes[idx].value, value) {
                Ordering::Greater => {
                    best = Some(idx);
                    node = self.nodes[idx].left;
                }
                _ => node = self.nodes[idx].right,
            }
        }
        best.map(|i| &self.nodes[i].value)
    }

    fn in_order(&self, node: Link, out: &mut Vec<&T>) {
        if let Some(idx) = node {
            self.in_order(self.nodes[idx].left, out);
            out.push(&self.nodes[idx].value);
            self.in_order(self.nodes[idx].right, out);
        }
    }

    /// Forward in-order iterator over the whole set.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        let mut out = Vec::with_capacity(self.len);
        self.in_order(self.root, &mut out);
        out.into_iter()
    }

    /// Forward in-order iterator starting at `from` (inclusive).
    ///
    /// # Errors
    ///
    /// Returns [`Error::SortedSetIterFromMissing`] if no element compares
    /// equal to `from`.
    pub fn iter_from(&self, from: &T) -> Result<impl DoubleEndedIterator<Item = &T>> {
        if self.find(from).is_none() {
            return Err(Error::SortedSetIterFromMissing);
        }
        let mut out = Vec::with_capacity(self.len);
        self.in_order(self.root, &mut out);
        let start = out
            .iter()
            .position(|v| (self.cmp)(v, from) == Ordering::Equal)
            .unwrap_or(0);
        Ok(out.into_iter().skip(start))
    }
}

impl<T: Clone> SortedSet<T> {
    /// Union of two sets sharing the same comparator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SetAlgebraMismatch`] if the comparators differ.
    pub fn union(&self, other: &Self) -> Result<Self> {
        self.check_same_comparator(other)?;
        let mut result = Self::new(self.cmp);
        for v in self.iter() {
            result.insert(v.clone());
        }
        for v in other.iter() {
            result.insert(v.clone());
        }
        Ok(result)
    }

    /// Intersection of two sets sharing the same comparator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SetAlgebraMismatch`] if the comparators differ.
    pub fn intersection(&self, other: &Self) -> Result<Self> {
        self.check_same_comparator(other)?;
        let mut result = Self::new(self.cmp);
        for v in self.iter() {
            if other.find(v).is_some() {
                result.insert(v.clone());
            }
        }
        Ok(result)
    }

    /// Elements of `self` that are not in `other`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SetAlgebraMismatch`] if the comparators differ.
    pub fn difference(&self, other: &Self) -> Result<Self> {
        self.check_same_comparator(other)?;
        let mut result = Self::new(self.cmp);
        for v in self.iter() {
            if other.find(v).is_none() {
                result.insert(v.clone());
            }
        }
        Ok(result)
    }

    fn check_same_comparator(&self, other: &Self) -> Result<()> {
        if self.same_comparator(other) {
            Ok(())
        } else {
            Err(Error::SetAlgebraMismatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_cmp(a: &i64, b: &i64) -> Ordering {
        a.cmp(b)
    }

    fn other_int_cmp(a: &i64, b: &i64) -> Ordering {
        a.cmp(b)
    }

    #[test]
    fn end_to_end_scenario_one() {
        let mut set: SortedSet<i64> = SortedSet::new(int_cmp);
        for v in [1, 5, -1, 10, 3, 12, 3, -10, -10] {
            set.insert(v);
        }
        assert_eq!(set.len(), 7);
        assert_eq!(set.first(), Some(&-10));
        assert_eq!(set.last(), Some(&12));

        let forward: Vec<i64> = set.iter().copied().collect();
        assert_eq!(forward, vec![-10, -1, 1, 3, 5, 10, 12]);

        let backward: Vec<i64> = set.iter().rev().copied().collect();
        assert_eq!(backward, vec![12, 10, 5, 3, 1, -1, -10]);
    }

    #[test]
    fn search_nearest_variants() {
        let mut set: SortedSet<i64> = SortedSet::new(int_cmp);
        for v in [10, 20, 30] {
            set.insert(v);
        }
        assert_eq!(set.search_less_equal(&20), Some(&20));
        assert_eq!(set.search_less(&20), Some(&10));
        assert_eq!(set.search_greater_equal(&20), Some(&20));
        assert_eq!(set.search_greater(&20), Some(&30));
        assert_eq!(set.search_less(&10), None);
        assert_eq!(set.search_greater(&30), None);
    }

    #[test]
    fn remove_then_find_misses() {
        let mut set: SortedSet<i64> = SortedSet::new(int_cmp);
        set.insert(5);
        assert_eq!(set.remove(&5), Some(5));
        assert_eq!(set.find(&5), None);
        assert!(set.is_empty());
    }

    #[test]
    fn iter_from_missing_errors() {
        let mut set: SortedSet<i64> = SortedSet::new(int_cmp);
        set.insert(1);
        assert!(matches!(
            set.iter_from(&2).err(),
            Some(Error::SortedSetIterFromMissing)
        ));
    }

    #[test]
    fn set_algebra_requires_identical_comparator() {
        let mut a: SortedSet<i64> = SortedSet::new(int_cmp);
        a.insert(1);
        let mut b: SortedSet<i64> = SortedSet::new(other_int_cmp);
        b.insert(1);
        assert!(matches!(a.union(&b), Err(Error::SetAlgebraMismatch)));
    }

    #[test]
    fn set_algebra_with_matching_comparator() {
        let mut a: SortedSet<i64> = SortedSet::new(int_cmp);
        a.insert(1);
        a.insert(2);
        let mut b: SortedSet<i64> = SortedSet::new(int_cmp);
        b.insert(2);
        b.insert(3);

        let u: Vec<i64> = a.union(&b).unwrap().iter().copied().collect();
        assert_eq!(u, vec![1, 2, 3]);

        let i: Vec<i64> = a.intersection(&b).unwrap().iter().copied().collect();
        assert_eq!(i, vec![2]);

        let d: Vec<i64> = a.difference(&b).unwrap().iter().copied().collect();
        assert_eq!(d, vec![1]);
    }

    #[test]
    fn many_inserts_stay_consistent_with_sorted_vec() {
        use rand::Rng;
        let mut rng = rand::rng();
        let mut set: SortedSet<i64> = SortedSet::new(int_cmp);
        let mut oracle: Vec<i64> = Vec::new();
        for _ in 0..500 {
            let v: i64 = rng.random_range(-100..100);
            set.insert(v);
            if !oracle.contains(&v) {
                oracle.push(v);
            }
        }
        oracle.sort_unstable();
        let got: Vec<i64> = set.iter().copied().collect();
        assert_eq!(got, oracle);
    }
}
