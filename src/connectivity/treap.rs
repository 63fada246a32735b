// Copyright (c) 2024-present, phylocore developers
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! An arena-indexed, size-augmented implicit treap, no `unsafe`, ordered
//! purely by position rather than by key. Euler-tour
//! positions don't have a natural comparator the way container sets do, so
//! order here is whatever `merge`/`split` leaves it as: the sequence a
//! vertex's tour visits nodes in.
//!
//! `rank`/`root_of` walk parent pointers rather than keeping a separate
//! index, mirroring [`crate::container::sorted_set`]'s plain `Vec`-backed
//! arena but augmented with `parent` so a node can find its own position
//! without the caller tracking the root.

use crate::random::Rng32;

type Link = Option<usize>;

struct Node<T> {
    value: T,
    priority: u64,
    count: usize,
    left: Link,
    right: Link,
    parent: Link,
}

/// An implicit treap: elements have no key, only a position determined by
/// in-order traversal. `T` is the payload each position carries (a
/// half-edge or vertex-visit record, in the connectivity engine above
/// this module).
pub struct Treap<T> {
    nodes: Vec<Node<T>>,
    rng: Rng32,
}

impl<T> Treap<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            rng: Rng32::seeded(0x7AE5_EE55_CAFE_D00D),
        }
    }

    /// Inserts `value` as a brand new, single-node treap and returns its
    /// id. The returned id is permanent: it survives merges and splits and
    /// is the handle callers use to locate this element later.
    pub fn new_singleton(&mut self, value: T) -> usize {
        let priority = self.rng.random_u64();
        let id = self.nodes.len();
        self.nodes.push(Node {
            value,
            priority,
            count: 1,
            left: None,
            right: None,
            parent: None,
        });
        id
    }

    pub fn value(&self, id: usize) -> &T {
        &self.nodes[id].value
    }

    pub fn value_mut(&mut self, id: usize) -> &mut T {
        &mut self.nodes[id].value
    }

    /// The root of the treap containing `id`.
    #[must_use]
    pub fn root_of(&self, id: usize) -> usize {
        let mut cur = id;
        while let Some(parent) = self.nodes[cur].parent {
            cur = parent;
        }
        cur
    }

    /// `true` if `a` and `b` currently sit in the same treap (i.e. the
    /// same connected component's Euler tour).
    #[must_use]
    pub fn same_tree(&self, a: usize, b: usize) -> bool {
        self.root_of(a) == self.root_of(b)
    }

    /// Number of elements in the treap rooted at `root`.
    #[must_use]
    pub fn len_of(&self, root: Link) -> usize {
        self.count(root)
    }

    fn count(&self, link: Link) -> usize {
        link.map_or(0, |id| self.nodes[id].count)
    }

    fn set_parent(&mut self, link: Link, parent: Link) {
        if let Some(id) = link {
            self.nodes[id].parent = parent;
        }
    }

    fn update_count(&mut self, id: usize) {
        let left = self.nodes[id].left;
        let right = self.nodes[id].right;
        self.nodes[id].count = 1 + self.count(left) + self.count(right);
    }

    /// 0-based in-order position of `id` within its own treap.
    #[must_use]
    pub fn rank(&self, id: usize) -> usize {
        let mut rank = self.count(self.nodes[id].left);
        let mut child = id;
        while let Some(parent) = self.nodes[child].parent {
            if self.nodes[parent].right == Some(child) {
                rank += self.count(self.nodes[parent].left) + 1;
            }
            child = parent;
        }
        rank
    }

    /// Joins `left` and `right`, in that order, into one treap. Either
    /// side may be empty.
    pub fn merge(&mut self, left: Link, right: Link) -> Link {
        match (left, right) {
            (None, r) => {
                self.set_parent(r, None);
                r
            }
            (l, None) => {
                self.set_parent(l, None);
                l
            }
            (Some(l), Some(r)) => {
                if self.nodes[l].priority >= self.nodes[r].priority {
                    let new_right = self.merge(self.nodes[l].right, Some(r));
                    self.nodes[l].right = new_right;
                    self.set_parent(new_right, Some(l));
                    self.update_count(l);
                    self.nodes[l].parent = None;
                    Some(l)
                } else {
                    let new_left = self.merge(Some(l), self.nodes[r].left);
                    self.nodes[r].left = new_left;
                    self.set_parent(new_left, Some(r));
                    self.update_count(r);
                    self.nodes[r].parent = None;
                    Some(r)
                }
            }
        }
    }

    /// Splits `root` into a prefix of `k` elements and the remaining
    /// suffix.
    fn split_by_rank(&mut self, root: Link, k: usize) -> (Link, Link) {
        let Some(id) = root else {
            return (None, None);
        };
        let left_count = self.count(self.nodes[id].left);
        if k <= left_count {
            let left = self.nodes[id].left;
            let (ll, lr) = self.split_by_rank(left, k);
            self.nodes[id].left = lr;
            self.set_parent(lr, Some(id));
            self.update_count(id);
            self.nodes[id].parent = None;
            self.set_parent(ll, None);
            (ll, Some(id))
        } else {
            let right = self.nodes[id].right;
            let (rl, rr) = self.split_by_rank(right, k - left_count - 1);
            self.nodes[id].right = rl;
            self.set_parent(rl, Some(id));
            self.update_count(id);
            self.nodes[id].parent = None;
            self.set_parent(rr, None);
            (Some(id), rr)
        }
    }

    /// Splits `id`'s treap into the elements strictly before it and the
    /// elements from `id` onward (`id` included in the second half).
    pub fn split_before(&mut self, id: usize) -> (Link, Link) {
        let root = self.root_of(id);
        let k = self.rank(id);
        self.split_by_rank(Some(root), k)
    }

    /// Splits `id`'s treap into the elements up to and including `id`,
    /// and the elements strictly after it.
    pub fn split_after(&mut self, id: usize) -> (Link, Link) {
        let root = self.root_of(id);
        let k = self.rank(id) + 1;
        self.split_by_rank(Some(root), k)
    }

    /// Rotates `id`'s treap so that `id` becomes the very first element,
    /// without disturbing the relative order of anything else ("make
    /// root" in Euler-tour-tree terms).
    pub fn rotate_to_front(&mut self, id: usize) -> usize {
        let (before, from_id) = self.split_before(id);
        self.merge(from_id, before).expect("non-empty after rotate_to_front")
    }

    /// In-order traversal of the treap rooted at `root`.
    #[must_use]
    pub fn in_order(&self, root: Link) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.count(root));
        self.in_order_into(root, &mut out);
        out
    }

    fn in_order_into(&self, root: Link, out: &mut Vec<usize>) {
        let Some(id) = root else { return };
        self.in_order_into(self.nodes[id].left, out);
        out.push(id);
        self.in_order_into(self.nodes[id].right, out);
    }
}

impl<T> Default for Treap<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_then_split_round_trips_order() {
        let mut treap: Treap<i32> = Treap::new();
        let ids: Vec<usize> = (0..10).map(|i| treap.new_singleton(i)).collect();
        let mut root = None;
        for &id in &ids {
            root = treap.merge(root, Some(id));
        }
        assert_eq!(treap.in_order(root), ids);

        let (left, right) = treap.split_before(ids[4]);
        assert_eq!(
            treap.in_order(left).iter().map(|&i| *treap.value(i)).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        assert_eq!(
            treap.in_order(right).iter().map(|&i| *treap.value(i)).collect::<Vec<_>>(),
            vec![4, 5, 6, 7, 8, 9]
        );
    }

    #[test]
    fn rotate_to_front_preserves_cyclic_order() {
        let mut treap: Treap<i32> = Treap::new();
        let ids: Vec<usize> = (0..5).map(|i| treap.new_singleton(i)).collect();
        let mut root = None;
        for &id in &ids {
            root = treap.merge(root, Some(id));
        }
        let new_root = treap.rotate_to_front(ids[2]);
        let values: Vec<i32> = treap.in_order(Some(new_root)).iter().map(|&i| *treap.value(i)).collect();
        assert_eq!(values, vec![2, 3, 4, 0, 1]);
    }

    #[test]
    fn same_tree_tracks_merges_and_splits() {
        let mut treap: Treap<i32> = Treap::new();
        let a = treap.new_singleton(1);
        let b = treap.new_singleton(2);
        assert!(!treap.same_tree(a, b));
        treap.merge(Some(a), Some(b));
        assert!(treap.same_tree(a, b));

        let (left, right) = treap.split_before(b);
        assert!(!treap.same_tree(a, b));
        assert_eq!(treap.len_of(left), 1);
        assert_eq!(treap.len_of(right), 1);
    }
}
