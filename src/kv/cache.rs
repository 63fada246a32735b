// Copyright (c) 2024-present, phylocore developers
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A size-bounded LRU byte cache that fronts any [`KvStore`] backend.
//!
//! A fingerprint is `(key, offset, length)`. Fragments of the same key that
//! touch or overlap are coalesced into a single stored interval, and a
//! global LRU order evicts whole fingerprints (never partial ones) until
//! the configured byte budget is satisfied again.

use super::KvStore;
use crate::error::Result;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

struct CacheState {
    /// key -> (offset -> bytes), non-overlapping and merged.
    fragments: HashMap<i64, BTreeMap<i64, Vec<u8>>>,
    /// Remembered full-record size for keys that were read in full, so a
    /// later `get` can be served from the offset-0 fragment without
    /// re-asking the backend for the length.
    full_sizes: HashMap<i64, i64>,
    /// Fingerprints `(key, offset)` in least- to most-recently-used order.
    order: Vec<(i64, i64)>,
    total_bytes: i64,
}

impl CacheState {
    fn new() -> Self {
        Self {
            fragments: HashMap::new(),
            full_sizes: HashMap::new(),
            order: Vec::new(),
            total_bytes: 0,
        }
    }

    fn touch(&mut self, key: i64, start: i64) {
        if let Some(pos) = self.order.iter().position(|fp| fp == &(key, start)) {
            let fp = self.order.remove(pos);
            self.order.push(fp);
        }
    }

    fn insert_fragment(&mut self, key: i64, offset: i64, bytes: &[u8]) {
        let new_start = offset;
        let new_end = offset + bytes.len() as i64;

        let overlapping: Vec<i64> = self
            .fragments
            .get(&key)
            .map(|map| {
                map.iter()
                    .filter(|(&s, b)| s + b.len() as i64 >= new_start && s <= new_end)
                    .map(|(&s, _)| s)
                    .collect()
            })
            .unwrap_or_default();

        let mut merge_start = new_start;
        let mut merge_end = new_end;
        let map = self.fragments.entry(key).or_default();
        for &s in &overlapping {
            let existing_end = s + map[&s].len() as i64;
            merge_start = merge_start.min(s);
            merge_end = merge_end.max(existing_end);
        }

        let mut merged = vec![0u8; (merge_end - merge_start) as usize];
        for &s in &overlapping {
            let existing = map.remove(&s).expect("overlap key must be present");
            self.total_bytes -= existing.len() as i64;
            self.order.retain(|fp| fp != &(key, s));
            let rel = (s - merge_start) as usize;
            merged[rel..rel + existing.len()].copy_from_slice(&existing);
        }
        let rel = (offset - merge_start) as usize;
        merged[rel..rel + bytes.len()].copy_from_slice(bytes);

        self.total_bytes += merged.len() as i64;
        self.fragments.entry(key).or_default().insert(merge_start, merged);
        self.order.push((key, merge_start));
    }

    fn remember_full(&mut self, key: i64, bytes: &[u8]) {
        self.full_sizes.insert(key, bytes.len() as i64);
        self.insert_fragment(key, 0, bytes);
    }

    fn lookup_full(&mut self, key: i64) -> Option<Vec<u8>> {
        let want_len = *self.full_sizes.get(&key)?;
        let bytes = self.fragments.get(&key)?.get(&0)?;
        if bytes.len() as i64 != want_len {
            return None;
        }
        let result = bytes.clone();
        self.touch(key, 0);
        Some(result)
    }

    fn lookup_range(&mut self, key: i64, offset: i64, len: i64) -> Option<Vec<u8>> {
        let (start, result) = {
            let map = self.fragments.get(&key)?;
            let (&start, bytes) = map.range(..=offset).next_back()?;
            let end = start + bytes.len() as i64;
            if end < offset + len {
                return None;
            }
            let rel = (offset - start) as usize;
            (start, bytes[rel..rel + len as usize].to_vec())
        };
        self.touch(key, start);
        Some(result)
    }

    /// `true` if every byte of `[offset, offset+len)` for `key` is cached.
    fn covers(&self, key: i64, offset: i64, len: i64) -> bool {
        let Some(map) = self.fragments.get(&key) else {
            return false;
        };
        let Some((&start, bytes)) = map.range(..=offset).next_back() else {
            return false;
        };
        start + bytes.len() as i64 >= offset + len
    }

    fn forget_key(&mut self, key: i64) {
        if let Some(map) = self.fragments.remove(&key) {
            for (&start, bytes) in &map {
                self.total_bytes -= bytes.len() as i64;
                self.order.retain(|fp| fp != &(key, start));
            }
        }
        self.full_sizes.remove(&key);
    }

    fn evict(&mut self, budget: i64) {
        while self.total_bytes > budget {
            let Some((key, start)) = self.order.first().copied() else {
                break;
            };
            self.order.remove(0);
            if let Some(map) = self.fragments.get_mut(&key) {
                if let Some(bytes) = map.remove(&start) {
                    self.total_bytes -= bytes.len() as i64;
                }
                if map.is_empty() {
                    self.fragments.remove(&key);
                    self.full_sizes.remove(&key);
                }
            }
        }
    }
}

/// Wraps a backend `B` with a byte-budgeted LRU cache in front of its read
/// operations.
pub struct LruByteCache<B> {
    backend: B,
    budget: i64,
    state: RefCell<CacheState>,
}

impl<B> LruByteCache<B> {
    /// Wraps `backend`, allowing at most `budget_bytes` of cached fragment
    /// data at once.
    #[must_use]
    pub fn new(backend: B, budget_bytes: i64) -> Self {
        Self {
            backend,
            budget: budget_bytes,
            state: RefCell::new(CacheState::new()),
        }
    }

    /// Total bytes currently cached (never exceeds the configured budget).
    #[must_use]
    pub fn cached_bytes(&self) -> i64 {
        self.state.borrow().total_bytes
    }

    /// `true` if every byte of `[offset, offset+len)` for `key` is cached,
    /// without consulting the backend.
    #[must_use]
    pub fn contains_range(&self, key: i64, offset: i64, len: i64) -> bool {
        self.state.borrow().covers(key, offset, len)
    }

    /// A reference to the wrapped backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// A mutable reference to the wrapped backend.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: KvStore> KvStore for LruByteCache<B> {
    fn contains(&self, key: i64) -> Result<bool> {
        self.backend.contains(key)
    }

    fn get(&self, key: i64) -> Result<Option<Vec<u8>>> {
        if let Some(cached) = self.state.borrow_mut().lookup_full(key) {
            return Ok(Some(cached));
        }
        let fetched = self.backend.get(key)?;
        if let Some(bytes) = &fetched {
            let mut state = self.state.borrow_mut();
            state.remember_full(key, bytes);
            state.evict(self.budget);
        }
        Ok(fetched)
    }

    fn get_partial(&self, key: i64, offset: i64, len: i64) -> Result<Vec<u8>> {
        if let Some(cached) = self.state.borrow_mut().lookup_range(key, offset, len) {
            return Ok(cached);
        }
        let fetched = self.backend.get_partial(key, offset, len)?;
        let mut state = self.state.borrow_mut();
        state.insert_fragment(key, offset, &fetched);
        state.evict(self.budget);
        Ok(fetched)
    }

    fn set(&mut self, key: i64, value: &[u8]) -> Result<()> {
        self.backend.set(key, value)?;
        let mut state = self.state.borrow_mut();
        state.remember_full(key, value);
        state.evict(self.budget);
        Ok(())
    }

    fn remove(&mut self, key: i64) -> Result<()> {
        self.backend.remove(key)?;
        self.state.borrow_mut().forget_key(key);
        Ok(())
    }

    fn number_of_records(&self) -> Result<i64> {
        self.backend.number_of_records()
    }

    fn delete_from_disk(&mut self) -> Result<()> {
        self.backend.delete_from_disk()?;
        *self.state.borrow_mut() = CacheState::new();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KvError;
    use std::collections::HashMap as StdHashMap;

    struct Toy {
        records: StdHashMap<i64, Vec<u8>>,
    }

    impl Toy {
        fn new() -> Self {
            Self {
                records: StdHashMap::new(),
            }
        }
    }

    impl KvStore for Toy {
        fn contains(&self, key: i64) -> Result<bool> {
            Ok(self.records.contains_key(&key))
        }
        fn get(&self, key: i64) -> Result<Option<Vec<u8>>> {
            Ok(self.records.get(&key).cloned())
        }
        fn set(&mut self, key: i64, value: &[u8]) -> Result<()> {
            self.records.insert(key, value.to_vec());
            Ok(())
        }
        fn remove(&mut self, key: i64) -> Result<()> {
            self.records.remove(&key).map(|_| ()).ok_or_else(|| KvError::MissingKey(key).into())
        }
        fn number_of_records(&self) -> Result<i64> {
            Ok(self.records.len() as i64)
        }
        fn delete_from_disk(&mut self) -> Result<()> {
            self.records.clear();
            Ok(())
        }
    }

    #[test]
    fn reads_are_served_from_cache_after_first_fetch() {
        let toy = Toy::new();
        let mut cache = LruByteCache::new(toy, 1024);
        cache.set(1, b"hello").unwrap();
        // Clear the backing store directly to prove the second read comes
        // from the cache, not the backend.
        cache.backend_mut().records.remove(&1);
        assert_eq!(cache.get(1).unwrap(), Some(b"hello".to_vec()));
    }

    #[test]
    fn budget_is_never_exceeded_and_reads_stay_correct() {
        // 10 records of 16 bytes each against a 64-byte budget.
        let toy = Toy::new();
        let mut cache = LruByteCache::new(toy, 64);
        let mut expected = Vec::new();
        for k in 0..10i64 {
            let value: Vec<u8> = vec![k as u8; 16];
            cache.set(k, &value).unwrap();
            expected.push(value);
        }
        for k in 0..5i64 {
            assert_eq!(cache.get(k).unwrap(), Some(expected[k as usize].clone()));
        }
        for k in 5..10i64 {
            assert_eq!(cache.get(k).unwrap(), Some(expected[k as usize].clone()));
        }
        assert!(cache.cached_bytes() <= 64);
    }

    #[test]
    fn partial_reads_merge_adjacent_fragments() {
        let toy = Toy::new();
        let mut cache = LruByteCache::new(toy, 1024);
        cache.set(1, b"0123456789").unwrap();
        cache.backend_mut().records.insert(1, b"0123456789".to_vec());

        assert_eq!(cache.get_partial(1, 0, 4).unwrap(), b"0123".to_vec());
        assert!(cache.contains_range(1, 0, 10));
    }

    #[test]
    fn eviction_drops_least_recently_used_fragment() {
        let toy = Toy::new();
        let mut cache = LruByteCache::new(toy, 16);
        cache.set(1, &vec![1u8; 16]).unwrap();
        assert!(cache.contains_range(1, 0, 16));
        cache.set(2, &vec![2u8; 16]).unwrap();
        assert!(!cache.contains_range(1, 0, 16));
        assert!(cache.contains_range(2, 0, 16));
    }
}
