// Copyright (c) 2024-present, phylocore developers
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A pluggable key -> value persistence layer: one abstract contract,
//! several concrete backends, and an LRU byte cache that can front any of
//! them.

pub mod bigfile;
pub mod cache;
pub mod config;
pub mod embedded;
pub mod relational;
pub mod remote;

use crate::error::{KvError, Result};
use enum_dispatch::enum_dispatch;

pub use bigfile::BigFileBackend;
pub use cache::LruByteCache;
pub use config::{BackendKind, DatabaseConf};
pub use embedded::EmbeddedBackend;
pub use remote::{LoopbackTransport, RemoteBackend, TcpTransport};

/// The abstract key -> value contract every backend implements.
///
/// Any operation a backend does not support returns
/// [`KvError::Unsupported`] rather than panicking; callers that need a
/// particular operation to always succeed should check the backend kind
/// up front.
#[enum_dispatch]
pub trait KvStore {
    /// Returns `true` if `key` has a record.
    fn contains(&self, key: i64) -> Result<bool>;

    /// Fetches the full record for `key`, or `None` on a miss.
    fn get(&self, key: i64) -> Result<Option<Vec<u8>>>;

    /// Fetches `len` bytes of `key`'s record starting at `offset`.
    ///
    /// Returns [`KvError::OutOfRange`] if the requested region falls
    /// outside the record.
    fn get_partial(&self, key: i64, offset: i64, len: i64) -> Result<Vec<u8>> {
        let record = self.get(key)?.ok_or(KvError::MissingKey(key))?;
        let record_size = record.len() as i64;
        if offset < 0 || len < 0 || offset + len > record_size {
            return Err(KvError::OutOfRange {
                key,
                offset,
                len,
                record_size,
            }
            .into());
        }
        Ok(record[offset as usize..(offset + len) as usize].to_vec())
    }

    /// Fetches `key`'s record interpreted as a native-endian `i64`.
    fn get_int64(&self, key: i64) -> Result<i64> {
        let record = self.get(key)?.ok_or(KvError::MissingKey(key))?;
        decode_i64(&record)
    }

    /// Fetches every key in `keys`, in the same order; a miss becomes
    /// `None` at that position rather than shortening the result.
    fn bulk_get(&self, keys: &[i64]) -> Result<Vec<Option<Vec<u8>>>> {
        keys.iter().map(|&k| self.get(k)).collect()
    }

    /// Fetches `n` consecutive keys starting at `first_key`.
    fn bulk_get_range(&self, first_key: i64, n: i64) -> Result<Vec<(i64, Option<Vec<u8>>)>> {
        (0..n)
            .map(|i| {
                let key = first_key + i;
                self.get(key).map(|v| (key, v))
            })
            .collect()
    }

    /// Inserts a new record. Fails with [`KvError::DuplicateKey`] if
    /// `key` already exists.
    fn insert(&mut self, key: i64, value: &[u8]) -> Result<()> {
        if self.contains(key)? {
            return Err(KvError::DuplicateKey(key).into());
        }
        self.set(key, value)
    }

    /// Overwrites an existing record. Fails with [`KvError::MissingKey`]
    /// if `key` doesn't exist.
    fn update(&mut self, key: i64, value: &[u8]) -> Result<()> {
        if !self.contains(key)? {
            return Err(KvError::MissingKey(key).into());
        }
        self.set(key, value)
    }

    /// Inserts or overwrites a record unconditionally.
    fn set(&mut self, key: i64, value: &[u8]) -> Result<()>;

    /// Inserts an `i64` record; see [`KvStore::insert`].
    fn insert_int64(&mut self, key: i64, value: i64) -> Result<()> {
        self.insert(key, &encode_i64(value))
    }

    /// Updates an `i64` record; see [`KvStore::update`].
    fn update_int64(&mut self, key: i64, value: i64) -> Result<()> {
        self.update(key, &encode_i64(value))
    }

    /// Atomically adds `delta` to the `i64` record at `key`, returning
    /// the new value. The default implementation is read-modify-write
    /// and is **not** atomic across concurrent handles; backends with a
    /// native atomic increment should override it.
    fn increment_int64(&mut self, key: i64, delta: i64) -> Result<i64> {
        let current = self.get_int64(key)?;
        let updated = current + delta;
        self.set(key, &encode_i64(updated))?;
        Ok(updated)
    }

    /// Sets every `(key, value)` pair in `requests`.
    fn bulk_set(&mut self, requests: &[(i64, Vec<u8>)]) -> Result<()> {
        for (key, value) in requests {
            self.set(*key, value)?;
        }
        Ok(())
    }

    /// Removes every key in `keys`, ignoring misses.
    fn bulk_remove(&mut self, keys: &[i64]) -> Result<()> {
        for &key in keys {
            let _ = self.remove(key);
        }
        Ok(())
    }

    /// Removes a record. Fails with [`KvError::MissingKey`] if absent.
    fn remove(&mut self, key: i64) -> Result<()>;

    /// Number of records currently stored.
    fn number_of_records(&self) -> Result<i64>;

    /// Destroys the backing store. The handle must not be used
    /// afterwards; implementations that can't honor that return
    /// [`KvError::General`] from every later call.
    fn delete_from_disk(&mut self) -> Result<()>;
}

pub(crate) fn encode_i64(value: i64) -> [u8; 8] {
    value.to_ne_bytes()
}

pub(crate) fn decode_i64(bytes: &[u8]) -> Result<i64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| KvError::General(format!("expected 8 bytes for an int64, got {}", bytes.len())))?;
    Ok(i64::from_ne_bytes(arr))
}

/// The concrete backend kinds this crate ships, dispatched without
/// dynamic trait objects via `enum_dispatch`.
#[enum_dispatch(KvStore)]
pub enum Database {
    /// In-process, single-file embedded store
    Embedded(EmbeddedBackend),
    /// Remote cache client, fronted by a big-record sibling
    Remote(RemoteBackend<TcpTransport>),
    /// Opaque one-file-per-record store
    BigFile(BigFileBackend),
    /// MySQL-backed relational store
    #[cfg(feature = "mysql-backend")]
    Relational(relational::RelationalBackend),
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Toy {
        records: std::collections::HashMap<i64, Vec<u8>>,
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
    fn default_insert_update_semantics() {
        let mut toy = Toy {
            records: std::collections::HashMap::new(),
        };
        toy.insert(7, b"hello").unwrap();
        assert!(matches!(
            toy.insert(7, b"again").unwrap_err(),
            crate::error::Error::Kv(KvError::DuplicateKey(7))
        ));
        assert!(toy.contains(7).unwrap());
        assert_eq!(toy.get(7).unwrap(), Some(b"hello".to_vec()));
        toy.remove(7).unwrap();
        assert!(!toy.contains(7).unwrap());
        assert!(matches!(
            toy.remove(7).unwrap_err(),
            crate::error::Error::Kv(KvError::MissingKey(7))
        ));
    }

    #[test]
    fn get_partial_checks_bounds() {
        let mut toy = Toy {
            records: std::collections::HashMap::new(),
        };
        toy.set(1, b"0123456789").unwrap();
        assert_eq!(toy.get_partial(1, 2, 3).unwrap(), b"234".to_vec());
        assert!(matches!(
            toy.get_partial(1, 8, 5).unwrap_err(),
            crate::error::Error::Kv(KvError::OutOfRange { .. })
        ));
    }

    #[test]
    fn int64_round_trip_and_increment() {
        let mut toy = Toy {
            records: std::collections::HashMap::new(),
        };
        toy.insert_int64(1, 10).unwrap();
        assert_eq!(toy.get_int64(1).unwrap(), 10);
        assert_eq!(toy.increment_int64(1, 5).unwrap(), 15);
        assert_eq!(toy.get_int64(1).unwrap(), 15);
    }

    #[test]
    fn bulk_get_preserves_order_and_misses() {
        let mut toy = Toy {
            records: std::collections::HashMap::new(),
        };
        toy.set(1, b"a").unwrap();
        toy.set(3, b"c").unwrap();
        let results = toy.bulk_get(&[1, 2, 3]).unwrap();
        assert_eq!(results, vec![Some(b"a".to_vec()), None, Some(b"c".to_vec())]);
    }
}
