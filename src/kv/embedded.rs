// Copyright (c) 2024-present, phylocore developers
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! An in-process, single-file embedded [`KvStore`] backend, recovered from
//! and persisted to one append-only log file under
//! [`DatabaseConf::database_dir`].
//!
//! The on-disk format is a sequence of records:
//!
//! ```text
//! key: i64 (little-endian)
//! tombstone: u8 (0 = live, 1 = deleted)
//! len: u32 (little-endian, only present when tombstone == 0)
//! value: [u8; len]
//! ```
//!
//! Opening the store replays the whole log into an in-memory index; a
//! `set`/`remove` appends one record and updates the index in lockstep.
//! [`EmbeddedBackend::compact`] rewrites the log with only live records,
//! which callers should run periodically as tombstones and overwrites
//! accumulate.

use super::KvStore;
use crate::error::{KvError, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const LOG_FILE_NAME: &str = "phylocore.db";

/// A single-file, in-process embedded store.
pub struct EmbeddedBackend {
    path: PathBuf,
    log: BufWriter<File>,
    index: BTreeMap<i64, Vec<u8>>,
}

impl EmbeddedBackend {
    /// Opens (or creates) the embedded store rooted at `database_dir`,
    /// replaying its log file into memory.
    pub fn open(database_dir: impl AsRef<Path>) -> Result<Self> {
        let database_dir = database_dir.as_ref();
        std::fs::create_dir_all(database_dir)?;
        let path = database_dir.join(LOG_FILE_NAME);

        log::debug!("opening embedded kv store at {path:?}");

        let index = if path.try_exists()? {
            replay(&path)?
        } else {
            BTreeMap::new()
        };

        let file = OpenOptions::new().create(true).append(true).read(true).open(&path)?;
        Ok(Self {
            path,
            log: BufWriter::new(file),
            index,
        })
    }

    fn append_live(&mut self, key: i64, value: &[u8]) -> Result<()> {
        self.log.write_i64::<LittleEndian>(key)?;
        self.log.write_u8(0)?;
        self.log.write_u32::<LittleEndian>(value.len() as u32)?;
        self.log.write_all(value)?;
        self.log.flush()?;
        Ok(())
    }

    fn append_tombstone(&mut self, key: i64) -> Result<()> {
        self.log.write_i64::<LittleEndian>(key)?;
        self.log.write_u8(1)?;
        self.log.flush()?;
        Ok(())
    }

    /// Rewrites the log file to contain only the current live records,
    /// discarding tombstones and superseded overwrites.
    pub fn compact(&mut self) -> Result<()> {
        log::debug!("compacting embedded kv store at {:?}", self.path);
        let tmp_path = self.path.with_extension("compacting");
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);
            for (&key, value) in &self.index {
                tmp.write_i64::<LittleEndian>(key)?;
                tmp.write_u8(0)?;
                tmp.write_u32::<LittleEndian>(value.len() as u32)?;
                tmp.write_all(value)?;
            }
            tmp.flush()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().create(true).append(true).read(true).open(&self.path)?;
        self.log = BufWriter::new(file);
        Ok(())
    }
}

fn replay(path: &Path) -> Result<BTreeMap<i64, Vec<u8>>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut index = BTreeMap::new();

    loop {
        let key = match reader.read_i64::<LittleEndian>() {
            Ok(key) => key,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        let tombstone = reader.read_u8()?;
        if tombstone == 1 {
            index.remove(&key);
            continue;
        }
        let len = reader.read_u32::<LittleEndian>()? as usize;
        let mut value = vec![0u8; len];
        reader.read_exact(&mut value)?;
        index.insert(key, value);
    }

    Ok(index)
}

impl KvStore for EmbeddedBackend {
    fn contains(&self, key: i64) -> Result<bool> {
        Ok(self.index.contains_key(&key))
    }

    fn get(&self, key: i64) -> Result<Option<Vec<u8>>> {
        Ok(self.index.get(&key).cloned())
    }

    fn set(&mut self, key: i64, value: &[u8]) -> Result<()> {
        self.append_live(key, value)?;
        self.index.insert(key, value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: i64) -> Result<()> {
        if self.index.remove(&key).is_none() {
            return Err(KvError::MissingKey(key).into());
        }
        self.append_tombstone(key)
    }

    fn number_of_records(&self) -> Result<i64> {
        Ok(self.index.len() as i64)
    }

    fn delete_from_disk(&mut self) -> Result<()> {
        self.index.clear();
        std::fs::remove_file(&self.path).or_else(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Ok(())
            } else {
                Err(e)
            }
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = EmbeddedBackend::open(dir.path()).unwrap();

        backend.set(1, b"hello").unwrap();
        backend.set(2, b"world").unwrap();
        assert_eq!(backend.get(1).unwrap(), Some(b"hello".to_vec()));
        assert!(backend.contains(2).unwrap());

        backend.remove(1).unwrap();
        assert!(!backend.contains(1).unwrap());
        assert_eq!(backend.number_of_records().unwrap(), 1);
    }

    #[test]
    fn reopening_replays_the_log() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut backend = EmbeddedBackend::open(dir.path()).unwrap();
            backend.set(1, b"hello").unwrap();
            backend.set(1, b"overwritten").unwrap();
            backend.set(2, b"world").unwrap();
            backend.remove(2).unwrap();
        }
        let reopened = EmbeddedBackend::open(dir.path()).unwrap();
        assert_eq!(reopened.get(1).unwrap(), Some(b"overwritten".to_vec()));
        assert_eq!(reopened.get(2).unwrap(), None);
        assert_eq!(reopened.number_of_records().unwrap(), 1);
    }

    #[test]
    fn compact_preserves_live_records_and_shrinks_log() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = EmbeddedBackend::open(dir.path()).unwrap();
        for k in 0..20i64 {
            backend.set(k, b"value").unwrap();
            backend.set(k, b"value-overwritten").unwrap();
        }
        for k in 0..10i64 {
            backend.remove(k).unwrap();
        }
        let before = std::fs::metadata(&backend.path).unwrap().len();
        backend.compact().unwrap();
        let after = std::fs::metadata(&backend.path).unwrap().len();
        assert!(after < before);
        for k in 10..20i64 {
            assert_eq!(backend.get(k).unwrap(), Some(b"value-overwritten".to_vec()));
        }
        for k in 0..10i64 {
            assert_eq!(backend.get(k).unwrap(), None);
        }
    }

    #[test]
    fn delete_from_disk_removes_the_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = EmbeddedBackend::open(dir.path()).unwrap();
        backend.set(1, b"hello").unwrap();
        let path = backend.path.clone();
        backend.delete_from_disk().unwrap();
        assert!(!path.exists());
        assert_eq!(backend.number_of_records().unwrap(), 0);
    }
}
