// Copyright (c) 2024-present, phylocore developers
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The opaque big-record-file backend: one file per record under
//! `database_dir`, named `<database_name>.BIG__RECORD__FILE__<key>`.
//!
//! In-memory state is just an ordered set of known keys; every read or
//! write goes straight to the filesystem. This backend exists to hold the
//! rare oversize record a [`RemoteBackend`](super::remote::RemoteBackend)
//! diverts away from its session once `max_record_size` is exceeded.

use super::KvStore;
use crate::error::{KvError, Result};
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Hard cap on files per directory.
pub const MAX_FILES_PER_DIRECTORY: usize = 2048;

pub struct BigFileBackend {
    database_dir: PathBuf,
    database_name: String,
    keys: BTreeSet<i64>,
}

impl BigFileBackend {
    /// Opens (or creates) the big-file store, scanning `database_dir` for
    /// existing `<database_name>.BIG__RECORD__FILE__<key>` files.
    pub fn open(database_dir: impl AsRef<Path>, database_name: impl Into<String>) -> Result<Self> {
        let database_dir = database_dir.as_ref().to_path_buf();
        let database_name = database_name.into();
        fs::create_dir_all(&database_dir)?;

        let prefix = format!("{database_name}.BIG__RECORD__FILE__");
        let mut keys = BTreeSet::new();
        for entry in fs::read_dir(&database_dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(suffix) = file_name.strip_prefix(&prefix) {
                if let Ok(key) = suffix.parse::<i64>() {
                    keys.insert(key);
                }
            }
        }

        Ok(Self {
            database_dir,
            database_name,
            keys,
        })
    }

    fn path_for(&self, key: i64) -> PathBuf {
        self.database_dir
            .join(format!("{}.BIG__RECORD__FILE__{key}", self.database_name))
    }
}

impl KvStore for BigFileBackend {
    fn contains(&self, key: i64) -> Result<bool> {
        Ok(self.keys.contains(&key))
    }

    fn get(&self, key: i64) -> Result<Option<Vec<u8>>> {
        if !self.keys.contains(&key) {
            return Ok(None);
        }
        let mut buf = Vec::new();
        File::open(self.path_for(key))?.read_to_end(&mut buf)?;
        Ok(Some(buf))
    }

    fn get_partial(&self, key: i64, offset: i64, len: i64) -> Result<Vec<u8>> {
        if !self.keys.contains(&key) {
            return Err(KvError::MissingKey(key).into());
        }
        let mut file = File::open(self.path_for(key))?;
        let record_size = file.metadata()?.len() as i64;
        if offset < 0 || len < 0 || offset + len > record_size {
            return Err(KvError::OutOfRange {
                key,
                offset,
                len,
                record_size,
            }
            .into());
        }
        file.seek(SeekFrom::Start(offset as u64))?;
        let mut buf = vec![0u8; len as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn set(&mut self, key: i64, value: &[u8]) -> Result<()> {
        if !self.keys.contains(&key) && self.keys.len() >= MAX_FILES_PER_DIRECTORY {
            return Err(KvError::Capacity(format!(
                "big-record directory already holds {MAX_FILES_PER_DIRECTORY} files"
            ))
            .into());
        }
        let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(self.path_for(key))?;
        file.write_all(value)?;
        self.keys.insert(key);
        Ok(())
    }

    fn remove(&mut self, key: i64) -> Result<()> {
        if !self.keys.remove(&key) {
            return Err(KvError::MissingKey(key).into());
        }
        fs::remove_file(self.path_for(key))?;
        Ok(())
    }

    fn number_of_records(&self) -> Result<i64> {
        Ok(self.keys.len() as i64)
    }

    fn delete_from_disk(&mut self) -> Result<()> {
        for &key in &self.keys.clone() {
            let _ = fs::remove_file(self.path_for(key));
        }
        self.keys.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = BigFileBackend::open(dir.path(), "phylo").unwrap();
        backend.set(1, b"a very large pretend record").unwrap();
        assert!(backend.contains(1).unwrap());
        assert_eq!(backend.get(1).unwrap(), Some(b"a very large pretend record".to_vec()));
        backend.remove(1).unwrap();
        assert!(!backend.contains(1).unwrap());
    }

    #[test]
    fn get_partial_respects_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = BigFileBackend::open(dir.path(), "phylo").unwrap();
        backend.set(1, b"0123456789").unwrap();
        assert_eq!(backend.get_partial(1, 2, 3).unwrap(), b"234".to_vec());
        assert!(backend.get_partial(1, 8, 5).is_err());
    }

    #[test]
    fn reopening_discovers_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut backend = BigFileBackend::open(dir.path(), "phylo").unwrap();
            backend.set(1, b"hello").unwrap();
            backend.set(2, b"world").unwrap();
        }
        let reopened = BigFileBackend::open(dir.path(), "phylo").unwrap();
        assert_eq!(reopened.number_of_records().unwrap(), 2);
        assert_eq!(reopened.get(2).unwrap(), Some(b"world".to_vec()));
    }

    #[test]
    fn delete_from_disk_removes_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = BigFileBackend::open(dir.path(), "phylo").unwrap();
        backend.set(1, b"a").unwrap();
        backend.set(2, b"b").unwrap();
        backend.delete_from_disk().unwrap();
        assert_eq!(backend.number_of_records().unwrap(), 0);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
