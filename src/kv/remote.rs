// Copyright (c) 2024-present, phylocore developers
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The remote cache backend: a session to a remote key -> value server,
//! with oversize records diverted
//! to a sibling [`BigFileBackend`] and bulk writes flushed once a byte or
//! record-count threshold is about to be exceeded.
//!
//! [`RemoteBackend`] is generic over a [`Transport`], the wire-level
//! session to the server. [`LoopbackTransport`] keeps everything in
//! process (used by tests and by callers who want the remote contract
//! without an actual network hop); [`TcpTransport`] speaks a small
//! length-prefixed, big-endian protocol over a real `TcpStream`.
//!
//! Retry policy (an explicit choice the abstract contract leaves open):
//! a [`KvError::RetryTransaction`] from the transport is retried up to
//! [`RemoteBackend::DEFAULT_RETRY_LIMIT`] times with no backoff; any other
//! error propagates immediately.

use super::bigfile::BigFileBackend;
use super::KvStore;
use crate::error::{Error, KvError, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;

/// The wire-level session a [`RemoteBackend`] talks to.
///
/// Every method takes `&mut self`: a session is not assumed to be safely
/// shared between concurrent callers (mirrors the single-owner rule the
/// rest of the KV layer follows).
pub trait Transport {
    fn contains(&mut self, key: i64) -> Result<bool>;
    fn get(&mut self, key: i64) -> Result<Option<Vec<u8>>>;
    fn get_partial(&mut self, key: i64, offset: i64, len: i64) -> Result<Vec<u8>>;
    fn set(&mut self, key: i64, value: &[u8]) -> Result<()>;
    fn remove(&mut self, key: i64) -> Result<()>;
    fn increment_int64(&mut self, key: i64, delta: i64) -> Result<i64>;
    fn bulk_set(&mut self, requests: &[(i64, Vec<u8>)]) -> Result<()>;
    fn number_of_records(&mut self) -> Result<i64>;
    fn delete_from_disk(&mut self) -> Result<()>;
}

/// An in-process stand-in for a remote session, used by tests and by
/// embedders that want the remote contract's semantics without an actual
/// network round trip.
#[derive(Default)]
pub struct LoopbackTransport {
    records: BTreeMap<i64, Vec<u8>>,
}

impl LoopbackTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for LoopbackTransport {
    fn contains(&mut self, key: i64) -> Result<bool> {
        Ok(self.records.contains_key(&key))
    }

    fn get(&mut self, key: i64) -> Result<Option<Vec<u8>>> {
        Ok(self.records.get(&key).cloned())
    }

    fn get_partial(&mut self, key: i64, offset: i64, len: i64) -> Result<Vec<u8>> {
        let record = self.records.get(&key).ok_or(KvError::MissingKey(key))?;
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

    fn set(&mut self, key: i64, value: &[u8]) -> Result<()> {
        self.records.insert(key, value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: i64) -> Result<()> {
        self.records.remove(&key).map(|_| ()).ok_or_else(|| KvError::MissingKey(key).into())
    }

    fn increment_int64(&mut self, key: i64, delta: i64) -> Result<i64> {
        let current = match self.records.get(&key) {
            Some(bytes) => super::decode_i64(bytes)?,
            None => 0,
        };
        let updated = current + delta;
        self.records.insert(key, super::encode_i64(updated).to_vec());
        Ok(updated)
    }

    fn bulk_set(&mut self, requests: &[(i64, Vec<u8>)]) -> Result<()> {
        for (key, value) in requests {
            self.records.insert(*key, value.clone());
        }
        Ok(())
    }

    fn number_of_records(&mut self) -> Result<i64> {
        Ok(self.records.len() as i64)
    }

    fn delete_from_disk(&mut self) -> Result<()> {
        self.records.clear();
        Ok(())
    }
}

/// The opcodes of [`TcpTransport`]'s wire protocol. Every request is
/// `opcode: u8, key: i64 (big-endian), payload...`; every response is
/// `status: u8, payload...`, with `status == 0` meaning success.
#[repr(u8)]
enum Opcode {
    Contains = 0,
    Get = 1,
    GetPartial = 2,
    Set = 3,
    Remove = 4,
    Increment = 5,
    NumberOfRecords = 6,
    DeleteFromDisk = 7,
}

/// A session to a real remote server over a [`TcpStream`], using a small
/// length-prefixed, all-big-endian protocol: every integer sent to the
/// remote is converted to big-endian wire form.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port))?;
        Ok(Self { stream })
    }

    fn write_request(&mut self, opcode: Opcode, key: i64, payload: &[u8]) -> Result<()> {
        self.stream.write_u8(opcode as u8)?;
        self.stream.write_i64::<BigEndian>(key)?;
        self.stream.write_u32::<BigEndian>(payload.len() as u32)?;
        self.stream.write_all(payload)?;
        self.stream.flush()?;
        Ok(())
    }

    fn read_response(&mut self) -> Result<Vec<u8>> {
        let status = self.stream.read_u8()?;
        let len = self.stream.read_u32::<BigEndian>()? as usize;
        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload)?;
        if status != 0 {
            let message = String::from_utf8_lossy(&payload).into_owned();
            return Err(KvError::General(message).into());
        }
        Ok(payload)
    }
}

impl Transport for TcpTransport {
    fn contains(&mut self, key: i64) -> Result<bool> {
        self.write_request(Opcode::Contains, key, &[])?;
        Ok(self.read_response()?.first().copied().unwrap_or(0) != 0)
    }

    fn get(&mut self, key: i64) -> Result<Option<Vec<u8>>> {
        self.write_request(Opcode::Get, key, &[])?;
        let payload = self.read_response()?;
        if payload.is_empty() {
            Ok(None)
        } else {
            Ok(Some(payload))
        }
    }

    fn get_partial(&mut self, key: i64, offset: i64, len: i64) -> Result<Vec<u8>> {
        let mut request = Vec::with_capacity(16);
        request.write_i64::<BigEndian>(offset)?;
        request.write_i64::<BigEndian>(len)?;
        self.write_request(Opcode::GetPartial, key, &request)?;
        self.read_response()
    }

    fn set(&mut self, key: i64, value: &[u8]) -> Result<()> {
        self.write_request(Opcode::Set, key, value)?;
        self.read_response().map(|_| ())
    }

    fn remove(&mut self, key: i64) -> Result<()> {
        self.write_request(Opcode::Remove, key, &[])?;
        self.read_response().map(|_| ())
    }

    fn increment_int64(&mut self, key: i64, delta: i64) -> Result<i64> {
        let mut request = Vec::with_capacity(8);
        request.write_i64::<BigEndian>(delta)?;
        self.write_request(Opcode::Increment, key, &request)?;
        let payload = self.read_response()?;
        let arr: [u8; 8] = payload.try_into().map_err(|_| KvError::General("malformed increment response".into()))?;
        Ok(i64::from_be_bytes(arr))
    }

    fn bulk_set(&mut self, requests: &[(i64, Vec<u8>)]) -> Result<()> {
        for (key, value) in requests {
            self.set(*key, value)?;
        }
        Ok(())
    }

    fn number_of_records(&mut self) -> Result<i64> {
        self.write_request(Opcode::NumberOfRecords, 0, &[])?;
        let payload = self.read_response()?;
        let arr: [u8; 8] = payload.try_into().map_err(|_| KvError::General("malformed count response".into()))?;
        Ok(i64::from_be_bytes(arr))
    }

    fn delete_from_disk(&mut self) -> Result<()> {
        self.write_request(Opcode::DeleteFromDisk, 0, &[])?;
        self.read_response().map(|_| ())
    }
}

/// A session to a remote KV server, with oversize records transparently
/// diverted to a sibling [`BigFileBackend`].
pub struct RemoteBackend<T> {
    // A session's `Transport` methods all take `&mut self`, but the
    // abstract KV contract exposes reads as `&self`; a `RefCell` gives the
    // session interior mutability without resorting to unsafe code.
    transport: RefCell<T>,
    big_file: BigFileBackend,
    max_record_size: i64,
    max_bulk_set_size: i64,
    max_bulk_set_num_records: i64,
    retry_limit: u32,
}

impl<T: Transport> RemoteBackend<T> {
    pub const DEFAULT_RETRY_LIMIT: u32 = 3;

    pub fn new(
        transport: T,
        database_dir: impl AsRef<Path>,
        database_name: impl Into<String>,
        max_record_size: i64,
        max_bulk_set_size: i64,
        max_bulk_set_num_records: i64,
    ) -> Result<Self> {
        Ok(Self {
            transport: RefCell::new(transport),
            big_file: BigFileBackend::open(database_dir, database_name)?,
            max_record_size,
            max_bulk_set_size,
            max_bulk_set_num_records,
            retry_limit: Self::DEFAULT_RETRY_LIMIT,
        })
    }

    fn with_retry<R>(&self, mut op: impl FnMut(&mut T) -> Result<R>) -> Result<R> {
        let mut attempts = 0;
        loop {
            match op(&mut self.transport.borrow_mut()) {
                Err(Error::Kv(KvError::RetryTransaction)) if attempts < self.retry_limit => {
                    attempts += 1;
                    log::debug!("remote kv operation raised a transient error, retry {attempts}/{}", self.retry_limit);
                }
                other => return other,
            }
        }
    }

    fn is_oversize(&self, value: &[u8]) -> bool {
        value.len() as i64 > self.max_record_size
    }
}

impl<T: Transport> KvStore for RemoteBackend<T> {
    fn contains(&self, key: i64) -> Result<bool> {
        if self.big_file.contains(key)? {
            return Ok(true);
        }
        self.with_retry(|transport| transport.contains(key))
    }

    fn get(&self, key: i64) -> Result<Option<Vec<u8>>> {
        if self.big_file.contains(key)? {
            return self.big_file.get(key);
        }
        self.with_retry(|transport| transport.get(key))
    }

    fn get_partial(&self, key: i64, offset: i64, len: i64) -> Result<Vec<u8>> {
        if self.big_file.contains(key)? {
            return self.big_file.get_partial(key, offset, len);
        }
        self.with_retry(|transport| transport.get_partial(key, offset, len))
    }

    fn set(&mut self, key: i64, value: &[u8]) -> Result<()> {
        if self.is_oversize(value) {
            if self.with_retry(|transport| transport.contains(key))? {
                let _ = self.with_retry(|transport| transport.remove(key));
            }
            return self.big_file.set(key, value);
        }
        if self.big_file.contains(key)? {
            self.big_file.remove(key)?;
        }
        self.with_retry(|transport| transport.set(key, value))
    }

    fn remove(&mut self, key: i64) -> Result<()> {
        if self.big_file.contains(key)? {
            return self.big_file.remove(key);
        }
        self.with_retry(|transport| transport.remove(key))
    }

    fn increment_int64(&mut self, key: i64, delta: i64) -> Result<i64> {
        self.with_retry(|transport| transport.increment_int64(key, delta))
    }

    fn bulk_set(&mut self, requests: &[(i64, Vec<u8>)]) -> Result<()> {
        let mut batch: Vec<(i64, Vec<u8>)> = Vec::new();
        let mut batch_bytes: i64 = 0;

        for (key, value) in requests {
            if self.is_oversize(value) {
                self.set(*key, value)?;
                continue;
            }
            if !batch.is_empty()
                && (batch_bytes + value.len() as i64 > self.max_bulk_set_size
                    || batch.len() as i64 + 1 > self.max_bulk_set_num_records)
            {
                self.with_retry(|transport| transport.bulk_set(&batch))?;
                batch.clear();
                batch_bytes = 0;
            }
            batch_bytes += value.len() as i64;
            batch.push((*key, value.clone()));
        }
        if !batch.is_empty() {
            self.with_retry(|transport| transport.bulk_set(&batch))?;
        }
        Ok(())
    }

    fn number_of_records(&self) -> Result<i64> {
        let remote_count = self.with_retry(|transport| transport.number_of_records())?;
        Ok(remote_count + self.big_file.number_of_records()?)
    }

    fn delete_from_disk(&mut self) -> Result<()> {
        self.with_retry(|transport| transport.delete_from_disk())?;
        self.big_file.delete_from_disk()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_backend(max_record_size: i64) -> RemoteBackend<LoopbackTransport> {
        let dir = tempfile::tempdir().unwrap();
        // Leak the tempdir for the duration of the test backend; fine at
        // this scope since tests are short-lived processes.
        let path = dir.keep();
        RemoteBackend::new(LoopbackTransport::new(), path, "phylo", max_record_size, 1024, 100).unwrap()
    }

    #[test]
    fn small_records_go_through_the_transport() {
        let mut backend = make_backend(1024);
        backend.set(1, b"hello").unwrap();
        assert_eq!(backend.get(1).unwrap(), Some(b"hello".to_vec()));
        assert_eq!(backend.number_of_records().unwrap(), 1);
    }

    #[test]
    fn oversize_records_are_diverted_to_the_big_file_backend() {
        let mut backend = make_backend(4);
        backend.set(1, b"this record is too large for the remote").unwrap();
        assert_eq!(backend.get(1).unwrap(), Some(b"this record is too large for the remote".to_vec()));
        assert!(backend.big_file.contains(1).unwrap());
    }

    #[test]
    fn resizing_a_record_moves_it_between_backends() {
        let mut backend = make_backend(8);
        backend.set(1, b"small").unwrap();
        assert!(!backend.big_file.contains(1).unwrap());
        backend.set(1, b"now this value is much too large").unwrap();
        assert!(backend.big_file.contains(1).unwrap());
    }

    #[test]
    fn increment_is_native_to_the_transport() {
        let mut backend = make_backend(1024);
        backend.insert_int64(1, 10).unwrap();
        assert_eq!(backend.increment_int64(1, 5).unwrap(), 15);
    }

    #[test]
    fn bulk_set_flushes_on_record_count_threshold() {
        let mut backend = make_backend(1024);
        let requests: Vec<(i64, Vec<u8>)> = (0..250).map(|k| (k, vec![k as u8; 1])).collect();
        backend.bulk_set(&requests).unwrap();
        assert_eq!(backend.number_of_records().unwrap(), 250);
    }
}
