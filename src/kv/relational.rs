// Copyright (c) 2024-present, phylocore developers
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The relational-table backend: one row per record in a MySQL
//! table, `set` implemented as `REPLACE`, `increment` executed inside a
//! server-side transaction. Only compiled with the `mysql-backend`
//! feature, since it's the one backend here that needs a real server to
//! be useful.
#![cfg(feature = "mysql-backend")]

use super::KvStore;
use crate::error::{KvError, Result};
use mysql::prelude::Queryable;
use mysql::{params, Opts, OptsBuilder, Pool, TxOpts};

pub struct RelationalBackend {
    pool: Pool,
    table_name: String,
}

impl RelationalBackend {
    pub fn open(
        host: &str,
        port: u16,
        user: &str,
        password: &str,
        database_name: &str,
        table_name: impl Into<String>,
    ) -> Result<Self> {
        let opts: Opts = OptsBuilder::default()
            .ip_or_hostname(Some(host))
            .tcp_port(port)
            .user(Some(user))
            .pass(Some(password))
            .db_name(Some(database_name))
            .into();
        let pool = Pool::new(opts).map_err(|e| KvError::General(e.to_string()))?;
        let table_name = table_name.into();

        let mut conn = pool.get_conn().map_err(|e| KvError::General(e.to_string()))?;
        conn.query_drop(format!(
            "CREATE TABLE IF NOT EXISTS `{table_name}` (\
                kv_key BIGINT PRIMARY KEY, \
                kv_value LONGBLOB NOT NULL\
            )"
        ))
        .map_err(|e| KvError::General(e.to_string()))?;

        Ok(Self { pool, table_name })
    }
}

impl KvStore for RelationalBackend {
    fn contains(&self, key: i64) -> Result<bool> {
        let mut conn = self.pool.get_conn().map_err(|e| KvError::General(e.to_string()))?;
        let found: Option<i64> = conn
            .exec_first(
                format!("SELECT kv_key FROM `{}` WHERE kv_key = :key", self.table_name),
                params! { "key" => key },
            )
            .map_err(|e| KvError::General(e.to_string()))?;
        Ok(found.is_some())
    }

    fn get(&self, key: i64) -> Result<Option<Vec<u8>>> {
        let mut conn = self.pool.get_conn().map_err(|e| KvError::General(e.to_string()))?;
        conn.exec_first(
            format!("SELECT kv_value FROM `{}` WHERE kv_key = :key", self.table_name),
            params! { "key" => key },
        )
        .map_err(|e| KvError::General(e.to_string()).into())
    }

    fn set(&mut self, key: i64, value: &[u8]) -> Result<()> {
        let mut conn = self.pool.get_conn().map_err(|e| KvError::General(e.to_string()))?;
        conn.exec_drop(
            format!("REPLACE INTO `{}` (kv_key, kv_value) VALUES (:key, :value)", self.table_name),
            params! { "key" => key, "value" => value },
        )
        .map_err(|e| KvError::General(e.to_string()).into())
    }

    fn remove(&mut self, key: i64) -> Result<()> {
        let mut conn = self.pool.get_conn().map_err(|e| KvError::General(e.to_string()))?;
        let result = conn
            .exec_iter(
                format!("DELETE FROM `{}` WHERE kv_key = :key", self.table_name),
                params! { "key" => key },
            )
            .map_err(|e| KvError::General(e.to_string()))?;
        if result.affected_rows() == 0 {
            return Err(KvError::MissingKey(key).into());
        }
        Ok(())
    }

    fn increment_int64(&mut self, key: i64, delta: i64) -> Result<i64> {
        let mut conn = self.pool.get_conn().map_err(|e| KvError::General(e.to_string()))?;
        let mut tx = conn.start_transaction(TxOpts::default()).map_err(|e| KvError::General(e.to_string()))?;

        let current: Option<Vec<u8>> = tx
            .exec_first(
                format!("SELECT kv_value FROM `{}` WHERE kv_key = :key FOR UPDATE", self.table_name),
                params! { "key" => key },
            )
            .map_err(|e| KvError::General(e.to_string()))?;
        let current = match current {
            Some(bytes) => super::decode_i64(&bytes)?,
            None => 0,
        };
        let updated = current + delta;
        tx.exec_drop(
            format!("REPLACE INTO `{}` (kv_key, kv_value) VALUES (:key, :value)", self.table_name),
            params! { "key" => key, "value" => super::encode_i64(updated).to_vec() },
        )
        .map_err(|e| KvError::General(e.to_string()))?;
        tx.commit().map_err(|e| KvError::General(e.to_string()))?;
        Ok(updated)
    }

    fn number_of_records(&self) -> Result<i64> {
        let mut conn = self.pool.get_conn().map_err(|e| KvError::General(e.to_string()))?;
        let count: i64 = conn
            .query_first(format!("SELECT COUNT(*) FROM `{}`", self.table_name))
            .map_err(|e| KvError::General(e.to_string()))?
            .unwrap_or(0);
        Ok(count)
    }

    fn delete_from_disk(&mut self) -> Result<()> {
        let mut conn = self.pool.get_conn().map_err(|e| KvError::General(e.to_string()))?;
        conn.query_drop(format!("DROP TABLE IF EXISTS `{}`", self.table_name))
            .map_err(|e| KvError::General(e.to_string()).into())
    }
}
