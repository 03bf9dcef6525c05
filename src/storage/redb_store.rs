// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded ledger store backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `values`: key → string (balances, nonces, JSON records)
//! - `set_members`: (set, member) → ()
//! - `list_items`: (list, inverted_seq) → string, newest first on forward scan
//! - `list_heads`: list → last sequence number
//! - `leases`: key → expiry_ms_be ‖ token
//!
//! Every trait method runs in its own write or read transaction, and redb
//! serialises writers, so each call is atomic with respect to the others.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable, Table, TableDefinition};

use super::{parse_float, parse_int, KvStore, StoreResult};

// =============================================================================
// Table Definitions
// =============================================================================

const VALUES: TableDefinition<&str, &str> = TableDefinition::new("values");

const SET_MEMBERS: TableDefinition<(&str, &str), ()> = TableDefinition::new("set_members");

/// Key is `(list, u64::MAX - seq)` so that a forward range scan yields newest first.
const LIST_ITEMS: TableDefinition<(&str, u64), &str> = TableDefinition::new("list_items");

const LIST_HEADS: TableDefinition<&str, u64> = TableDefinition::new("list_heads");

const LEASES: TableDefinition<&str, &[u8]> = TableDefinition::new("leases");

// =============================================================================
// Helpers
// =============================================================================

fn add_float(
    table: &mut Table<'_, &'static str, &'static str>,
    key: &str,
    delta: f64,
) -> StoreResult<f64> {
    let current = match table.get(key)?.map(|v| v.value().to_string()) {
        Some(raw) => parse_float(key, &raw)?,
        None => 0.0,
    };
    let next = current + delta;
    table.insert(key, next.to_string().as_str())?;
    Ok(next)
}

fn encode_lease(expires_at_ms: i64, token: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(8 + token.len());
    bytes.extend_from_slice(&expires_at_ms.to_be_bytes());
    bytes.extend_from_slice(token.as_bytes());
    bytes
}

fn decode_lease(bytes: &[u8]) -> Option<(i64, &str)> {
    let (expiry, token) = bytes.split_at_checked(8)?;
    let expiry = i64::from_be_bytes(expiry.try_into().ok()?);
    Some((expiry, std::str::from_utf8(token).ok()?))
}

// =============================================================================
// RedbStore
// =============================================================================

/// Durable [`KvStore`] in a single redb file.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(VALUES)?;
            let _ = write_txn.open_table(SET_MEMBERS)?;
            let _ = write_txn.open_table(LIST_ITEMS)?;
            let _ = write_txn.open_table(LIST_HEADS)?;
            let _ = write_txn.open_table(LEASES)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }
}

impl KvStore for RedbStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(VALUES)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(VALUES)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(VALUES)?;
            let existed = table.remove(key)?.is_some();
            existed
        };
        write_txn.commit()?;
        Ok(existed)
    }

    fn set_many(&self, values: &[(&str, &str)], set_members: &[(&str, &str)]) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(VALUES)?;
            for (key, value) in values {
                table.insert(*key, *value)?;
            }
            let mut sets = write_txn.open_table(SET_MEMBERS)?;
            for (set, member) in set_members {
                sets.insert((*set, *member), ())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn incr_by_float(&self, key: &str, delta: f64) -> StoreResult<f64> {
        let write_txn = self.db.begin_write()?;
        let next = {
            let mut table = write_txn.open_table(VALUES)?;
            add_float(&mut table, key, delta)?
        };
        write_txn.commit()?;
        Ok(next)
    }

    fn incr(&self, key: &str) -> StoreResult<i64> {
        let write_txn = self.db.begin_write()?;
        let next = {
            let mut table = write_txn.open_table(VALUES)?;
            let current = match table.get(key)?.map(|v| v.value().to_string()) {
                Some(raw) => parse_int(key, &raw)?,
                None => 0,
            };
            let next = current + 1;
            table.insert(key, next.to_string().as_str())?;
            next
        };
        write_txn.commit()?;
        Ok(next)
    }

    fn set_add(&self, set: &str, member: &str) -> StoreResult<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(SET_MEMBERS)?;
            let existed = table.insert((set, member), ())?.is_some();
            existed
        };
        write_txn.commit()?;
        Ok(!existed)
    }

    fn set_is_member(&self, set: &str, member: &str) -> StoreResult<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SET_MEMBERS)?;
        Ok(table.get((set, member))?.is_some())
    }

    fn set_members(&self, set: &str) -> StoreResult<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SET_MEMBERS)?;
        let mut members = Vec::new();
        for entry in table.range((set, "")..)? {
            let (key, _) = entry?;
            let (owner, member) = key.value();
            if owner != set {
                break;
            }
            members.push(member.to_string());
        }
        Ok(members)
    }

    fn list_push_front(&self, key: &str, value: &str) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut heads = write_txn.open_table(LIST_HEADS)?;
            let seq = heads.get(key)?.map(|v| v.value()).unwrap_or(0) + 1;
            heads.insert(key, seq)?;

            let mut items = write_txn.open_table(LIST_ITEMS)?;
            items.insert((key, u64::MAX - seq), value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn list_range(&self, key: &str, limit: usize) -> StoreResult<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(LIST_ITEMS)?;
        let mut values = Vec::with_capacity(limit.min(64));
        for entry in table.range((key, 0u64)..=(key, u64::MAX))? {
            if values.len() >= limit {
                break;
            }
            let (_, value) = entry?;
            values.push(value.value().to_string());
        }
        Ok(values)
    }

    fn claim_and_increment(
        &self,
        set: &str,
        member: &str,
        counter: &str,
        delta: f64,
    ) -> StoreResult<Option<f64>> {
        let write_txn = self.db.begin_write()?;
        let next = {
            let mut sets = write_txn.open_table(SET_MEMBERS)?;
            if sets.get((set, member))?.is_some() {
                None
            } else {
                sets.insert((set, member), ())?;
                let mut values = write_txn.open_table(VALUES)?;
                Some(add_float(&mut values, counter, delta)?)
            }
        };
        match next {
            Some(_) => write_txn.commit()?,
            None => write_txn.abort()?,
        }
        Ok(next)
    }

    fn try_acquire(&self, key: &str, token: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Utc::now().timestamp_millis();
        let write_txn = self.db.begin_write()?;
        let acquired = {
            let mut table = write_txn.open_table(LEASES)?;
            let held = table
                .get(key)?
                .and_then(|v| decode_lease(v.value()).map(|(expiry, _)| expiry > now))
                .unwrap_or(false);
            if held {
                false
            } else {
                let expires_at = now.saturating_add(ttl.as_millis() as i64);
                table.insert(key, encode_lease(expires_at, token).as_slice())?;
                true
            }
        };
        write_txn.commit()?;
        Ok(acquired)
    }

    fn release(&self, key: &str, token: &str) -> StoreResult<bool> {
        let write_txn = self.db.begin_write()?;
        let released = {
            let mut table = write_txn.open_table(LEASES)?;
            let ours = table
                .get(key)?
                .and_then(|v| decode_lease(v.value()).map(|(_, holder)| holder == token))
                .unwrap_or(false);
            if ours {
                table.remove(key)?;
            }
            ours
        };
        write_txn.commit()?;
        Ok(released)
    }
}
