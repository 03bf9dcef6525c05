// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Key-Value Storage
//!
//! The ledger, binding registry and partner token cache all live in a small
//! string-keyed store. Every method on [`KvStore`] is atomic on its own; no
//! method spans more than one call, so handlers that need stronger guarantees
//! compose the primitives below (`claim_and_increment`, leases).
//!
//! ## Backends
//!
//! - [`RedbStore`] - embedded ACID database file under `DATA_DIR`
//! - [`MemoryStore`] - process-local maps, used by tests and `STORE_BACKEND=memory`
//!
//! ## Key Layout
//!
//! ```text
//! balance:{addr}            float accumulator
//! nonce:{addr}              integer counter
//! orders:{addr}             list, newest first
//! withdrawals:{addr}        list, newest first
//! push:{order_id}           JSON push record
//! processed_orders          set of credited order / asset ids
//! binding:address:{addr}    JSON binding record
//! binding:user:{user_id}    JSON binding record
//! bound_addresses           set of bound addresses
//! asset_sync:{addr}         last sync timestamp (ms)
//! pending_withdraw:{addr}   JSON signed payout awaiting confirmation
//! settled_withdrawals       set of payout tx hashes already debited
//! partner:token             JSON partner token cache
//! lock:*                    leases
//! ```

use std::time::Duration;

pub mod keys;
pub mod lease;
pub mod memory;
pub mod redb_store;

pub use lease::{LeaseGuard, DEFAULT_LEASE_TTL};
pub use memory::MemoryStore;
pub use redb_store::RedbStore;

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("value at {key} is not a number: {value}")]
    NotANumber { key: String, value: String },

    #[error("store lock poisoned")]
    Poisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// String-keyed store with counters, sets, lists and leases.
///
/// Shared across handlers as `Arc<dyn KvStore>`.
pub trait KvStore: Send + Sync {
    /// Read a plain value.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Overwrite a plain value.
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Remove a plain value. Returns `true` if it existed.
    fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Write several plain values in one transaction, optionally adding
    /// members to sets in the same transaction.
    fn set_many(&self, values: &[(&str, &str)], set_members: &[(&str, &str)]) -> StoreResult<()>;

    /// Atomically add `delta` to a float value (missing = 0) and return the result.
    fn incr_by_float(&self, key: &str, delta: f64) -> StoreResult<f64>;

    /// Atomically add one to an integer value (missing = 0) and return the result.
    fn incr(&self, key: &str) -> StoreResult<i64>;

    /// Add a member to a set. Returns `true` if it was not present before.
    fn set_add(&self, set: &str, member: &str) -> StoreResult<bool>;

    /// Check set membership.
    fn set_is_member(&self, set: &str, member: &str) -> StoreResult<bool>;

    /// All members of a set, in no particular order.
    fn set_members(&self, set: &str) -> StoreResult<Vec<String>>;

    /// Prepend a value to a list.
    fn list_push_front(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Read up to `limit` values from the front of a list.
    fn list_range(&self, key: &str, limit: usize) -> StoreResult<Vec<String>>;

    /// Add `member` to `set` and, only if it was newly added, add `delta` to
    /// the float at `counter`, all in one transaction.
    ///
    /// Returns the new counter value, or `None` when the member was already
    /// in the set (nothing is written in that case).
    fn claim_and_increment(
        &self,
        set: &str,
        member: &str,
        counter: &str,
        delta: f64,
    ) -> StoreResult<Option<f64>>;

    /// Take the lease at `key` for `token` if it is free or expired.
    fn try_acquire(&self, key: &str, token: &str, ttl: Duration) -> StoreResult<bool>;

    /// Drop the lease at `key` if it is still held by `token`.
    fn release(&self, key: &str, token: &str) -> StoreResult<bool>;

    /// Cheap liveness probe for health checks.
    fn ping(&self) -> StoreResult<()> {
        self.get("__ping__").map(|_| ())
    }
}

pub(crate) fn parse_float(key: &str, raw: &str) -> StoreResult<f64> {
    raw.parse::<f64>().map_err(|_| StoreError::NotANumber {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

pub(crate) fn parse_int(key: &str, raw: &str) -> StoreResult<i64> {
    raw.parse::<i64>().map_err(|_| StoreError::NotANumber {
        key: key.to_string(),
        value: raw.to_string(),
    })
}
