// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Scoped leases on store keys.
//!
//! A lease is a `lock:*` entry holding a random token and an expiry. The
//! guard releases it on drop, so every exit path of the critical section
//! (including `?` and panics) gives it back. A crashed holder's lease simply
//! expires.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::{KvStore, StoreResult};

/// Default lease lifetime. Long enough to cover an on-chain broadcast.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(300);

/// Held lease; released when dropped.
pub struct LeaseGuard {
    store: Arc<dyn KvStore>,
    key: String,
    token: String,
}

impl LeaseGuard {
    /// Try to take the lease at `key`. Returns `Ok(None)` if someone else holds it.
    pub fn acquire(
        store: &Arc<dyn KvStore>,
        key: impl Into<String>,
        ttl: Duration,
    ) -> StoreResult<Option<Self>> {
        let key = key.into();
        let token = Uuid::new_v4().to_string();
        if store.try_acquire(&key, &token, ttl)? {
            Ok(Some(Self {
                store: Arc::clone(store),
                key,
                token,
            }))
        } else {
            Ok(None)
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if let Err(e) = self.store.release(&self.key, &self.token) {
            tracing::warn!(key = %self.key, error = %e, "Failed to release lease, it will expire");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn guard_is_exclusive_and_released_on_drop() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());

        let first = LeaseGuard::acquire(&store, "lock:withdraw:0xa", DEFAULT_LEASE_TTL)
            .unwrap()
            .expect("first acquire");
        assert!(LeaseGuard::acquire(&store, "lock:withdraw:0xa", DEFAULT_LEASE_TTL)
            .unwrap()
            .is_none());

        drop(first);

        assert!(LeaseGuard::acquire(&store, "lock:withdraw:0xa", DEFAULT_LEASE_TTL)
            .unwrap()
            .is_some());
    }

    #[test]
    fn guard_released_on_error_path() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());

        fn critical(store: &Arc<dyn KvStore>) -> Result<(), &'static str> {
            let _guard = LeaseGuard::acquire(store, "lock:push:o1", DEFAULT_LEASE_TTL)
                .unwrap()
                .ok_or("busy")?;
            Err("transfer failed")
        }

        assert_eq!(critical(&store), Err("transfer failed"));
        assert_eq!(critical(&store), Err("transfer failed"));
    }
}
