// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Process-local store backed by hash maps.
//!
//! Everything is lost on restart. A single mutex guards all maps, which makes
//! each trait method trivially atomic.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::{parse_float, parse_int, KvStore, StoreError, StoreResult};

#[derive(Default)]
struct Inner {
    values: HashMap<String, String>,
    sets: HashMap<String, HashSet<String>>,
    lists: HashMap<String, VecDeque<String>>,
    leases: HashMap<String, (String, Instant)>,
}

/// In-memory [`KvStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn add_float(values: &mut HashMap<String, String>, key: &str, delta: f64) -> StoreResult<f64> {
    let current = match values.get(key) {
        Some(raw) => parse_float(key, raw)?,
        None => 0.0,
    };
    let next = current + delta;
    values.insert(key.to_string(), next.to_string());
    Ok(next)
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.lock()?.values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.lock()?
            .values
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self.lock()?.values.remove(key).is_some())
    }

    fn set_many(&self, values: &[(&str, &str)], set_members: &[(&str, &str)]) -> StoreResult<()> {
        let mut inner = self.lock()?;
        for (key, value) in values {
            inner.values.insert(key.to_string(), value.to_string());
        }
        for (set, member) in set_members {
            inner
                .sets
                .entry(set.to_string())
                .or_default()
                .insert(member.to_string());
        }
        Ok(())
    }

    fn incr_by_float(&self, key: &str, delta: f64) -> StoreResult<f64> {
        add_float(&mut self.lock()?.values, key, delta)
    }

    fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut inner = self.lock()?;
        let current = match inner.values.get(key) {
            Some(raw) => parse_int(key, raw)?,
            None => 0,
        };
        let next = current + 1;
        inner.values.insert(key.to_string(), next.to_string());
        Ok(next)
    }

    fn set_add(&self, set: &str, member: &str) -> StoreResult<bool> {
        Ok(self
            .lock()?
            .sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    fn set_is_member(&self, set: &str, member: &str) -> StoreResult<bool> {
        Ok(self
            .lock()?
            .sets
            .get(set)
            .is_some_and(|members| members.contains(member)))
    }

    fn set_members(&self, set: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .lock()?
            .sets
            .get(set)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn list_push_front(&self, key: &str, value: &str) -> StoreResult<()> {
        self.lock()?
            .lists
            .entry(key.to_string())
            .or_default()
            .push_front(value.to_string());
        Ok(())
    }

    fn list_range(&self, key: &str, limit: usize) -> StoreResult<Vec<String>> {
        Ok(self
            .lock()?
            .lists
            .get(key)
            .map(|list| list.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    fn claim_and_increment(
        &self,
        set: &str,
        member: &str,
        counter: &str,
        delta: f64,
    ) -> StoreResult<Option<f64>> {
        let mut inner = self.lock()?;
        if inner
            .sets
            .get(set)
            .is_some_and(|members| members.contains(member))
        {
            return Ok(None);
        }
        // Compute first so a bad counter leaves the set untouched.
        let next = add_float(&mut inner.values, counter, delta)?;
        inner
            .sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(Some(next))
    }

    fn try_acquire(&self, key: &str, token: &str, ttl: Duration) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        let now = Instant::now();
        if let Some((_, expires_at)) = inner.leases.get(key) {
            if *expires_at > now {
                return Ok(false);
            }
        }
        inner
            .leases
            .insert(key.to_string(), (token.to_string(), now + ttl));
        Ok(true)
    }

    fn release(&self, key: &str, token: &str) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        match inner.leases.get(key) {
            Some((holder, _)) if holder == token => {
                inner.leases.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
