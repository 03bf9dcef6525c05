// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Binding registry: partner user id ↔ on-chain address.
//!
//! A binding is written once, after the partner accepted the bind call, and
//! is readable from either side. Both index entries and the
//! `bound_addresses` set are written in a single store transaction.

use std::sync::Arc;

use crate::error::{DappError, DappResult};
use crate::models::BindingRecord;
use crate::storage::{keys, KvStore, StoreResult};

#[derive(Clone)]
pub struct BindingRegistry {
    store: Arc<dyn KvStore>,
}

impl BindingRegistry {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub fn get_by_address(&self, address: &str) -> StoreResult<Option<BindingRecord>> {
        self.read(&keys::binding_by_address(address))
    }

    pub fn get_by_user(&self, user_id: &str) -> StoreResult<Option<BindingRecord>> {
        self.read(&keys::binding_by_user(user_id))
    }

    /// Decide whether `user_id` may be bound to `address`.
    ///
    /// - `Ok(Some(existing))`: this exact pair is already bound
    /// - `Ok(None)`: both sides are free
    /// - `Err(Conflict)`: either side is bound to someone else
    pub fn check_bindable(
        &self,
        user_id: &str,
        address: &str,
    ) -> DappResult<Option<BindingRecord>> {
        let by_address = self.get_by_address(address)?;
        let by_user = self.get_by_user(user_id)?;

        if let Some(existing) = &by_address {
            if existing.user_id != user_id {
                return Err(DappError::Conflict(
                    "Address already bound to another user".into(),
                ));
            }
        }
        if let Some(existing) = &by_user {
            if !existing.address.eq_ignore_ascii_case(address) {
                return Err(DappError::Conflict(
                    "User already bound to another address".into(),
                ));
            }
        }

        // Both present and consistent, or one side dangling from an older write.
        Ok(by_address.or(by_user))
    }

    /// Persist both index entries and the bound-address set membership.
    pub fn save(&self, record: &BindingRecord) -> StoreResult<()> {
        let json = serde_json::to_string(record)?;
        let by_address = keys::binding_by_address(&record.address);
        let by_user = keys::binding_by_user(&record.user_id);
        let member = record.address.to_lowercase();
        self.store.set_many(
            &[(by_address.as_str(), json.as_str()), (by_user.as_str(), json.as_str())],
            &[(keys::BOUND_ADDRESSES, member.as_str())],
        )
    }

    /// Every bound address, lower-cased.
    pub fn bound_addresses(&self) -> StoreResult<Vec<String>> {
        self.store.set_members(keys::BOUND_ADDRESSES)
    }

    fn read(&self, key: &str) -> StoreResult<Option<BindingRecord>> {
        match self.store.get(key)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    const ADDR: &str = "0xAbCdEf0000000000000000000000000000000001";
    const OTHER: &str = "0x0000000000000000000000000000000000000002";

    fn registry() -> BindingRegistry {
        BindingRegistry::new(Arc::new(MemoryStore::new()))
    }

    fn record(user: &str, address: &str) -> BindingRecord {
        BindingRecord {
            user_id: user.into(),
            address: address.into(),
            bound_at: 1,
        }
    }

    #[test]
    fn lookup_from_both_sides() {
        let reg = registry();
        reg.save(&record("u1", ADDR)).unwrap();

        assert_eq!(reg.get_by_user("u1").unwrap(), Some(record("u1", ADDR)));
        assert_eq!(
            reg.get_by_address(&ADDR.to_lowercase()).unwrap(),
            Some(record("u1", ADDR))
        );
        assert_eq!(reg.bound_addresses().unwrap(), vec![ADDR.to_lowercase()]);
    }

    #[test]
    fn free_pair_is_bindable() {
        let reg = registry();
        assert_eq!(reg.check_bindable("u1", ADDR).unwrap(), None);
    }

    #[test]
    fn identical_pair_is_idempotent() {
        let reg = registry();
        reg.save(&record("u1", ADDR)).unwrap();
        let existing = reg.check_bindable("u1", &ADDR.to_lowercase()).unwrap();
        assert_eq!(existing, Some(record("u1", ADDR)));
    }

    #[test]
    fn rebinding_either_side_conflicts() {
        let reg = registry();
        reg.save(&record("u1", ADDR)).unwrap();

        let err = reg.check_bindable("u2", ADDR).unwrap_err();
        assert!(matches!(err, DappError::Conflict(_)));

        let err = reg.check_bindable("u1", OTHER).unwrap_err();
        assert!(matches!(err, DappError::Conflict(_)));
    }
}
