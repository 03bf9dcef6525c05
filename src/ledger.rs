// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger
//!
//! Off-chain balance model over a [`KvStore`]:
//!
//! - **Balance**: float accumulator per address, incremented by credits and
//!   reduced by the paid-out amount once a withdrawal transfer is broadcast,
//!   at most once per payout transaction
//! - **Nonce**: integer counter per address, advanced once per withdrawal
//! - **Pending payout**: at most one signed withdrawal transfer per address
//!   whose outcome the ledger has not absorbed yet
//! - **Processed set**: one namespace shared by push order ids and partner
//!   asset ids; an id in the set is never credited again
//! - **History**: order and withdrawal lists, newest first
//!
//! Reads default to zero or empty. Writes propagate store failures.

use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;

use crate::models::{OrderRecord, PendingWithdrawal, PushRecord, WithdrawalRecord};
use crate::storage::{keys, KvStore, StoreResult};

/// Orders returned by balance lookups.
pub const DEFAULT_ORDER_LIMIT: usize = 20;

/// Upper bound for history reads.
pub const MAX_HISTORY_LIMIT: usize = 50;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn KvStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    // =========================================================================
    // Balance and nonce
    // =========================================================================

    pub fn get_balance(&self, address: &str) -> StoreResult<f64> {
        let key = keys::balance(address);
        match self.store.get(&key)? {
            Some(raw) => crate::storage::parse_float(&key, &raw),
            None => Ok(0.0),
        }
    }

    /// Atomic increment. Callers reject non-positive amounts first.
    pub fn add_balance(&self, address: &str, amount: f64) -> StoreResult<f64> {
        self.store.incr_by_float(&keys::balance(address), amount)
    }

    /// Subtract a paid-out amount once per payout transaction.
    ///
    /// Credits that landed after `amount` was read survive. Returns `false`
    /// when `tx_hash` had already been debited, in which case nothing changed.
    pub fn settle_withdrawal(&self, address: &str, tx_hash: &str, amount: f64) -> StoreResult<bool> {
        Ok(self
            .store
            .claim_and_increment(
                keys::SETTLED_WITHDRAWALS,
                tx_hash,
                &keys::balance(address),
                -amount,
            )?
            .is_some())
    }

    /// Unconditional overwrite.
    pub fn set_balance(&self, address: &str, amount: f64) -> StoreResult<()> {
        self.store.set(&keys::balance(address), &amount.to_string())
    }

    pub fn get_nonce(&self, address: &str) -> StoreResult<i64> {
        let key = keys::nonce(address);
        match self.store.get(&key)? {
            Some(raw) => crate::storage::parse_int(&key, &raw),
            None => Ok(0),
        }
    }

    pub fn increment_nonce(&self, address: &str) -> StoreResult<i64> {
        self.store.incr(&keys::nonce(address))
    }

    // =========================================================================
    // Pending payouts
    // =========================================================================

    pub fn get_pending_withdrawal(&self, address: &str) -> StoreResult<Option<PendingWithdrawal>> {
        match self.store.get(&keys::pending_withdrawal(address))? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn set_pending_withdrawal(
        &self,
        address: &str,
        pending: &PendingWithdrawal,
    ) -> StoreResult<()> {
        let json = serde_json::to_string(pending)?;
        self.store.set(&keys::pending_withdrawal(address), &json)
    }

    pub fn clear_pending_withdrawal(&self, address: &str) -> StoreResult<()> {
        self.store
            .delete(&keys::pending_withdrawal(address))
            .map(|_| ())
    }

    // =========================================================================
    // Processed ids
    // =========================================================================

    pub fn is_processed(&self, id: &str) -> StoreResult<bool> {
        self.store.set_is_member(keys::PROCESSED_ORDERS, id)
    }

    pub fn mark_processed(&self, id: &str) -> StoreResult<()> {
        self.store.set_add(keys::PROCESSED_ORDERS, id).map(|_| ())
    }

    /// Mark `id` processed and credit `amount` in one store transaction.
    ///
    /// Returns the new balance, or `None` if `id` had already been processed,
    /// in which case nothing changed.
    pub fn credit_once(&self, address: &str, id: &str, amount: f64) -> StoreResult<Option<f64>> {
        self.store.claim_and_increment(
            keys::PROCESSED_ORDERS,
            id,
            &keys::balance(address),
            amount,
        )
    }

    // =========================================================================
    // History
    // =========================================================================

    pub fn append_order(&self, address: &str, record: &OrderRecord) -> StoreResult<()> {
        let json = serde_json::to_string(record)?;
        self.store.list_push_front(&keys::orders(address), &json)
    }

    /// Most recent first, at most `limit` (capped at [`MAX_HISTORY_LIMIT`]).
    pub fn list_orders(&self, address: &str, limit: usize) -> StoreResult<Vec<OrderRecord>> {
        self.read_list(&keys::orders(address), limit)
    }

    pub fn append_withdrawal(&self, address: &str, record: &WithdrawalRecord) -> StoreResult<()> {
        let json = serde_json::to_string(record)?;
        self.store.list_push_front(&keys::withdrawals(address), &json)
    }

    pub fn list_withdrawals(
        &self,
        address: &str,
        limit: usize,
    ) -> StoreResult<Vec<WithdrawalRecord>> {
        self.read_list(&keys::withdrawals(address), limit)
    }

    fn read_list<T: DeserializeOwned>(&self, key: &str, limit: usize) -> StoreResult<Vec<T>> {
        let raw = self.store.list_range(key, limit.min(MAX_HISTORY_LIMIT))?;
        let mut records = Vec::with_capacity(raw.len());
        for item in raw {
            match serde_json::from_str(&item) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(list = %key, error = %e, "Skipping unreadable history entry"),
            }
        }
        Ok(records)
    }

    // =========================================================================
    // Push records
    // =========================================================================

    pub fn store_push_record(&self, record: &PushRecord) -> StoreResult<()> {
        let json = serde_json::to_string(record)?;
        self.store.set(&keys::push_record(&record.order_id), &json)
    }

    pub fn get_push_record(&self, order_id: &str) -> StoreResult<Option<PushRecord>> {
        match self.store.get(&keys::push_record(order_id))? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Asset sync cursor
    // =========================================================================

    pub fn set_last_sync(&self, address: &str, at_ms: i64) -> StoreResult<()> {
        self.store
            .set(&keys::last_asset_sync(address), &at_ms.to_string())
    }

    pub fn get_last_sync(&self, address: &str) -> StoreResult<Option<i64>> {
        let key = keys::last_asset_sync(address);
        self.store
            .get(&key)?
            .map(|raw| crate::storage::parse_int(&key, &raw))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderKind;
    use crate::storage::MemoryStore;

    const ADDR: &str = "0xAbCdEf0000000000000000000000000000000001";

    fn ledger() -> Ledger {
        Ledger::new(Arc::new(MemoryStore::new()))
    }

    fn order(id: &str, amount: f64) -> OrderRecord {
        OrderRecord {
            order_id: id.to_string(),
            kind: OrderKind::Push,
            amount,
            timestamp: 1,
            created_at: 2,
            tx_hash: None,
        }
    }

    #[test]
    fn defaults_are_zero() {
        let ledger = ledger();
        assert_eq!(ledger.get_balance(ADDR).unwrap(), 0.0);
        assert_eq!(ledger.get_nonce(ADDR).unwrap(), 0);
        assert!(ledger.list_orders(ADDR, 20).unwrap().is_empty());
        assert_eq!(ledger.get_last_sync(ADDR).unwrap(), None);
    }

    #[test]
    fn balance_is_case_insensitive() {
        let ledger = ledger();
        ledger.add_balance(ADDR, 2.5).unwrap();
        assert_eq!(ledger.add_balance(&ADDR.to_lowercase(), 1.0).unwrap(), 3.5);
        assert_eq!(ledger.get_balance(&ADDR.to_uppercase().replace("0X", "0x")).unwrap(), 3.5);

        ledger.set_balance(ADDR, 0.0).unwrap();
        assert_eq!(ledger.get_balance(ADDR).unwrap(), 0.0);
    }

    #[test]
    fn settlement_keeps_later_credits_and_happens_once() {
        let ledger = ledger();
        ledger.add_balance(ADDR, 0.1).unwrap();
        ledger.add_balance(ADDR, 0.2).unwrap();
        let paid = ledger.get_balance(ADDR).unwrap();
        assert!(ledger.settle_withdrawal(ADDR, "0x01", paid).unwrap());
        assert_eq!(ledger.get_balance(ADDR).unwrap(), 0.0);

        ledger.add_balance(ADDR, 10.0).unwrap();
        ledger.add_balance(ADDR, 2.0).unwrap();
        assert!(ledger.settle_withdrawal(ADDR, "0x02", 10.0).unwrap());
        assert!(!ledger.settle_withdrawal(ADDR, "0x02", 10.0).unwrap());
        assert_eq!(ledger.get_balance(ADDR).unwrap(), 2.0);
    }

    #[test]
    fn pending_payout_round_trip() {
        let ledger = ledger();
        assert_eq!(ledger.get_pending_withdrawal(ADDR).unwrap(), None);
        let pending = PendingWithdrawal {
            tx_hash: "0xabc".into(),
            tx_nonce: 7,
            nonce: 0,
            amount: 10.0,
            created_at: 1,
        };
        ledger.set_pending_withdrawal(ADDR, &pending).unwrap();
        assert_eq!(
            ledger.get_pending_withdrawal(&ADDR.to_lowercase()).unwrap(),
            Some(pending)
        );
        ledger.clear_pending_withdrawal(ADDR).unwrap();
        assert_eq!(ledger.get_pending_withdrawal(ADDR).unwrap(), None);
    }

    #[test]
    fn nonce_advances_by_one() {
        let ledger = ledger();
        assert_eq!(ledger.increment_nonce(ADDR).unwrap(), 1);
        assert_eq!(ledger.increment_nonce(ADDR).unwrap(), 2);
        assert_eq!(ledger.get_nonce(ADDR).unwrap(), 2);
    }

    #[test]
    fn credit_once_is_exactly_once() {
        let ledger = ledger();
        assert_eq!(ledger.credit_once(ADDR, "o1", 10.0).unwrap(), Some(10.0));
        assert_eq!(ledger.credit_once(ADDR, "o1", 10.0).unwrap(), None);
        assert!(ledger.is_processed("o1").unwrap());
        assert_eq!(ledger.get_balance(ADDR).unwrap(), 10.0);
    }

    #[test]
    fn marked_ids_block_credit() {
        let ledger = ledger();
        ledger.mark_processed("asset-7").unwrap();
        assert_eq!(ledger.credit_once(ADDR, "asset-7", 5.0).unwrap(), None);
        assert_eq!(ledger.get_balance(ADDR).unwrap(), 0.0);
    }

    #[test]
    fn orders_newest_first_and_bounded() {
        let ledger = ledger();
        for i in 0..60 {
            ledger.append_order(ADDR, &order(&format!("o{i}"), 1.0)).unwrap();
        }
        let recent = ledger.list_orders(ADDR, 3).unwrap();
        let ids: Vec<_> = recent.iter().map(|o| o.order_id.as_str()).collect();
        assert_eq!(ids, vec!["o59", "o58", "o57"]);
        assert_eq!(ledger.list_orders(ADDR, 1000).unwrap().len(), MAX_HISTORY_LIMIT);
    }

    #[test]
    fn unreadable_history_entries_are_skipped() {
        let ledger = ledger();
        ledger.append_order(ADDR, &order("good", 1.0)).unwrap();
        ledger
            .store()
            .list_push_front(&keys::orders(ADDR), "not json")
            .unwrap();
        let orders = ledger.list_orders(ADDR, 20).unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order_id, "good");
    }

    #[test]
    fn push_record_round_trip() {
        let ledger = ledger();
        let record = PushRecord {
            order_id: "o1".into(),
            address: ADDR.into(),
            amount: 10.0,
            timestamp: 1_700_000_000_000,
            signature: "0xsig".into(),
            processed_at: 1_700_000_000_500,
        };
        ledger.store_push_record(&record).unwrap();
        assert_eq!(ledger.get_push_record("o1").unwrap(), Some(record));
        assert_eq!(ledger.get_push_record("o2").unwrap(), None);
    }

    #[test]
    fn withdrawals_and_sync_cursor() {
        let ledger = ledger();
        let w = WithdrawalRecord {
            amount: 4.0,
            tx_hash: "0xabc".into(),
            timestamp: 9,
        };
        ledger.append_withdrawal(ADDR, &w).unwrap();
        assert_eq!(ledger.list_withdrawals(ADDR, 10).unwrap(), vec![w]);

        ledger.set_last_sync(ADDR, 123).unwrap();
        assert_eq!(ledger.get_last_sync(&ADDR.to_lowercase()).unwrap(), Some(123));
    }
}
