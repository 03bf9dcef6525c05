// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key naming for the ledger store.
//!
//! Address components are always lower-cased so that checksummed and plain
//! spellings of one account share the same entries.

/// Set of order and asset ids that have already been credited.
pub const PROCESSED_ORDERS: &str = "processed_orders";

/// Set of every address that has a binding.
pub const BOUND_ADDRESSES: &str = "bound_addresses";

/// Set of payout tx hashes already debited from a balance.
pub const SETTLED_WITHDRAWALS: &str = "settled_withdrawals";

/// Cached partner bearer token.
pub const PARTNER_TOKEN: &str = "partner:token";

fn addr(address: &str) -> String {
    address.to_lowercase()
}

pub fn balance(address: &str) -> String {
    format!("balance:{}", addr(address))
}

pub fn nonce(address: &str) -> String {
    format!("nonce:{}", addr(address))
}

pub fn orders(address: &str) -> String {
    format!("orders:{}", addr(address))
}

pub fn withdrawals(address: &str) -> String {
    format!("withdrawals:{}", addr(address))
}

pub fn pending_withdrawal(address: &str) -> String {
    format!("pending_withdraw:{}", addr(address))
}

pub fn push_record(order_id: &str) -> String {
    format!("push:{order_id}")
}

pub fn binding_by_address(address: &str) -> String {
    format!("binding:address:{}", addr(address))
}

pub fn binding_by_user(user_id: &str) -> String {
    format!("binding:user:{user_id}")
}

pub fn last_asset_sync(address: &str) -> String {
    format!("asset_sync:{}", addr(address))
}

pub fn withdraw_lock(address: &str) -> String {
    format!("lock:withdraw:{}", addr(address))
}

pub fn push_lock(order_id: &str) -> String {
    format!("lock:push:{order_id}")
}
