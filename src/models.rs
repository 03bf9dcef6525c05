// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies for the REST API plus the records persisted
//! in the ledger store. JSON field names are camelCase to match what the
//! partner system and the dapp frontend already send.
//!
//! ## Wallet Address Type
//!
//! [`WalletAddress`] is only constructed through [`WalletAddress::parse`], so
//! any value of that type is `0x` + 40 hex digits. It keeps the caller's
//! spelling (signed messages embed the address byte-for-byte); store keys
//! lower-case it.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::DappError;

// =============================================================================
// Wallet Address Type
// =============================================================================

/// Ethereum-compatible account address, as supplied by the caller.
///
/// # Example
///
/// ```rust,ignore
/// let addr = WalletAddress::parse("0x742d35Cc6634C0532925a3b844Bc9e7595f4aB12")?;
/// ```
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq, Hash)]
#[schema(value_type = String, example = "0x742d35Cc6634C0532925a3b844Bc9e7595f4aB12")]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Accept `0x` followed by exactly 40 hex digits, any case.
    pub fn parse(raw: &str) -> Result<Self, DappError> {
        if is_valid_address(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(DappError::validation("Invalid address format"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub fn is_valid_address(raw: &str) -> bool {
    raw.len() == 42
        && raw.starts_with("0x")
        && raw[2..].chars().all(|c| c.is_ascii_hexdigit())
}

// =============================================================================
// Ledger Records
// =============================================================================

/// Direction of an order history entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Push,
    Withdraw,
}

/// One entry of an address's order history. Informational only; the balance
/// is a separate accumulator.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub order_id: String,
    #[serde(rename = "type")]
    pub kind: OrderKind,
    pub amount: f64,
    /// Business timestamp (ms): push timestamp, asset create time, or withdrawal time.
    pub timestamp: i64,
    /// When this entry was written (ms).
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

/// Verbatim copy of an accepted push-credit instruction, kept for re-verification.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PushRecord {
    pub order_id: String,
    pub address: String,
    pub amount: f64,
    pub timestamp: i64,
    pub signature: String,
    pub processed_at: i64,
}

/// On-chain payout of an address's full balance.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRecord {
    pub amount: f64,
    pub tx_hash: String,
    pub timestamp: i64,
}

/// Signed payout not yet settled in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingWithdrawal {
    pub tx_hash: String,
    /// Hot wallet account nonce of the payout transaction.
    pub tx_nonce: u64,
    /// Withdrawal nonce the owner signed.
    pub nonce: i64,
    pub amount: f64,
    pub created_at: i64,
}

/// Association between a partner user id and an on-chain address.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BindingRecord {
    pub user_id: String,
    pub address: String,
    pub bound_at: i64,
}

// =============================================================================
// Push
// =============================================================================

/// Partner-signed credit instruction.
///
/// Fields are optional at the serde level so that a missing field yields the
/// API's own validation error instead of a body rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub order_id: Option<String>,
    pub address: Option<String>,
    /// Must be a JSON number.
    #[schema(value_type = Option<f64>)]
    pub amount: Option<serde_json::Value>,
    /// Milliseconds since the Unix epoch.
    #[schema(value_type = Option<i64>)]
    pub timestamp: Option<serde_json::Value>,
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    pub success: bool,
    pub new_balance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PushRecordResponse {
    pub order_id: String,
    pub address: String,
    pub amount: f64,
    pub timestamp: i64,
    pub signature: String,
    pub processed_at: i64,
    /// The exact message the partner signed.
    pub sign_message: String,
}

// =============================================================================
// Asset Sync
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AssetSyncRequest {
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssetSyncResponse {
    pub success: bool,
    pub new_records: u32,
    pub total_fetched: u32,
}

// =============================================================================
// Balance / Bind queries
// =============================================================================

/// Lookup by address or by partner user id. Address wins if both are given.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct AccountQuery {
    pub address: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct AddressQuery {
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub balance: f64,
    pub nonce: i64,
    pub orders: Vec<OrderRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BindRequest {
    pub user_id: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BindStatusResponse {
    pub bound: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<BindingRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BindResponse {
    pub success: bool,
    pub binding: BindingRecord,
}

// =============================================================================
// Withdraw
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct WithdrawRequest {
    pub address: Option<String>,
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawResponse {
    pub success: bool,
    pub tx_hash: String,
    pub amount: f64,
}

/// What the wallet must sign to withdraw at the current nonce.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WithdrawMessageResponse {
    pub address: String,
    pub nonce: i64,
    pub balance: f64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WithdrawalListResponse {
    pub withdrawals: Vec<WithdrawalRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_validation() {
        assert!(WalletAddress::parse("0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA").is_ok());
        assert!(WalletAddress::parse("0x742d35Cc6634C0532925a3b844Bc9e7595f4aB12").is_ok());
        assert!(WalletAddress::parse("742d35Cc6634C0532925a3b844Bc9e7595f4aB12").is_err());
        assert!(WalletAddress::parse("0x742d35Cc6634C0532925a3b844Bc9e7595f4aB1").is_err());
        assert!(WalletAddress::parse("0x742d35Cc6634C0532925a3b844Bc9e7595f4aB1g").is_err());
        assert!(WalletAddress::parse("0X742d35Cc6634C0532925a3b844Bc9e7595f4aB12").is_err());
        assert!(WalletAddress::parse("").is_err());
    }

    #[test]
    fn address_keeps_caller_spelling() {
        let addr = WalletAddress::parse("0xAbCdEf0000000000000000000000000000000001").unwrap();
        assert_eq!(addr.as_str(), "0xAbCdEf0000000000000000000000000000000001");
        assert_eq!(addr.to_string(), addr.as_str());
    }

    #[test]
    fn order_record_wire_format() {
        let record = OrderRecord {
            order_id: "o1".into(),
            kind: OrderKind::Push,
            amount: 10.0,
            timestamp: 1,
            created_at: 2,
            tx_hash: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["orderId"], "o1");
        assert_eq!(json["type"], "push");
        assert_eq!(json["createdAt"], 2);
        assert!(json.get("txHash").is_none());
    }

    #[test]
    fn push_request_tolerates_missing_fields() {
        let req: PushRequest = serde_json::from_str(r#"{"orderId":"o1","amount":"10"}"#).unwrap();
        assert_eq!(req.order_id.as_deref(), Some("o1"));
        assert!(req.address.is_none());
        assert_eq!(req.amount, Some(serde_json::json!("10")));
    }
}
