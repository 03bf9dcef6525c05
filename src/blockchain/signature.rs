// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signed message templates and personal-sign (EIP-191) verification.
//!
//! Messages are fixed, newline-delimited templates rather than JSON so that
//! signer and verifier always agree on the exact bytes. Numbers render the way
//! a JavaScript signer prints them (`10`, `1.5`, `1e+21`).
//!
//! Verification recovers the EOA signer locally. When that does not match
//! and a chain client is available, contract wallets are checked with
//! ERC-1271. Any failure along the way (malformed signature, RPC error,
//! timeout) counts as invalid.

use std::str::FromStr;

use alloy::primitives::{eip191_hash_message, Address, Bytes, Signature};
use tracing::{debug, warn};

use super::client::ChainClient;

/// Message the partner signs to credit `amount` to `address`.
pub fn push_message(order_id: &str, address: &str, amount: f64, timestamp: i64) -> String {
    format!(
        "Push CASE to Dapp\nOrderId: {order_id}\nAddress: {address}\nAmount: {}\nTimestamp: {timestamp}",
        js_number(amount)
    )
}

/// Message the account owner signs to withdraw at `nonce`.
pub fn withdraw_message(address: &str, nonce: i64) -> String {
    format!("Withdraw all CASE from Dapp\nAddress: {address}\nNonce: {nonce}")
}

/// Render a float the way `Number.prototype.toString` does.
pub fn js_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    let abs = value.abs();
    if !(1e-6..1e21).contains(&abs) {
        let s = format!("{value:e}");
        return match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
            _ => s,
        };
    }
    value.to_string()
}

/// Checks that a message was signed by a given account.
#[derive(Clone, Default)]
pub struct SignatureVerifier {
    chain: Option<ChainClient>,
}

impl SignatureVerifier {
    /// Verifier that only accepts EOA signatures.
    pub fn offline() -> Self {
        Self { chain: None }
    }

    /// Verifier that also accepts ERC-1271 contract wallet signatures.
    pub fn with_chain(chain: ChainClient) -> Self {
        Self { chain: Some(chain) }
    }

    pub fn supports_contract_wallets(&self) -> bool {
        self.chain.is_some()
    }

    /// `true` only if `signature` over `message` is valid for `expected`.
    pub async fn verify(&self, expected: &str, message: &str, signature: &str) -> bool {
        let Ok(expected) = Address::from_str(expected.trim()) else {
            return false;
        };
        let Ok(bytes) = alloy::hex::decode(signature.trim()) else {
            debug!("Signature is not hex");
            return false;
        };

        if recovers_to(&bytes, message, expected) {
            return true;
        }

        match &self.chain {
            Some(chain) => self.verify_contract(chain, expected, message, bytes).await,
            None => false,
        }
    }

    async fn verify_contract(
        &self,
        chain: &ChainClient,
        wallet: Address,
        message: &str,
        signature: Vec<u8>,
    ) -> bool {
        match chain.is_contract(wallet).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                warn!(%wallet, error = %e, "Contract code lookup failed, rejecting signature");
                return false;
            }
        }

        let hash = eip191_hash_message(message);
        match chain
            .is_valid_contract_signature(wallet, hash, Bytes::from(signature))
            .await
        {
            Ok(valid) => valid,
            Err(e) => {
                warn!(%wallet, error = %e, "ERC-1271 check failed, rejecting signature");
                false
            }
        }
    }
}

fn recovers_to(bytes: &[u8], message: &str, expected: Address) -> bool {
    if bytes.len() != 65 {
        return false;
    }
    let Ok(signature) = Signature::try_from(bytes) else {
        return false;
    };
    signature
        .recover_address_from_msg(message)
        .is_ok_and(|recovered| recovered == expected)
}
