// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Hot wallet key loading.
//!
//! The key comes from `HOT_WALLET_PRIVATE_KEY` (hex) or from a PEM file at
//! `HOT_WALLET_PRIVATE_KEY_PATH` (SEC1 or PKCS#8). Key material never
//! reaches a log line or an error message.

use alloy::signers::local::PrivateKeySigner;
use k256::SecretKey;

use super::client::{ChainClient, ChainError};
use crate::config::ChainSettings;

/// Parse a PEM private key to a hex string.
pub fn pem_to_hex(pem_bytes: &[u8]) -> Result<String, ChainError> {
    let pem_str = std::str::from_utf8(pem_bytes)
        .map_err(|_| ChainError::InvalidPrivateKey("key file is not UTF-8".into()))?;

    let pem = pem::parse(pem_str)
        .map_err(|_| ChainError::InvalidPrivateKey("key file is not PEM".into()))?;

    let secret_key = SecretKey::from_sec1_der(pem.contents())
        .or_else(|_| parse_pkcs8_to_secret_key(pem.contents()))
        .map_err(|_| {
            ChainError::InvalidPrivateKey("expected a SEC1 or PKCS#8 secp256k1 key".into())
        })?;

    Ok(alloy::hex::encode(secret_key.to_bytes()))
}

fn parse_pkcs8_to_secret_key(der: &[u8]) -> Result<SecretKey, k256::pkcs8::Error> {
    use k256::pkcs8::DecodePrivateKey;
    SecretKey::from_pkcs8_der(der)
}

pub fn signer_from_pem(pem_bytes: &[u8]) -> Result<PrivateKeySigner, ChainError> {
    let hex_key = pem_to_hex(pem_bytes)?;
    ChainClient::create_signer(&hex_key)
}

/// Load the hot wallet signer. `Ok(None)` when neither source is configured.
///
/// The inline hex key wins over the key file.
pub fn load_hot_wallet(settings: &ChainSettings) -> Result<Option<PrivateKeySigner>, ChainError> {
    if let Some(hex) = &settings.hot_wallet_key {
        return ChainClient::create_signer(hex)
            .map(Some)
            .map_err(|_| ChainError::InvalidPrivateKey("HOT_WALLET_PRIVATE_KEY is malformed".into()));
    }
    if let Some(path) = &settings.hot_wallet_key_path {
        let bytes = std::fs::read(path).map_err(|e| {
            ChainError::InvalidPrivateKey(format!("cannot read {}: {e}", path.display()))
        })?;
        return signer_from_pem(&bytes).map(Some);
    }
    Ok(None)
}
