// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Chain and token settings.

use crate::config::ChainSettings;

/// Polygon PoS mainnet, the default deployment target.
pub const POLYGON_MAINNET_CHAIN_ID: u64 = 137;

/// Network and CASE token configuration.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Chain ID
    pub chain_id: u64,
    /// RPC endpoint URL
    pub rpc_url: String,
    /// Block explorer URL
    pub explorer_url: String,
    /// CASE ERC-20 contract, if configured
    pub token_address: Option<String>,
    /// CASE token decimals
    pub token_decimals: u8,
}

impl ChainConfig {
    pub fn from_settings(settings: &ChainSettings) -> Self {
        Self {
            chain_id: settings.chain_id,
            rpc_url: settings.rpc_url.clone(),
            explorer_url: settings.explorer_url.trim_end_matches('/').to_string(),
            token_address: settings.token_address.clone(),
            token_decimals: settings.token_decimals,
        }
    }

    /// Display name for logs.
    pub fn network_name(&self) -> String {
        match self.chain_id {
            POLYGON_MAINNET_CHAIN_ID => "Polygon PoS".to_string(),
            80002 => "Polygon Amoy".to_string(),
            id => format!("chain {id}"),
        }
    }

    pub fn tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_url, tx_hash)
    }
}
