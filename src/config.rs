// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! once at startup; secrets that only some operations need are kept optional
//! and reported as "not configured" by the operation that needs them.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory holding `ledger.redb` | `./data` |
//! | `STORE_BACKEND` | `redb` or `memory` | `redb` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `PARTNER_API_BASE_URL` | Partner identity/asset API root | `https://web3.linkprofit.cn:8890` |
//! | `PARTNER_AUTH_USERNAME` | Partner API username | Required for bind/sync |
//! | `PARTNER_AUTH_PASSWORD` | Partner API password | Required for bind/sync |
//! | `PARTNER_CLIENT_NAME` | Client name sent with token requests | `DAPP客户端` |
//! | `PUSH_SIGNER_ADDRESS` | Expected signer of push-credit messages | Required for push |
//! | `HOT_WALLET_PRIVATE_KEY` | Hex withdrawal key | Required for withdraw (or `_PATH`) |
//! | `HOT_WALLET_PRIVATE_KEY_PATH` | PEM withdrawal key file | Optional |
//! | `CASE_TOKEN_ADDRESS` | CASE ERC-20 contract | Required for withdraw |
//! | `CASE_TOKEN_DECIMALS` | CASE token decimals | `18` |
//! | `CHAIN_RPC_URL` | EVM JSON-RPC endpoint | `https://polygon-rpc.com` |
//! | `CHAIN_ID` | EVM chain id | `137` |
//! | `CHAIN_EXPLORER_URL` | Block explorer root | `https://polygonscan.com` |
//! | `OUTBOUND_TIMEOUT_SECS` | Partner HTTP / chain RPC timeout | `15` |
//! | `ASSET_SYNC_INTERVAL_SECS` | Background sync sweep interval | Disabled |

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Directory for the embedded ledger database.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const STORE_BACKEND_ENV: &str = "STORE_BACKEND";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const PARTNER_API_BASE_URL_ENV: &str = "PARTNER_API_BASE_URL";
pub const PARTNER_AUTH_USERNAME_ENV: &str = "PARTNER_AUTH_USERNAME";
pub const PARTNER_AUTH_PASSWORD_ENV: &str = "PARTNER_AUTH_PASSWORD";
pub const PARTNER_CLIENT_NAME_ENV: &str = "PARTNER_CLIENT_NAME";

/// Address whose signature authorises push-credit instructions.
pub const PUSH_SIGNER_ADDRESS_ENV: &str = "PUSH_SIGNER_ADDRESS";

/// Hot wallet key. Never logged, never returned.
pub const HOT_WALLET_PRIVATE_KEY_ENV: &str = "HOT_WALLET_PRIVATE_KEY";
pub const HOT_WALLET_PRIVATE_KEY_PATH_ENV: &str = "HOT_WALLET_PRIVATE_KEY_PATH";

pub const CASE_TOKEN_ADDRESS_ENV: &str = "CASE_TOKEN_ADDRESS";
pub const CASE_TOKEN_DECIMALS_ENV: &str = "CASE_TOKEN_DECIMALS";
pub const CHAIN_RPC_URL_ENV: &str = "CHAIN_RPC_URL";
pub const CHAIN_ID_ENV: &str = "CHAIN_ID";
pub const CHAIN_EXPLORER_URL_ENV: &str = "CHAIN_EXPLORER_URL";

pub const OUTBOUND_TIMEOUT_SECS_ENV: &str = "OUTBOUND_TIMEOUT_SECS";
pub const ASSET_SYNC_INTERVAL_SECS_ENV: &str = "ASSET_SYNC_INTERVAL_SECS";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_PARTNER_API_BASE_URL: &str = "https://web3.linkprofit.cn:8890";
pub const DEFAULT_PARTNER_CLIENT_NAME: &str = "DAPP客户端";
pub const DEFAULT_CHAIN_RPC_URL: &str = "https://polygon-rpc.com";
pub const DEFAULT_CHAIN_ID: u64 = 137;
pub const DEFAULT_CHAIN_EXPLORER_URL: &str = "https://polygonscan.com";
pub const DEFAULT_CASE_DECIMALS: u8 = 18;
pub const DEFAULT_OUTBOUND_TIMEOUT: Duration = Duration::from_secs(15);

/// Which [`KvStore`](crate::storage::KvStore) implementation to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redb,
    Memory,
}

/// Partner API credentials and endpoint.
#[derive(Clone)]
pub struct PartnerConfig {
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_name: String,
}

impl fmt::Debug for PartnerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartnerConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("client_name", &self.client_name)
            .finish()
    }
}

/// Chain, token and hot wallet settings.
#[derive(Clone)]
pub struct ChainSettings {
    pub rpc_url: String,
    pub chain_id: u64,
    pub explorer_url: String,
    pub token_address: Option<String>,
    pub token_decimals: u8,
    pub hot_wallet_key: Option<String>,
    pub hot_wallet_key_path: Option<PathBuf>,
}

impl fmt::Debug for ChainSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainSettings")
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("explorer_url", &self.explorer_url)
            .field("token_address", &self.token_address)
            .field("token_decimals", &self.token_decimals)
            .field("hot_wallet_key", &self.hot_wallet_key.as_ref().map(|_| "<redacted>"))
            .field("hot_wallet_key_path", &self.hot_wallet_key_path)
            .finish()
    }
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub store_backend: StoreBackend,
    pub partner: PartnerConfig,
    pub push_signer_address: Option<String>,
    pub chain: ChainSettings,
    pub outbound_timeout: Duration,
    pub asset_sync_interval: Option<Duration>,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let store_backend = match get(STORE_BACKEND_ENV).as_deref() {
            Some(v) if v.eq_ignore_ascii_case("memory") => StoreBackend::Memory,
            _ => StoreBackend::Redb,
        };

        let outbound_timeout = get(OUTBOUND_TIMEOUT_SECS_ENV)
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_OUTBOUND_TIMEOUT);

        let asset_sync_interval = get(ASSET_SYNC_INTERVAL_SECS_ENV)
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Self {
            host: get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: get(PORT_ENV)
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            data_dir: get(DATA_DIR_ENV)
                .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())
                .into(),
            store_backend,
            partner: PartnerConfig {
                base_url: get(PARTNER_API_BASE_URL_ENV)
                    .unwrap_or_else(|| DEFAULT_PARTNER_API_BASE_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                username: get(PARTNER_AUTH_USERNAME_ENV),
                password: get(PARTNER_AUTH_PASSWORD_ENV),
                client_name: get(PARTNER_CLIENT_NAME_ENV)
                    .unwrap_or_else(|| DEFAULT_PARTNER_CLIENT_NAME.to_string()),
            },
            push_signer_address: get(PUSH_SIGNER_ADDRESS_ENV),
            chain: ChainSettings {
                rpc_url: get(CHAIN_RPC_URL_ENV)
                    .unwrap_or_else(|| DEFAULT_CHAIN_RPC_URL.to_string()),
                chain_id: get(CHAIN_ID_ENV)
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_CHAIN_ID),
                explorer_url: get(CHAIN_EXPLORER_URL_ENV)
                    .unwrap_or_else(|| DEFAULT_CHAIN_EXPLORER_URL.to_string()),
                token_address: get(CASE_TOKEN_ADDRESS_ENV),
                token_decimals: get(CASE_TOKEN_DECIMALS_ENV)
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_CASE_DECIMALS),
                hot_wallet_key: get(HOT_WALLET_PRIVATE_KEY_ENV),
                hot_wallet_key_path: get(HOT_WALLET_PRIVATE_KEY_PATH_ENV).map(PathBuf::from),
            },
            outbound_timeout,
            asset_sync_interval,
        }
    }

    /// Path to the redb ledger file.
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("ledger.redb")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[]);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.store_backend, StoreBackend::Redb);
        assert_eq!(config.partner.base_url, DEFAULT_PARTNER_API_BASE_URL);
        assert_eq!(config.chain.chain_id, 137);
        assert_eq!(config.chain.token_decimals, 18);
        assert_eq!(config.outbound_timeout, DEFAULT_OUTBOUND_TIMEOUT);
        assert!(config.push_signer_address.is_none());
        assert!(config.asset_sync_interval.is_none());
        assert_eq!(config.ledger_path(), PathBuf::from("./data/ledger.redb"));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let config = load(&[(PUSH_SIGNER_ADDRESS_ENV, "  "), (PORT_ENV, "nope")]);
        assert!(config.push_signer_address.is_none());
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn overrides_are_read() {
        let config = load(&[
            (STORE_BACKEND_ENV, "Memory"),
            (PARTNER_API_BASE_URL_ENV, "http://partner.local/"),
            (CASE_TOKEN_DECIMALS_ENV, "6"),
            (ASSET_SYNC_INTERVAL_SECS_ENV, "60"),
            (OUTBOUND_TIMEOUT_SECS_ENV, "0"),
        ]);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.partner.base_url, "http://partner.local");
        assert_eq!(config.chain.token_decimals, 6);
        assert_eq!(config.asset_sync_interval, Some(Duration::from_secs(60)));
        assert_eq!(config.outbound_timeout, DEFAULT_OUTBOUND_TIMEOUT);
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = load(&[
            (HOT_WALLET_PRIVATE_KEY_ENV, "0xdeadbeef"),
            (PARTNER_AUTH_PASSWORD_ENV, "hunter2"),
        ]);
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("deadbeef"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
