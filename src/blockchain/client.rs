// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Read-only chain client used for contract-wallet signature checks.

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use alloy::{
    network::{Ethereum, EthereumWallet},
    primitives::{Address, Bytes, B256},
    providers::{
        fillers::{BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller},
        Identity, Provider, ProviderBuilder, RootProvider,
    },
    signers::local::PrivateKeySigner,
};

use super::erc20::{IERC1271, ERC1271_MAGIC_VALUE};
use super::types::ChainConfig;

/// HTTP provider type (with the default fillers).
type HttpProvider = FillProvider<
    JoinFill<
        Identity,
        JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
    >,
    RootProvider<Ethereum>,
>;

/// Errors that can occur during chain operations.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Contract error: {0}")]
    ContractError(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("{0} timed out")]
    Timeout(&'static str),
}

/// Run a chain call under a deadline.
pub(crate) async fn with_timeout<T>(
    what: &'static str,
    limit: Duration,
    fut: impl Future<Output = Result<T, ChainError>>,
) -> Result<T, ChainError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| ChainError::Timeout(what))?
}

pub(crate) fn parse_rpc_url(raw: &str) -> Result<url::Url, ChainError> {
    raw.parse()
        .map_err(|e: url::ParseError| ChainError::InvalidRpcUrl(e.to_string()))
}

/// Chain client without signing capability.
#[derive(Clone)]
pub struct ChainClient {
    provider: HttpProvider,
    timeout: Duration,
}

impl ChainClient {
    pub fn new(config: ChainConfig, timeout: Duration) -> Result<Self, ChainError> {
        let url = parse_rpc_url(&config.rpc_url)?;
        let provider = ProviderBuilder::new().connect_http(url);
        Ok(Self { provider, timeout })
    }

    /// Whether the address has contract code deployed.
    pub async fn is_contract(&self, address: Address) -> Result<bool, ChainError> {
        with_timeout("get_code", self.timeout, async {
            let code = self
                .provider
                .get_code_at(address)
                .await
                .map_err(|e| ChainError::RpcError(e.to_string()))?;
            Ok(!code.is_empty())
        })
        .await
    }

    /// ERC-1271 `isValidSignature` on a contract wallet.
    pub async fn is_valid_contract_signature(
        &self,
        wallet: Address,
        hash: B256,
        signature: Bytes,
    ) -> Result<bool, ChainError> {
        let contract = IERC1271::new(wallet, self.provider.clone());
        with_timeout("isValidSignature", self.timeout, async {
            let magic = contract
                .isValidSignature(hash, signature)
                .call()
                .await
                .map_err(|e| ChainError::ContractError(e.to_string()))?;
            Ok(magic.0 == ERC1271_MAGIC_VALUE)
        })
        .await
    }

    /// Create a signer from a hex private key, with or without `0x`.
    pub fn create_signer(private_key_hex: &str) -> Result<PrivateKeySigner, ChainError> {
        PrivateKeySigner::from_str(private_key_hex.trim())
            .map_err(|e| ChainError::InvalidPrivateKey(e.to_string()))
    }

    pub fn create_wallet(signer: PrivateKeySigner) -> EthereumWallet {
        EthereumWallet::from(signer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_signer_accepts_prefixed_and_bare_hex() {
        let signer = PrivateKeySigner::random();
        let hex = alloy::hex::encode(signer.to_bytes());

        let bare = ChainClient::create_signer(&hex).unwrap();
        let prefixed = ChainClient::create_signer(&format!("0x{hex}")).unwrap();
        assert_eq!(bare.address(), signer.address());
        assert_eq!(prefixed.address(), signer.address());
    }

    #[test]
    fn create_signer_rejects_garbage() {
        let err = ChainClient::create_signer("not-a-key").unwrap_err();
        assert!(matches!(err, ChainError::InvalidPrivateKey(_)));
    }

    #[test]
    fn rejects_bad_rpc_url() {
        let mut cfg = ChainConfig::from_settings(&crate::config::AppConfig::from_lookup(|_| None).chain);
        cfg.rpc_url = "not a url".into();
        assert!(matches!(
            ChainClient::new(cfg, Duration::from_secs(1)),
            Err(ChainError::InvalidRpcUrl(_))
        ));
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let result: Result<(), ChainError> = with_timeout("slow", Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ChainError::Timeout("slow"))));
    }
}
