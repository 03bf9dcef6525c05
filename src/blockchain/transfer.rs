// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! On-chain CASE payouts from the hot wallet.
//!
//! A payout is signed first and broadcast second, so its hash can be
//! recorded before the node sees it. A broadcast that ends without a clear
//! answer is resolved later through [`TokenTransfer::status`].

use std::time::Duration;

use alloy::primitives::U256;
use async_trait::async_trait;
use tracing::{info, warn};

use super::client::{with_timeout, ChainError};
use super::signing::load_hot_wallet;
use super::transactions::{amount_to_units, format_amount, TxBuilder};
use super::types::ChainConfig;
use crate::config::ChainSettings;
use crate::error::DappError;

impl From<ChainError> for DappError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::InvalidPrivateKey(_) | ChainError::InvalidRpcUrl(_) => {
                DappError::Configuration("hot wallet".into())
            }
            other => DappError::Transfer(other.to_string()),
        }
    }
}

/// A payout signed by the hot wallet and not yet known to be on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransfer {
    pub tx_hash: String,
    /// Hot wallet account nonce the transaction was signed with.
    pub tx_nonce: u64,
    /// EIP-2718 encoded transaction.
    pub raw: Vec<u8>,
}

/// Outcome of a previously signed payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// Mined and succeeded.
    Confirmed,
    /// Mined and reverted. No tokens moved.
    Reverted,
    /// Not mined yet, or not yet decidable.
    Pending,
    /// Its account nonce was consumed by another transaction, so it can
    /// never be mined.
    Dropped,
}

/// Sends CASE to an account.
#[async_trait]
pub trait TokenTransfer: Send + Sync {
    /// Build and sign a payout of `amount` CASE to `to`. Nothing is sent.
    async fn prepare(&self, to: &str, amount: f64) -> Result<SignedTransfer, ChainError>;

    /// Send a signed payout. Only `ChainError::TransactionFailed` means the
    /// node refused it; any other error leaves its fate open.
    async fn broadcast(&self, transfer: &SignedTransfer) -> Result<(), ChainError>;

    /// Look up a payout signed earlier.
    async fn status(&self, tx_hash: &str, tx_nonce: u64) -> Result<TransferStatus, ChainError>;
}

/// Server-held account paying out withdrawals.
pub struct HotWallet {
    builder: TxBuilder,
    token_address: String,
    decimals: u8,
    timeout: Duration,
}

impl HotWallet {
    /// Build from settings. `Ok(None)` when the key or the token address is unset.
    pub fn from_settings(
        settings: &ChainSettings,
        timeout: Duration,
    ) -> Result<Option<Self>, ChainError> {
        let Some(token_address) = settings.token_address.clone() else {
            return Ok(None);
        };
        let Some(signer) = load_hot_wallet(settings)? else {
            return Ok(None);
        };

        let config = ChainConfig::from_settings(settings);
        let decimals = config.token_decimals;
        let builder = TxBuilder::new(config, signer)?;
        info!(
            hot_wallet = %builder.from_address(),
            network = %builder.config().network_name(),
            token = %token_address,
            "Hot wallet ready"
        );
        Ok(Some(Self {
            builder,
            token_address,
            decimals,
            timeout,
        }))
    }
}

#[async_trait]
impl TokenTransfer for HotWallet {
    async fn prepare(&self, to: &str, amount: f64) -> Result<SignedTransfer, ChainError> {
        let units = amount_to_units(amount, self.decimals)?;
        if units == U256::ZERO {
            return Err(ChainError::InvalidAmount("amount rounds to zero".into()));
        }

        let balance = with_timeout(
            "token balance",
            self.timeout,
            self.builder.token_balance(&self.token_address),
        )
        .await;
        match balance {
            Ok(available) if available < units => {
                return Err(ChainError::TransactionFailed(format!(
                    "hot wallet holds {} CASE, needs {}",
                    format_amount(available, self.decimals),
                    format_amount(units, self.decimals)
                )));
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Hot wallet balance check failed, sending anyway"),
        }

        let signed = with_timeout(
            "transfer signing",
            self.timeout,
            self.builder
                .sign_token_transfer(to, &self.token_address, units),
        )
        .await?;
        info!(
            to = %to,
            amount = %format_amount(units, self.decimals),
            tx_hash = %signed.tx_hash,
            tx_nonce = signed.tx_nonce,
            "CASE transfer signed"
        );
        Ok(signed)
    }

    async fn broadcast(&self, transfer: &SignedTransfer) -> Result<(), ChainError> {
        with_timeout(
            "token transfer",
            self.timeout,
            self.builder.send_raw(&transfer.raw),
        )
        .await?;
        info!(
            tx_hash = %transfer.tx_hash,
            explorer = %self.builder.config().tx_url(&transfer.tx_hash),
            "CASE transfer broadcast"
        );
        Ok(())
    }

    async fn status(&self, tx_hash: &str, tx_nonce: u64) -> Result<TransferStatus, ChainError> {
        with_timeout(
            "transfer status",
            self.timeout,
            self.builder.transfer_status(tx_hash, tx_nonce),
        )
        .await
    }
}
