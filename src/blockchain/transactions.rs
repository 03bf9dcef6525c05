// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transaction building and broadcasting.
//!
//! Only one transaction shape is needed: an ERC-20 `transfer` from the hot
//! wallet. Signing and sending are separate steps so the hash is known
//! before anything reaches the node. The account nonce is pinned at signing
//! time; gas and chain id are filled by the provider.

use std::str::FromStr;

use alloy::{
    eips::eip2718::Encodable2718,
    network::EthereumWallet,
    primitives::{Address, B256, U256},
    providers::{Provider, ProviderBuilder, SendableTx},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
    sol_types::SolCall,
};

use super::client::{parse_rpc_url, ChainClient, ChainError};
use super::erc20::{Erc20Contract, IERC20};
use super::transfer::{SignedTransfer, TransferStatus};
use super::types::ChainConfig;

/// Node replies meaning the exact same transaction is already in its pool.
const ALREADY_KNOWN: [&str; 2] = ["already known", "known transaction"];

/// Transaction builder with signing capabilities.
pub struct TxBuilder {
    config: ChainConfig,
    from: Address,
    provider: alloy::providers::fillers::FillProvider<
        alloy::providers::fillers::JoinFill<
            alloy::providers::fillers::JoinFill<
                alloy::providers::Identity,
                alloy::providers::fillers::JoinFill<
                    alloy::providers::fillers::GasFiller,
                    alloy::providers::fillers::JoinFill<
                        alloy::providers::fillers::BlobGasFiller,
                        alloy::providers::fillers::JoinFill<
                            alloy::providers::fillers::NonceFiller,
                            alloy::providers::fillers::ChainIdFiller,
                        >,
                    >,
                >,
            >,
            alloy::providers::fillers::WalletFiller<EthereumWallet>,
        >,
        alloy::providers::RootProvider<alloy::network::Ethereum>,
    >,
}

impl TxBuilder {
    pub fn new(config: ChainConfig, signer: PrivateKeySigner) -> Result<Self, ChainError> {
        let url = parse_rpc_url(&config.rpc_url)?;
        let from = signer.address();
        let wallet = ChainClient::create_wallet(signer);
        let provider = ProviderBuilder::new().wallet(wallet).connect_http(url);

        Ok(Self {
            config,
            from,
            provider,
        })
    }

    /// Address of the signing wallet.
    pub fn from_address(&self) -> Address {
        self.from
    }

    /// Token balance held by the signing wallet.
    pub async fn token_balance(&self, token_address: &str) -> Result<U256, ChainError> {
        Erc20Contract::new(&self.provider, token_address)?
            .balance_of(self.from)
            .await
    }

    /// Build and sign an ERC-20 token transfer without sending it.
    ///
    /// # Arguments
    /// * `to` - Recipient address
    /// * `token_address` - ERC-20 contract address
    /// * `amount` - Amount in token's smallest unit
    pub async fn sign_token_transfer(
        &self,
        to: &str,
        token_address: &str,
        amount: U256,
    ) -> Result<SignedTransfer, ChainError> {
        let to_addr = Address::from_str(to)
            .map_err(|e| ChainError::InvalidAddress(format!("Invalid to address: {e}")))?;
        let token_addr = Address::from_str(token_address)
            .map_err(|e| ChainError::InvalidAddress(format!("Invalid token address: {e}")))?;

        let call = IERC20::transferCall {
            to: to_addr,
            amount,
        };
        let data = call.abi_encode();

        let nonce = self
            .provider
            .get_transaction_count(self.from)
            .pending()
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?;

        let tx = TransactionRequest::default()
            .from(self.from)
            .to(token_addr)
            .input(data.into())
            .nonce(nonce);

        let filled = self
            .provider
            .fill(tx)
            .await
            .map_err(|e| ChainError::TransactionFailed(format!("Failed to prepare: {e}")))?;
        let SendableTx::Envelope(envelope) = filled else {
            return Err(ChainError::TransactionFailed(
                "provider returned an unsigned transaction".into(),
            ));
        };

        Ok(SignedTransfer {
            tx_hash: format!("{:?}", envelope.tx_hash()),
            tx_nonce: nonce,
            raw: envelope.encoded_2718(),
        })
    }

    /// Hand a signed transaction to the node.
    ///
    /// `TransactionFailed` means the node refused it. Any other error leaves
    /// open whether it was accepted.
    pub async fn send_raw(&self, raw: &[u8]) -> Result<(), ChainError> {
        match self.provider.send_raw_transaction(raw).await {
            Ok(_) => Ok(()),
            Err(e) => match e.as_error_resp() {
                Some(payload) if is_already_known(&payload.message) => Ok(()),
                Some(payload) => Err(ChainError::TransactionFailed(payload.message.to_string())),
                None => Err(ChainError::RpcError(e.to_string())),
            },
        }
    }

    /// Where a transaction signed with `tx_nonce` stands.
    pub async fn transfer_status(
        &self,
        tx_hash: &str,
        tx_nonce: u64,
    ) -> Result<TransferStatus, ChainError> {
        let hash = B256::from_str(tx_hash)
            .map_err(|e| ChainError::RpcError(format!("Invalid tx hash {tx_hash}: {e}")))?;

        // Read the mined nonce before the receipt so a transaction mined in
        // between is seen as confirmed rather than dropped.
        let mined_nonce = self
            .provider
            .get_transaction_count(self.from)
            .await
            .map_err(rpc_error)?;
        if let Some(receipt) = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(rpc_error)?
        {
            return Ok(if receipt.status() {
                TransferStatus::Confirmed
            } else {
                TransferStatus::Reverted
            });
        }
        if self
            .provider
            .get_transaction_by_hash(hash)
            .await
            .map_err(rpc_error)?
            .is_some()
        {
            return Ok(TransferStatus::Pending);
        }
        Ok(if mined_nonce > tx_nonce {
            TransferStatus::Dropped
        } else {
            TransferStatus::Pending
        })
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }
}

fn rpc_error(e: impl std::fmt::Display) -> ChainError {
    ChainError::RpcError(e.to_string())
}

fn is_already_known(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    ALREADY_KNOWN.iter().any(|m| message.contains(m))
}

/// Parse a human-readable decimal amount into token units.
///
/// Fractional digits beyond `decimals` are truncated.
pub fn parse_amount(amount: &str, decimals: u8) -> Result<U256, ChainError> {
    let invalid = || ChainError::InvalidAmount(format!("{amount:?}"));

    let (whole, fraction) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }

    let width = decimals as usize;
    let fraction: String = fraction.chars().take(width).collect();
    let padded = format!("{fraction:0<width$}");
    let digits = format!("{whole}{padded}");
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 10).map_err(|_| invalid())
}

/// Convert a ledger amount to token units.
///
/// The amount is rendered as its shortest decimal form first, so `0.1`
/// becomes exactly `100000000000000000` at 18 decimals.
pub fn amount_to_units(amount: f64, decimals: u8) -> Result<U256, ChainError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(ChainError::InvalidAmount(amount.to_string()));
    }
    parse_amount(&amount.to_string(), decimals)
}

/// Format token units as a human-readable amount.
pub fn format_amount(amount: U256, decimals: u8) -> String {
    if amount.is_zero() {
        return "0".to_string();
    }

    let divisor = U256::from(10u64).pow(U256::from(decimals));
    let whole = amount / divisor;
    let remainder = amount % divisor;

    if remainder.is_zero() {
        whole.to_string()
    } else {
        let decimal_str = format!("{:0>width$}", remainder, width = decimals as usize);
        format!("{}.{}", whole, decimal_str.trim_end_matches('0'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_whole_and_decimal() {
        assert_eq!(
            parse_amount("1", 18).unwrap(),
            U256::from(1_000_000_000_000_000_000u64)
        );
        assert_eq!(
            parse_amount("1.5", 18).unwrap(),
            U256::from(1_500_000_000_000_000_000u64)
        );
        assert_eq!(parse_amount("1.5", 6).unwrap(), U256::from(1_500_000u64));
        assert_eq!(parse_amount("0.001", 18).unwrap(), U256::from(1_000_000_000_000_000u64));
        assert_eq!(parse_amount("0", 18).unwrap(), U256::ZERO);
    }

    #[test]
    fn parse_truncates_excess_precision() {
        assert_eq!(parse_amount("1.2345678", 6).unwrap(), U256::from(1_234_567u64));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_amount("", 18).is_err());
        assert!(parse_amount("1.2.3", 18).is_err());
        assert!(parse_amount("-1", 18).is_err());
        assert!(parse_amount("1e5", 18).is_err());
    }

    #[test]
    fn ledger_amounts_convert_exactly() {
        assert_eq!(
            amount_to_units(10.0, 18).unwrap(),
            U256::from(10_000_000_000_000_000_000u128)
        );
        assert_eq!(
            amount_to_units(0.1, 18).unwrap(),
            U256::from(100_000_000_000_000_000u64)
        );
        // Beyond u128 once scaled.
        let big = amount_to_units(1e21, 18).unwrap();
        assert_eq!(format_amount(big, 18), "1000000000000000000000");
        assert!(amount_to_units(f64::NAN, 18).is_err());
        assert!(amount_to_units(-1.0, 18).is_err());
    }

    #[test]
    fn resubmission_replies_count_as_accepted() {
        assert!(is_already_known("already known"));
        assert!(is_already_known("Known transaction: 0xabc"));
        assert!(!is_already_known("nonce too low"));
        assert!(!is_already_known("insufficient funds for gas * price + value"));
    }

    #[test]
    fn format_amount_trims() {
        let one = U256::from(1_000_000_000_000_000_000u64);
        assert_eq!(format_amount(one, 18), "1");

        let one_and_half = U256::from(1_500_000u64);
        assert_eq!(format_amount(one_and_half, 6), "1.5");
        assert_eq!(format_amount(U256::ZERO, 6), "0");
    }
}
