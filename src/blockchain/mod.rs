// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EVM integration for the CASE token.
//!
//! This module provides functionality for:
//! - Loading the hot wallet key (hex or PEM)
//! - ERC-20 `transfer` payouts from the hot wallet
//! - Push and withdrawal message templates
//! - EIP-191 signature verification, with ERC-1271 for contract wallets

pub mod client;
pub mod erc20;
pub mod signature;
pub mod signing;
pub mod transactions;
pub mod transfer;
pub mod types;

pub use client::{ChainClient, ChainError};
pub use signature::{push_message, withdraw_message, SignatureVerifier};
pub use transfer::{HotWallet, SignedTransfer, TokenTransfer, TransferStatus};
pub use types::ChainConfig;
