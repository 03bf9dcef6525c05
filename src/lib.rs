// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! CASE Dapp Server - Off-chain CASE ledger
//!
//! Keeps a per-address CASE balance that is credited by partner-signed push
//! instructions and by syncing the partner's asset ledger, and pays the whole
//! balance out on-chain when the address owner signs a withdrawal.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `ledger` / `bindings` - balance model and user id ↔ address registry
//! - `providers` - partner identity / asset API client
//! - `blockchain` - message signatures and ERC-20 payouts (alloy)
//! - `storage` - key-value store (redb or in-memory)

pub mod api;
pub mod bindings;
pub mod blockchain;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod providers;
pub mod state;
pub mod storage;
pub mod sync_poller;
