// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger balance query endpoint.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};

use crate::{
    error::{ApiError, DappError, DappResult},
    ledger::DEFAULT_ORDER_LIMIT,
    models::{AccountQuery, BalanceResponse, WalletAddress},
    state::AppState,
};

/// Resolve an address, or the address bound to a user id.
pub(crate) fn resolve_account(state: &AppState, query: &AccountQuery) -> DappResult<WalletAddress> {
    if let Some(address) = query.address.as_deref().filter(|a| !a.is_empty()) {
        return WalletAddress::parse(address);
    }
    if let Some(user_id) = query.user_id.as_deref().filter(|u| !u.is_empty()) {
        let binding = state
            .bindings
            .get_by_user(user_id)?
            .ok_or_else(|| DappError::NotFound("User not bound".into()))?;
        return WalletAddress::parse(&binding.address);
    }
    Err(DappError::validation("Missing address parameter"))
}

pub(crate) fn read_balance(state: &AppState, address: &WalletAddress) -> DappResult<BalanceResponse> {
    let address = address.as_str();
    Ok(BalanceResponse {
        balance: state.ledger.get_balance(address)?,
        nonce: state.ledger.get_nonce(address)?,
        orders: state.ledger.list_orders(address, DEFAULT_ORDER_LIMIT)?,
    })
}

/// Get the off-chain CASE balance, withdrawal nonce and recent orders.
///
/// Looks up by `address`, or by the address bound to `userId`.
#[utoipa::path(
    get,
    path = "/balance",
    tag = "Balance",
    params(AccountQuery),
    responses(
        (status = 200, description = "Ledger state", body = BalanceResponse),
        (status = 400, description = "Missing or invalid address"),
        (status = 404, description = "User id not bound")
    )
)]
pub async fn get_balance(
    State(state): State<AppState>,
    query: Result<Query<AccountQuery>, QueryRejection>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let Query(query) = query?;
    let address = resolve_account(&state, &query)?;
    Ok(Json(read_balance(&state, &address)?))
}
