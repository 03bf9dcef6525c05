// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User id ↔ address binding endpoints.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Json,
};
use tracing::{info, warn};

use crate::{
    error::{ApiError, DappError, DappResult},
    ledger::now_ms,
    models::{AccountQuery, BindRequest, BindResponse, BindStatusResponse, BindingRecord, WalletAddress},
    state::AppState,
};

pub(crate) fn binding_status(state: &AppState, query: &AccountQuery) -> DappResult<BindStatusResponse> {
    let address = query.address.as_deref().filter(|a| !a.is_empty());
    let user_id = query.user_id.as_deref().filter(|u| !u.is_empty());

    let binding = match (address, user_id) {
        (Some(address), _) => {
            let address = WalletAddress::parse(address)?;
            state.bindings.get_by_address(address.as_str())?
        }
        (None, Some(user_id)) => state.bindings.get_by_user(user_id)?,
        (None, None) => return Err(DappError::validation("Missing address or userId")),
    };

    Ok(BindStatusResponse {
        bound: binding.is_some(),
        binding,
    })
}

/// Register the pair with the partner, then record it locally.
pub(crate) async fn bind_account(state: &AppState, req: BindRequest) -> DappResult<BindingRecord> {
    let (Some(user_id), Some(address)) = (
        req.user_id.as_deref().filter(|u| !u.is_empty()),
        req.address.as_deref().filter(|a| !a.is_empty()),
    ) else {
        return Err(DappError::validation("Missing required fields"));
    };
    let address = WalletAddress::parse(address)?;

    if let Some(existing) = state.bindings.check_bindable(user_id, address.as_str())? {
        info!(user_id = %user_id, address = %address, "Binding already present");
        return Ok(existing);
    }

    state
        .partner
        .bind_address(user_id, address.as_str())
        .await
        .map_err(|e| {
            warn!(user_id = %user_id, address = %address, error = %e, "Partner bind failed");
            DappError::from(e)
        })?;

    let record = BindingRecord {
        user_id: user_id.to_string(),
        address: address.to_string(),
        bound_at: now_ms(),
    };
    state.bindings.save(&record)?;
    info!(user_id = %user_id, address = %address, "Address bound");
    Ok(record)
}

/// Check whether an address or user id is bound.
#[utoipa::path(
    get,
    path = "/bind",
    tag = "Bind",
    params(AccountQuery),
    responses(
        (status = 200, description = "Binding status", body = BindStatusResponse),
        (status = 400, description = "Missing address and userId, or invalid address")
    )
)]
pub async fn get_binding(
    State(state): State<AppState>,
    query: Result<Query<AccountQuery>, QueryRejection>,
) -> Result<Json<BindStatusResponse>, ApiError> {
    let Query(query) = query?;
    Ok(Json(binding_status(&state, &query)?))
}

/// Bind a partner user id to an address.
///
/// A binding is permanent. Binding either side to a different counterpart
/// is refused; repeating an existing pair returns the stored record.
#[utoipa::path(
    post,
    path = "/bind",
    tag = "Bind",
    request_body = BindRequest,
    responses(
        (status = 200, description = "Bound", body = BindResponse),
        (status = 400, description = "Missing or invalid field, or the partner refused the binding"),
        (status = 409, description = "Address or user id already bound elsewhere"),
        (status = 502, description = "Partner unreachable")
    )
)]
pub async fn create_binding(
    State(state): State<AppState>,
    payload: Result<Json<BindRequest>, JsonRejection>,
) -> Result<Json<BindResponse>, ApiError> {
    let Json(req) = payload?;
    let binding = bind_account(&state, req).await?;
    Ok(Json(BindResponse {
        success: true,
        binding,
    }))
}
