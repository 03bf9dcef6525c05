// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Pull-based crediting from the partner asset ledger.
//!
//! Each sync walks at most [`MAX_SYNC_PAGES`] pages of [`SYNC_PAGE_SIZE`]
//! records. Every credited record is its own idempotent unit: the asset id
//! is claimed in the processed set together with the balance increment, so
//! a sync that fails half-way keeps what it credited and a rerun skips it.

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use tracing::{debug, info, warn};

use crate::{
    error::{ApiError, DappError, DappResult},
    ledger::now_ms,
    models::{
        AddressQuery, AssetSyncRequest, AssetSyncResponse, BindingRecord, OrderKind, OrderRecord,
        WalletAddress,
    },
    state::AppState,
};

pub const SYNC_PAGE_SIZE: u32 = 50;

/// Upper bound on pages fetched by one sync.
pub const MAX_SYNC_PAGES: u32 = 10;

/// Validate the address, resolve its binding and sync it.
pub(crate) async fn sync_assets(
    state: &AppState,
    address: Option<&str>,
) -> DappResult<AssetSyncResponse> {
    let address = address
        .filter(|a| !a.is_empty())
        .ok_or_else(|| DappError::validation("Missing address"))?;
    let address = WalletAddress::parse(address)?;

    let binding = state
        .bindings
        .get_by_address(address.as_str())?
        .ok_or_else(|| DappError::validation("Address not bound"))?;

    sync_binding(state, address.as_str(), &binding).await
}

/// Page through the partner ledger for a bound pair and credit new CASE records.
pub(crate) async fn sync_binding(
    state: &AppState,
    address: &str,
    binding: &BindingRecord,
) -> DappResult<AssetSyncResponse> {
    let mut current = 1;
    let mut pages = 1;
    let mut total_fetched = 0u32;
    let mut new_records = 0u32;

    while current <= pages && current <= MAX_SYNC_PAGES {
        let page = state
            .partner
            .query_assets(&binding.user_id, address, current, SYNC_PAGE_SIZE)
            .await
            .map_err(|e| {
                warn!(address = %address, page = current, error = %e, "Asset query failed");
                DappError::from(e)
            })?;

        pages = page.pages;
        total_fetched += page.fetched;

        for record in &page.records {
            if !record.is_case() {
                debug!(asset_id = %record.id, asset_type = ?record.asset_type, "Skipping non-CASE asset");
                continue;
            }
            if state.ledger.is_processed(&record.id)? {
                continue;
            }
            let Some(amount) = record.credit_amount() else {
                debug!(asset_id = %record.id, "Skipping asset without a positive amount");
                continue;
            };

            if state.ledger.credit_once(address, &record.id, amount)?.is_none() {
                continue;
            }
            let now = now_ms();
            state.ledger.append_order(
                address,
                &OrderRecord {
                    order_id: record.id.clone(),
                    kind: OrderKind::Push,
                    amount,
                    timestamp: record.timestamp_or(now),
                    created_at: now,
                    tx_hash: None,
                },
            )?;
            new_records += 1;
        }

        current += 1;
    }

    if pages > MAX_SYNC_PAGES {
        info!(address = %address, pages, "Asset sync stopped at page cap");
    }

    state.ledger.set_last_sync(address, now_ms())?;
    info!(address = %address, new_records, total_fetched, "Asset sync finished");

    Ok(AssetSyncResponse {
        success: true,
        new_records,
        total_fetched,
    })
}

/// Credit new CASE assets from the partner ledger.
///
/// The address is read from the JSON body, or else from the `address` query
/// parameter. An empty or unreadable body counts as `{}`.
#[utoipa::path(
    post,
    path = "/assets/sync",
    tag = "Assets",
    params(AddressQuery),
    request_body(content = AssetSyncRequest, description = "Optional when the address is in the query"),
    responses(
        (status = 200, description = "Sync completed", body = AssetSyncResponse),
        (status = 400, description = "Missing, invalid or unbound address, or the partner rejected the query"),
        (status = 502, description = "Partner unreachable"),
        (status = 504, description = "Partner timed out")
    )
)]
pub async fn sync_assets_handler(
    State(state): State<AppState>,
    query: Result<Query<AddressQuery>, QueryRejection>,
    body: Bytes,
) -> Result<Json<AssetSyncResponse>, ApiError> {
    let Query(query) = query?;
    let body: AssetSyncRequest = serde_json::from_slice(&body).unwrap_or_default();
    let address = body
        .address
        .filter(|a| !a.is_empty())
        .or(query.address);

    Ok(Json(sync_assets(&state, address.as_deref()).await?))
}
