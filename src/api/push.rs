// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Partner-signed push credits.
//!
//! The partner signs `Push CASE to Dapp` messages with a single key whose
//! address is `PUSH_SIGNER_ADDRESS`. An accepted push is stored verbatim,
//! then credited exactly once: the order id is claimed in the processed set
//! and the balance incremented in the same store transaction.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    blockchain::push_message,
    error::{ApiError, DappError, DappResult},
    ledger::now_ms,
    models::{OrderKind, OrderRecord, PushRecord, PushRecordResponse, PushRequest, PushResponse, WalletAddress},
    state::AppState,
    storage::{keys, LeaseGuard, DEFAULT_LEASE_TTL},
};

/// Accepted distance between the instruction timestamp and server time.
pub const PUSH_TIMESTAMP_WINDOW_MS: i64 = 5 * 60 * 1000;

const ALREADY_PROCESSED: &str = "Order already processed";

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn positive_amount(value: &Value) -> DappResult<f64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .filter(|a| a.is_finite() && *a > 0.0)
            .ok_or_else(|| DappError::validation("Invalid amount")),
        _ => Err(DappError::validation("Invalid amount")),
    }
}

fn integer_timestamp(value: &Value) -> DappResult<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .ok_or_else(|| DappError::validation("Invalid timestamp")),
        _ => Err(DappError::validation("Invalid timestamp")),
    }
}

/// Validate, verify and credit one push instruction at server time `now`.
pub(crate) async fn apply_push(
    state: &AppState,
    req: PushRequest,
    now: i64,
) -> DappResult<PushResponse> {
    let (Some(order_id), Some(address), Some(amount), Some(timestamp), Some(signature)) = (
        present(&req.order_id),
        present(&req.address),
        req.amount.as_ref().filter(|v| !v.is_null()),
        req.timestamp.as_ref().filter(|v| !v.is_null()),
        present(&req.signature),
    ) else {
        return Err(DappError::validation("Missing required fields"));
    };

    let address = WalletAddress::parse(address)?;
    let amount = positive_amount(amount)?;
    let timestamp = integer_timestamp(timestamp)?;
    if now.abs_diff(timestamp) >= PUSH_TIMESTAMP_WINDOW_MS as u64 {
        return Err(DappError::validation("Timestamp expired"));
    }

    let signer = state.push_signer()?;
    let message = push_message(order_id, address.as_str(), amount, timestamp);
    if !state.verifier.verify(signer, &message, signature).await {
        warn!(order_id = %order_id, address = %address, "Push signature rejected");
        return Err(DappError::Authentication("Invalid signature".into()));
    }

    let Some(_lease) = LeaseGuard::acquire(&state.store, keys::push_lock(order_id), DEFAULT_LEASE_TTL)?
    else {
        return Err(DappError::Conflict(ALREADY_PROCESSED.into()));
    };
    if state.ledger.is_processed(order_id)? {
        return Err(DappError::Conflict(ALREADY_PROCESSED.into()));
    }

    state.ledger.store_push_record(&PushRecord {
        order_id: order_id.to_string(),
        address: address.to_string(),
        amount,
        timestamp,
        signature: signature.to_string(),
        processed_at: now_ms(),
    })?;

    let Some(new_balance) = state.ledger.credit_once(address.as_str(), order_id, amount)? else {
        return Err(DappError::Conflict(ALREADY_PROCESSED.into()));
    };

    state.ledger.append_order(
        address.as_str(),
        &OrderRecord {
            order_id: order_id.to_string(),
            kind: OrderKind::Push,
            amount,
            timestamp,
            created_at: now_ms(),
            tx_hash: None,
        },
    )?;

    info!(order_id = %order_id, address = %address, amount, new_balance, "Push credited");
    Ok(PushResponse {
        success: true,
        new_balance,
    })
}

/// Credit an address from a partner-signed push instruction.
#[utoipa::path(
    post,
    path = "/push",
    tag = "Push",
    request_body = PushRequest,
    responses(
        (status = 200, description = "Order credited", body = PushResponse),
        (status = 400, description = "Missing or invalid field, or timestamp outside the window"),
        (status = 401, description = "Signature not made by the push signer"),
        (status = 409, description = "Order already processed"),
        (status = 500, description = "Internal error or push signer not configured")
    )
)]
pub async fn push_credit(
    State(state): State<AppState>,
    payload: Result<Json<PushRequest>, JsonRejection>,
) -> Result<Json<PushResponse>, ApiError> {
    let Json(req) = payload?;
    Ok(Json(apply_push(&state, req, now_ms()).await?))
}

/// Fetch a stored push instruction and the exact message that was signed.
#[utoipa::path(
    get,
    path = "/push/{order_id}",
    tag = "Push",
    params(("order_id" = String, Path, description = "Partner order id")),
    responses(
        (status = 200, description = "Stored push record", body = PushRecordResponse),
        (status = 400, description = "Missing order id"),
        (status = 404, description = "Order not found")
    )
)]
pub async fn get_push_record(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<PushRecordResponse>, ApiError> {
    if order_id.trim().is_empty() {
        return Err(ApiError::bad_request("Missing orderId"));
    }
    let record = state
        .ledger
        .get_push_record(&order_id)
        .map_err(DappError::from)?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    let sign_message = push_message(
        &record.order_id,
        &record.address,
        record.amount,
        record.timestamp,
    );
    Ok(Json(PushRecordResponse {
        order_id: record.order_id,
        address: record.address,
        amount: record.amount,
        timestamp: record.timestamp,
        signature: record.signature,
        processed_at: record.processed_at,
        sign_message,
    }))
}
