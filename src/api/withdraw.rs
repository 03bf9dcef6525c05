// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Full-balance withdrawals to the account owner's address.
//!
//! ## Flow
//!
//! 1. Take the `lock:withdraw:{addr}` lease (one withdrawal in flight per address)
//! 2. Verify the owner's signature over the withdrawal message at the current nonce
//! 3. Resolve a payout left pending by an earlier attempt, if any
//! 4. Refuse an empty balance
//! 5. Sign the CASE transfer and record it as pending under its hash
//! 6. Broadcast it
//! 7. Only then: debit the balance, advance the nonce, record history
//!
//! A transfer the node refuses changes nothing, so the same signature stays
//! valid for a retry. A broadcast with no clear answer keeps the withdrawal
//! blocked; later requests look the hash up on chain and either complete the
//! withdrawal or release it once the transaction can no longer be mined.
//! Once the nonce moves, that signature can never be replayed.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Json,
};
use tracing::{error, info, warn};

use crate::{
    blockchain::{withdraw_message, ChainError, TokenTransfer, TransferStatus},
    error::{ApiError, DappError, DappResult},
    ledger::{now_ms, MAX_HISTORY_LIMIT},
    models::{
        AddressQuery, OrderKind, OrderRecord, PendingWithdrawal, WalletAddress,
        WithdrawMessageResponse, WithdrawRequest, WithdrawResponse, WithdrawalListResponse,
        WithdrawalRecord,
    },
    state::AppState,
    storage::{keys, LeaseGuard, DEFAULT_LEASE_TTL},
};

fn required_address(raw: Option<&str>) -> DappResult<WalletAddress> {
    let raw = raw
        .filter(|a| !a.is_empty())
        .ok_or_else(|| DappError::validation("Missing address"))?;
    WalletAddress::parse(raw)
}

pub(crate) async fn withdraw_all(state: &AppState, req: WithdrawRequest) -> DappResult<WithdrawResponse> {
    let (Some(address), Some(signature)) = (
        req.address.as_deref().filter(|a| !a.is_empty()),
        req.signature.as_deref().filter(|s| !s.is_empty()),
    ) else {
        return Err(DappError::validation("Missing required fields"));
    };
    let address = WalletAddress::parse(address)?;

    let Some(_lease) = LeaseGuard::acquire(
        &state.store,
        keys::withdraw_lock(address.as_str()),
        DEFAULT_LEASE_TTL,
    )?
    else {
        return Err(DappError::Conflict("Withdrawal already in progress".into()));
    };

    let nonce = state.ledger.get_nonce(address.as_str())?;
    let message = withdraw_message(address.as_str(), nonce);
    if !state.verifier.verify(address.as_str(), &message, signature).await {
        warn!(address = %address, nonce, "Withdrawal signature rejected");
        return Err(DappError::Authentication("Invalid signature".into()));
    }

    let wallet = state.hot_wallet()?;
    if let Some(pending) = state.ledger.get_pending_withdrawal(address.as_str())? {
        let resolved = resolve_pending(state, &**wallet, &address, pending, nonce).await?;
        if let Some(done) = resolved {
            return Ok(done);
        }
    }

    let balance = state.ledger.get_balance(address.as_str())?;
    if balance <= 0.0 {
        return Err(DappError::validation("No balance to withdraw"));
    }

    let signed = wallet.prepare(address.as_str(), balance).await.map_err(|e| {
        warn!(address = %address, amount = balance, error = %e, "Withdrawal transfer could not be signed");
        DappError::from(e)
    })?;
    let pending = PendingWithdrawal {
        tx_hash: signed.tx_hash.clone(),
        tx_nonce: signed.tx_nonce,
        nonce,
        amount: balance,
        created_at: now_ms(),
    };
    state
        .ledger
        .set_pending_withdrawal(address.as_str(), &pending)?;

    match wallet.broadcast(&signed).await {
        Ok(()) => complete(state, &address, &pending),
        Err(e @ ChainError::TransactionFailed(_)) => {
            warn!(address = %address, amount = balance, error = %e, "Withdrawal transfer refused");
            state.ledger.clear_pending_withdrawal(address.as_str())?;
            Err(DappError::from(e))
        }
        Err(e) => {
            warn!(
                address = %address,
                amount = balance,
                tx_hash = %signed.tx_hash,
                error = %e,
                "Withdrawal broadcast outcome unknown, holding the withdrawal"
            );
            Err(DappError::TransferPending(signed.tx_hash))
        }
    }
}

/// Absorb the outcome of a payout left pending by an earlier attempt.
///
/// Returns the finished withdrawal when that payout landed, `None` when the
/// address is free for a new payout.
async fn resolve_pending(
    state: &AppState,
    wallet: &dyn TokenTransfer,
    address: &WalletAddress,
    pending: PendingWithdrawal,
    nonce: i64,
) -> DappResult<Option<WithdrawResponse>> {
    if pending.nonce < nonce {
        // Ledger already settled; only the marker was left behind.
        state.ledger.clear_pending_withdrawal(address.as_str())?;
        return Ok(None);
    }

    match wallet.status(&pending.tx_hash, pending.tx_nonce).await {
        Ok(TransferStatus::Confirmed) => complete(state, address, &pending).map(Some),
        Ok(status @ (TransferStatus::Reverted | TransferStatus::Dropped)) => {
            info!(
                address = %address,
                tx_hash = %pending.tx_hash,
                ?status,
                "Pending payout will never land, releasing the withdrawal"
            );
            state.ledger.clear_pending_withdrawal(address.as_str())?;
            Ok(None)
        }
        Ok(TransferStatus::Pending) => Err(DappError::TransferPending(pending.tx_hash)),
        Err(e) => {
            warn!(address = %address, tx_hash = %pending.tx_hash, error = %e, "Pending payout lookup failed");
            Err(DappError::TransferPending(pending.tx_hash))
        }
    }
}

/// Record a payout that reached the node. Safe to repeat after a partial failure.
fn complete(
    state: &AppState,
    address: &WalletAddress,
    pending: &PendingWithdrawal,
) -> DappResult<WithdrawResponse> {
    if let Err(e) = settle(state, address.as_str(), pending) {
        error!(
            address = %address,
            amount = pending.amount,
            tx_hash = %pending.tx_hash,
            error = %e,
            "Withdrawal broadcast but ledger update failed, the next request retries it"
        );
        return Err(e);
    }

    info!(address = %address, amount = pending.amount, tx_hash = %pending.tx_hash, "Withdrawal completed");
    Ok(WithdrawResponse {
        success: true,
        tx_hash: pending.tx_hash.clone(),
        amount: pending.amount,
    })
}

fn settle(state: &AppState, address: &str, pending: &PendingWithdrawal) -> DappResult<()> {
    let now = now_ms();
    let tx_hash = &pending.tx_hash;
    let first = state
        .ledger
        .settle_withdrawal(address, tx_hash, pending.amount)?;
    if state.ledger.get_nonce(address)? == pending.nonce {
        state.ledger.increment_nonce(address)?;
    }
    if first {
        state.ledger.append_withdrawal(
            address,
            &WithdrawalRecord {
                amount: pending.amount,
                tx_hash: tx_hash.clone(),
                timestamp: now,
            },
        )?;
        state.ledger.append_order(
            address,
            &OrderRecord {
                order_id: format!("withdraw-{tx_hash}"),
                kind: OrderKind::Withdraw,
                amount: pending.amount,
                timestamp: now,
                created_at: now,
                tx_hash: Some(tx_hash.clone()),
            },
        )?;
    }
    state.ledger.clear_pending_withdrawal(address)?;
    Ok(())
}

/// Withdraw the whole off-chain balance as on-chain CASE.
///
/// The signature must be the address owner's personal-sign signature over
/// the message returned by `GET /withdraw/message`.
#[utoipa::path(
    post,
    path = "/withdraw",
    tag = "Withdraw",
    request_body = WithdrawRequest,
    responses(
        (status = 200, description = "Transfer broadcast", body = WithdrawResponse),
        (status = 400, description = "Missing or invalid field, or nothing to withdraw"),
        (status = 401, description = "Signature not made by the address owner at the current nonce"),
        (status = 409, description = "Another withdrawal for this address is in progress, or an earlier payout awaits confirmation"),
        (status = 500, description = "Transfer failed or hot wallet not configured")
    )
)]
pub async fn withdraw(
    State(state): State<AppState>,
    payload: Result<Json<WithdrawRequest>, JsonRejection>,
) -> Result<Json<WithdrawResponse>, ApiError> {
    let Json(req) = payload?;
    Ok(Json(withdraw_all(&state, req).await?))
}

/// Get the exact message to sign for a withdrawal at the current nonce.
#[utoipa::path(
    get,
    path = "/withdraw/message",
    tag = "Withdraw",
    params(AddressQuery),
    responses(
        (status = 200, description = "Message to sign", body = WithdrawMessageResponse),
        (status = 400, description = "Missing or invalid address")
    )
)]
pub async fn withdraw_message_handler(
    State(state): State<AppState>,
    query: Result<Query<AddressQuery>, QueryRejection>,
) -> Result<Json<WithdrawMessageResponse>, ApiError> {
    let Query(query) = query?;
    let address = required_address(query.address.as_deref())?;
    let nonce = state
        .ledger
        .get_nonce(address.as_str())
        .map_err(DappError::from)?;
    let balance = state
        .ledger
        .get_balance(address.as_str())
        .map_err(DappError::from)?;

    Ok(Json(WithdrawMessageResponse {
        message: withdraw_message(address.as_str(), nonce),
        address: address.to_string(),
        nonce,
        balance,
    }))
}

/// List past withdrawals, newest first.
#[utoipa::path(
    get,
    path = "/withdrawals",
    tag = "Withdraw",
    params(AddressQuery),
    responses(
        (status = 200, description = "Withdrawal history", body = WithdrawalListResponse),
        (status = 400, description = "Missing or invalid address")
    )
)]
pub async fn list_withdrawals(
    State(state): State<AppState>,
    query: Result<Query<AddressQuery>, QueryRejection>,
) -> Result<Json<WithdrawalListResponse>, ApiError> {
    let Query(query) = query?;
    let address = required_address(query.address.as_deref())?;
    let withdrawals = state
        .ledger
        .list_withdrawals(address.as_str(), MAX_HISTORY_LIMIT)
        .map_err(DappError::from)?;
    Ok(Json(WithdrawalListResponse { withdrawals }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use alloy::signers::local::PrivateKeySigner;
    use axum::http::StatusCode;

    use super::*;
    use crate::api::push::tests::sign;
    use crate::state::test_support::{state_with, FakePartner, FakeTransfer};

    struct Fixture {
        state: AppState,
        transfer: Arc<FakeTransfer>,
        owner: PrivateKeySigner,
        address: String,
    }

    fn fixture(transfer: FakeTransfer) -> Fixture {
        let transfer = Arc::new(transfer);
        let state = state_with(
            &[],
            Arc::new(FakePartner::default()),
            Some(Arc::clone(&transfer)),
        );
        let owner = PrivateKeySigner::random();
        let address = owner.address().to_string();
        Fixture {
            state,
            transfer,
            owner,
            address,
        }
    }

    fn request(f: &Fixture, nonce: i64) -> WithdrawRequest {
        WithdrawRequest {
            address: Some(f.address.clone()),
            signature: Some(sign(&f.owner, &withdraw_message(&f.address, nonce))),
        }
    }

    #[tokio::test]
    async fn withdraws_full_balance() {
        let f = fixture(FakeTransfer::default());
        f.state.ledger.credit_once(&f.address, "o1", 10.0).unwrap();

        let res = withdraw_all(&f.state, request(&f, 0)).await.unwrap();
        assert!(res.success);
        assert_eq!(res.amount, 10.0);
        assert!(res.tx_hash.starts_with("0x"));
        assert_eq!(
            f.transfer.sent.lock().unwrap().clone(),
            vec![(f.address.clone(), 10.0)]
        );

        let ledger = &f.state.ledger;
        assert_eq!(ledger.get_balance(&f.address).unwrap(), 0.0);
        assert_eq!(ledger.get_nonce(&f.address).unwrap(), 1);

        let withdrawals = ledger.list_withdrawals(&f.address, 10).unwrap();
        assert_eq!(withdrawals.len(), 1);
        assert_eq!(withdrawals[0].tx_hash, res.tx_hash);

        let orders = ledger.list_orders(&f.address, 10).unwrap();
        assert_eq!(orders[0].kind, OrderKind::Withdraw);
        assert_eq!(orders[0].order_id, format!("withdraw-{}", res.tx_hash));
        assert_eq!(orders[0].tx_hash.as_deref(), Some(res.tx_hash.as_str()));
    }

    #[tokio::test]
    async fn old_signature_is_rejected_after_withdrawal() {
        let f = fixture(FakeTransfer::default());
        f.state.ledger.credit_once(&f.address, "o1", 10.0).unwrap();
        let req = request(&f, 0);
        withdraw_all(&f.state, req.clone()).await.unwrap();

        f.state.ledger.credit_once(&f.address, "o2", 3.0).unwrap();
        let err = withdraw_all(&f.state, req).await.unwrap_err();
        assert!(matches!(err, DappError::Authentication(_)));
        assert_eq!(f.transfer.count(), 1);
        assert_eq!(f.state.ledger.get_balance(&f.address).unwrap(), 3.0);

        withdraw_all(&f.state, request(&f, 1)).await.unwrap();
        assert_eq!(f.state.ledger.get_nonce(&f.address).unwrap(), 2);
    }

    #[tokio::test]
    async fn failed_transfer_changes_nothing_and_signature_stays_valid() {
        let f = fixture(FakeTransfer::failing());
        f.state.ledger.credit_once(&f.address, "o1", 10.0).unwrap();
        let req = request(&f, 0);

        let err = withdraw_all(&f.state, req.clone()).await.unwrap_err();
        assert!(matches!(err, DappError::Transfer(_)));
        let api = ApiError::from(err);
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.message, "Transfer failed");

        assert_eq!(f.state.ledger.get_balance(&f.address).unwrap(), 10.0);
        assert_eq!(f.state.ledger.get_nonce(&f.address).unwrap(), 0);
        assert!(f.state.ledger.list_withdrawals(&f.address, 10).unwrap().is_empty());
        assert_eq!(f.state.ledger.get_pending_withdrawal(&f.address).unwrap(), None);

        // Hot wallet refilled: the same signature goes through.
        let mut state = f.state.clone();
        state.transfer = Some(Arc::new(FakeTransfer::default()));
        let res = withdraw_all(&state, req).await.unwrap();
        assert_eq!(res.amount, 10.0);
        assert_eq!(state.ledger.get_nonce(&f.address).unwrap(), 1);
    }

    #[tokio::test]
    async fn lost_broadcast_reply_holds_the_withdrawal_until_confirmed() {
        let f = fixture(FakeTransfer::losing_replies(1));
        f.state.ledger.credit_once(&f.address, "o1", 10.0).unwrap();
        let req = request(&f, 0);

        let err = withdraw_all(&f.state, req.clone()).await.unwrap_err();
        assert!(matches!(err, DappError::TransferPending(_)));
        let api = ApiError::from(err);
        assert_eq!(api.status, StatusCode::CONFLICT);
        assert_eq!(api.message, "Withdrawal pending confirmation");

        let ledger = &f.state.ledger;
        assert_eq!(ledger.get_balance(&f.address).unwrap(), 10.0);
        assert_eq!(ledger.get_nonce(&f.address).unwrap(), 0);
        let pending = ledger.get_pending_withdrawal(&f.address).unwrap().unwrap();
        assert_eq!(pending.amount, 10.0);
        assert_eq!(pending.nonce, 0);

        // Still in the mempool: the same signature cannot pay out again.
        f.transfer.set_status(Some(TransferStatus::Pending));
        let err = withdraw_all(&f.state, req.clone()).await.unwrap_err();
        assert!(matches!(err, DappError::TransferPending(_)));
        assert_eq!(f.transfer.count(), 1);
        assert_eq!(ledger.get_balance(&f.address).unwrap(), 10.0);

        // Mined: the retry completes the original withdrawal.
        f.transfer.set_status(None);
        let res = withdraw_all(&f.state, req.clone()).await.unwrap();
        assert_eq!(res.tx_hash, pending.tx_hash);
        assert_eq!(res.amount, 10.0);
        assert_eq!(f.transfer.count(), 1);
        assert_eq!(ledger.get_balance(&f.address).unwrap(), 0.0);
        assert_eq!(ledger.get_nonce(&f.address).unwrap(), 1);
        assert_eq!(ledger.get_pending_withdrawal(&f.address).unwrap(), None);
        assert_eq!(ledger.list_withdrawals(&f.address, 10).unwrap().len(), 1);

        let err = withdraw_all(&f.state, req).await.unwrap_err();
        assert!(matches!(err, DappError::Authentication(_)));
    }

    #[tokio::test]
    async fn payout_that_can_never_land_is_replaced() {
        let f = fixture(FakeTransfer::losing_replies(1));
        f.state.ledger.credit_once(&f.address, "o1", 10.0).unwrap();
        let req = request(&f, 0);
        withdraw_all(&f.state, req.clone()).await.unwrap_err();
        let first = f
            .state
            .ledger
            .get_pending_withdrawal(&f.address)
            .unwrap()
            .unwrap();

        f.transfer.set_status(Some(TransferStatus::Dropped));
        let res = withdraw_all(&f.state, req).await.unwrap();
        assert_ne!(res.tx_hash, first.tx_hash);
        assert_eq!(res.amount, 10.0);
        assert_eq!(f.transfer.count(), 2);
        assert_eq!(f.state.ledger.get_balance(&f.address).unwrap(), 0.0);
        assert_eq!(f.state.ledger.get_nonce(&f.address).unwrap(), 1);
    }

    #[tokio::test]
    async fn marker_left_after_settlement_is_cleared() {
        let f = fixture(FakeTransfer::default());
        let ledger = &f.state.ledger;
        ledger.increment_nonce(&f.address).unwrap();
        ledger
            .set_pending_withdrawal(
                &f.address,
                &PendingWithdrawal {
                    tx_hash: "0xold".into(),
                    tx_nonce: 0,
                    nonce: 0,
                    amount: 5.0,
                    created_at: 1,
                },
            )
            .unwrap();
        ledger.credit_once(&f.address, "o2", 2.0).unwrap();

        let res = withdraw_all(&f.state, request(&f, 1)).await.unwrap();
        assert_eq!(res.amount, 2.0);
        assert_eq!(ledger.get_nonce(&f.address).unwrap(), 2);
        assert_eq!(ledger.get_pending_withdrawal(&f.address).unwrap(), None);
    }

    #[tokio::test]
    async fn empty_balance_is_refused() {
        let f = fixture(FakeTransfer::default());
        let err = withdraw_all(&f.state, request(&f, 0)).await.unwrap_err();
        assert_eq!(ApiError::from(err).message, "No balance to withdraw");
        assert_eq!(f.transfer.count(), 0);
    }

    #[tokio::test]
    async fn signature_from_another_key_is_refused() {
        let f = fixture(FakeTransfer::default());
        f.state.ledger.credit_once(&f.address, "o1", 1.0).unwrap();
        let intruder = PrivateKeySigner::random();
        let req = WithdrawRequest {
            address: Some(f.address.clone()),
            signature: Some(sign(&intruder, &withdraw_message(&f.address, 0))),
        };
        let err = withdraw_all(&f.state, req).await.unwrap_err();
        assert_eq!(ApiError::from(err).status, StatusCode::UNAUTHORIZED);
        assert_eq!(f.transfer.count(), 0);
        assert_eq!(f.state.ledger.get_balance(&f.address).unwrap(), 1.0);
    }

    #[tokio::test]
    async fn one_withdrawal_in_flight_per_address() {
        let f = fixture(FakeTransfer::default());
        f.state.ledger.credit_once(&f.address, "o1", 1.0).unwrap();
        let held = LeaseGuard::acquire(
            &f.state.store,
            keys::withdraw_lock(&f.address),
            DEFAULT_LEASE_TTL,
        )
        .unwrap()
        .unwrap();

        let err = withdraw_all(&f.state, request(&f, 0)).await.unwrap_err();
        assert_eq!(ApiError::from(err).status, StatusCode::CONFLICT);
        assert_eq!(f.transfer.count(), 0);

        drop(held);
        assert!(withdraw_all(&f.state, request(&f, 0)).await.is_ok());
    }

    #[tokio::test]
    async fn missing_hot_wallet_is_a_configuration_error() {
        let f = fixture(FakeTransfer::default());
        let mut state = f.state.clone();
        state.transfer = None;
        state.ledger.credit_once(&f.address, "o1", 1.0).unwrap();

        let err = withdraw_all(&state, request(&f, 0)).await.unwrap_err();
        assert!(matches!(err, DappError::Configuration(_)));
        assert_eq!(state.ledger.get_balance(&f.address).unwrap(), 1.0);
    }

    #[tokio::test]
    async fn input_validation() {
        let f = fixture(FakeTransfer::default());
        let err = withdraw_all(
            &f.state,
            WithdrawRequest {
                address: Some(f.address.clone()),
                signature: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(ApiError::from(err).message, "Missing required fields");

        let err = withdraw_all(
            &f.state,
            WithdrawRequest {
                address: Some("0xzz".into()),
                signature: Some("0x00".into()),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(ApiError::from(err).message, "Invalid address format");
    }

    #[tokio::test]
    async fn message_helper_matches_what_is_verified() {
        let f = fixture(FakeTransfer::default());
        f.state.ledger.credit_once(&f.address, "o1", 4.0).unwrap();

        let Json(msg) = withdraw_message_handler(
            State(f.state.clone()),
            Ok(Query(AddressQuery {
                address: Some(f.address.clone()),
            })),
        )
        .await
        .unwrap();
        assert_eq!(msg.nonce, 0);
        assert_eq!(msg.balance, 4.0);

        let req = WithdrawRequest {
            address: Some(f.address.clone()),
            signature: Some(sign(&f.owner, &msg.message)),
        };
        withdraw_all(&f.state, req).await.unwrap();

        let Json(list) = list_withdrawals(
            State(f.state.clone()),
            Ok(Query(AddressQuery {
                address: Some(f.address.clone()),
            })),
        )
        .await
        .unwrap();
        assert_eq!(list.withdrawals.len(), 1);
        assert_eq!(list.withdrawals[0].amount, 4.0);

        let err = list_withdrawals(State(f.state), Ok(Query(AddressQuery::default())))
            .await
            .unwrap_err();
        assert_eq!(err.message, "Missing address");
    }
}
