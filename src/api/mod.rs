// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{
        AssetSyncRequest, AssetSyncResponse, BalanceResponse, BindRequest, BindResponse,
        BindStatusResponse, BindingRecord, OrderKind, OrderRecord, PushRecordResponse,
        PushRequest, PushResponse, WalletAddress, WithdrawMessageResponse, WithdrawRequest,
        WithdrawResponse, WithdrawalListResponse, WithdrawalRecord,
    },
    state::AppState,
};

pub mod assets;
pub mod balance;
pub mod bind;
pub mod health;
pub mod push;
pub mod withdraw;

pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/push", post(push::push_credit))
        .route("/push/{order_id}", get(push::get_push_record))
        .route("/assets/sync", post(assets::sync_assets_handler))
        .route("/balance", get(balance::get_balance))
        .route("/bind", get(bind::get_binding).post(bind::create_binding))
        .route("/withdraw", post(withdraw::withdraw))
        .route("/withdraw/message", get(withdraw::withdraw_message_handler))
        .route("/withdrawals", get(withdraw::list_withdrawals))
        .with_state(state);

    routes
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        push::push_credit,
        push::get_push_record,
        assets::sync_assets_handler,
        balance::get_balance,
        bind::get_binding,
        bind::create_binding,
        withdraw::withdraw,
        withdraw::withdraw_message_handler,
        withdraw::list_withdrawals
    ),
    components(
        schemas(
            WalletAddress,
            OrderKind,
            OrderRecord,
            BindingRecord,
            WithdrawalRecord,
            PushRequest,
            PushResponse,
            PushRecordResponse,
            AssetSyncRequest,
            AssetSyncResponse,
            BalanceResponse,
            BindRequest,
            BindResponse,
            BindStatusResponse,
            WithdrawRequest,
            WithdrawResponse,
            WithdrawMessageResponse,
            WithdrawalListResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Push", description = "Partner-signed credits"),
        (name = "Assets", description = "Partner asset ledger sync"),
        (name = "Balance", description = "Off-chain ledger state"),
        (name = "Bind", description = "User id to address bindings"),
        (name = "Withdraw", description = "On-chain payouts")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use alloy::signers::local::PrivateKeySigner;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::blockchain::{push_message, withdraw_message};
    use crate::ledger::now_ms;
    use crate::state::test_support::{asset, state_with, FakePartner, FakeTransfer};

    use super::push::tests::sign;

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    struct Harness {
        app: Router,
        partner_key: PrivateKeySigner,
        transfer: Arc<FakeTransfer>,
        partner: Arc<FakePartner>,
    }

    fn harness(partner: FakePartner) -> Harness {
        let partner_key = PrivateKeySigner::random();
        let signer = partner_key.address().to_string();
        let transfer = Arc::new(FakeTransfer::default());
        let partner = Arc::new(partner);
        let state = state_with(
            &[("PUSH_SIGNER_ADDRESS", signer.as_str())],
            Arc::clone(&partner),
            Some(Arc::clone(&transfer)),
        );
        Harness {
            app: router(state),
            partner_key,
            transfer,
            partner,
        }
    }

    fn push_body(key: &PrivateKeySigner, order_id: &str, address: &str, amount: f64) -> Value {
        let timestamp = now_ms();
        let signature = sign(key, &push_message(order_id, address, amount, timestamp));
        json!({
            "orderId": order_id,
            "address": address,
            "amount": amount,
            "timestamp": timestamp,
            "signature": signature,
        })
    }

    #[tokio::test]
    async fn push_balance_withdraw_scenario() {
        let h = harness(FakePartner::default());
        let owner = PrivateKeySigner::random();
        let address = owner.address().to_string();

        let body = push_body(&h.partner_key, "o1", &address, 10.0);
        let (status, res) = call(&h.app, post_json("/push", body.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(res, json!({"success": true, "newBalance": 10.0}));

        let (status, res) = call(&h.app, post_json("/push", body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(res, json!({"error": "Order already processed"}));

        let (status, res) = call(&h.app, get(&format!("/balance?address={address}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(res["balance"], json!(10.0));
        assert_eq!(res["nonce"], json!(0));
        assert_eq!(res["orders"][0]["orderId"], "o1");
        assert_eq!(res["orders"][0]["type"], "push");

        let signature = sign(&owner, &withdraw_message(&address, 0));
        let (status, res) = call(
            &h.app,
            post_json("/withdraw", json!({"address": address, "signature": signature})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(res["success"], json!(true));
        assert_eq!(res["amount"], json!(10.0));
        assert!(res["txHash"].as_str().unwrap().starts_with("0x"));
        assert_eq!(h.transfer.count(), 1);

        let (_, res) = call(&h.app, get(&format!("/balance?address={address}"))).await;
        assert_eq!(res["balance"], json!(0.0));
        assert_eq!(res["nonce"], json!(1));
        assert_eq!(res["orders"][0]["type"], "withdraw");

        // Replaying the nonce-0 signature is refused.
        h.app
            .clone()
            .oneshot(post_json("/push", push_body(&h.partner_key, "o2", &address, 1.0)))
            .await
            .unwrap();
        let (status, res) = call(
            &h.app,
            post_json("/withdraw", json!({"address": address, "signature": signature})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(res, json!({"error": "Invalid signature"}));
    }

    #[tokio::test]
    async fn push_record_route() {
        let h = harness(FakePartner::default());
        let address = "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
        call(&h.app, post_json("/push", push_body(&h.partner_key, "o9", address, 2.0))).await;

        let (status, res) = call(&h.app, get("/push/o9")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(res["address"], address);
        assert!(res["signMessage"]
            .as_str()
            .unwrap()
            .starts_with("Push CASE to Dapp\nOrderId: o9\n"));

        let (status, res) = call(&h.app, get("/push/missing")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(res, json!({"error": "Order not found"}));
    }

    #[tokio::test]
    async fn bind_then_sync_over_http() {
        let h = harness(FakePartner::with_records(vec![
            asset("a1", Some("CASE"), Some(7.0)),
            asset("a2", Some("BTC"), Some(7.0)),
        ]));
        let address = "0xAbCdEf0000000000000000000000000000000001";

        let (status, res) = call(&h.app, post_json("/assets/sync", json!({"address": address}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(res, json!({"error": "Address not bound"}));

        let (status, res) = call(
            &h.app,
            post_json("/bind", json!({"userId": "u1", "address": address})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(res["binding"]["userId"], "u1");
        assert_eq!(h.partner.binds(), 1);

        let (_, res) = call(&h.app, get("/bind?userId=u1")).await;
        assert_eq!(res["bound"], json!(true));

        let (status, res) = call(
            &h.app,
            Request::post(format!("/assets/sync?address={address}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(res, json!({"success": true, "newRecords": 1, "totalFetched": 2}));

        let (_, res) = call(&h.app, post_json("/assets/sync", json!({"address": address}))).await;
        assert_eq!(res["newRecords"], json!(0));

        let (_, res) = call(&h.app, get("/balance?userId=u1")).await;
        assert_eq!(res["balance"], json!(7.0));
    }

    #[tokio::test]
    async fn malformed_bodies_get_json_errors() {
        let h = harness(FakePartner::default());
        let request = Request::post("/push")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, res) = call(&h.app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(res, json!({"error": "Invalid request body"}));

        let (status, res) = call(&h.app, post_json("/withdraw", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(res, json!({"error": "Missing required fields"}));

        let (status, res) = call(&h.app, get("/bind")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(res, json!({"error": "Missing address or userId"}));
    }

    #[tokio::test]
    async fn responses_carry_request_id() {
        let h = harness(FakePartner::default());
        let response = h.app.clone().oneshot(get("/health/live")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn openapi_document_lists_every_route() {
        let h = harness(FakePartner::default());
        let (status, doc) = call(&h.app, get("/api-doc/openapi.json")).await;
        assert_eq!(status, StatusCode::OK);
        for path in [
            "/push",
            "/push/{order_id}",
            "/assets/sync",
            "/balance",
            "/bind",
            "/withdraw",
            "/withdraw/message",
            "/withdrawals",
            "/health/ready",
        ] {
            assert!(doc["paths"].get(path).is_some(), "missing {path}");
        }
    }
}
