// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

/// Health check response with individual component status.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    /// Individual health checks and their results.
    pub checks: HealthChecks,
}

/// Individual health check results.
///
/// Only `store` affects readiness. The remaining entries report which
/// operations are configured ("configured" / "missing").
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    /// Whether the service process is running.
    pub service: String,
    /// Ledger store reachability.
    pub store: String,
    /// Partner credentials, needed by bind and asset sync.
    pub partner: String,
    /// Push signer address, needed by push credits.
    pub push_signer: String,
    /// Hot wallet and token address, needed by withdrawals.
    pub hot_wallet: String,
}

/// Simple health check response for liveness probes.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

fn configured(present: bool) -> String {
    if present { "configured" } else { "missing" }.to_string()
}

fn check_store(state: &AppState) -> String {
    match state.store.ping() {
        Ok(()) => "ok".to_string(),
        Err(e) => {
            tracing::error!(error = %e, "Ledger store health check failed");
            "unavailable".to_string()
        }
    }
}

/// Health check endpoint handler.
///
/// Returns 200 if the store is reachable, 503 otherwise.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = ReadyResponse),
        (status = 503, description = "Service is unhealthy", body = ReadyResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let store = check_store(&state);
    let all_ok = store == "ok";

    let partner = &state.config.partner;
    let response = ReadyResponse {
        status: if all_ok { "ok" } else { "degraded" }.to_string(),
        checks: HealthChecks {
            service: "ok".to_string(),
            store,
            partner: configured(partner.username.is_some() && partner.password.is_some()),
            push_signer: configured(state.config.push_signer_address.is_some()),
            hot_wallet: configured(state.transfer.is_some()),
        },
    };

    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

/// Liveness probe handler.
///
/// Always returns 200 if the process is running.
/// Does not check dependencies - use readiness for that.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness probe handler.
///
/// Returns 200 only if the ledger store is available.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Service is not ready", body = ReadyResponse)
    )
)]
pub async fn readiness(state: State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    health(state).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::state::test_support::{state_with, FakePartner, FakeTransfer};

    #[tokio::test]
    async fn reports_configuration_summary() {
        let state = state_with(
            &[("PARTNER_AUTH_USERNAME", "svc")],
            Arc::new(FakePartner::default()),
            Some(Arc::new(FakeTransfer::default())),
        );
        let (status, Json(body)) = health(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
        assert_eq!(body.checks.store, "ok");
        assert_eq!(body.checks.partner, "missing");
        assert_eq!(body.checks.push_signer, "missing");
        assert_eq!(body.checks.hot_wallet, "configured");
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        assert_eq!(liveness().await.0.status, "ok");
    }
}
