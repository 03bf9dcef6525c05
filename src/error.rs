// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::storage::StoreError;

/// Domain errors raised by the ledger operations.
///
/// Only the `Display` text of client-facing variants reaches a response body;
/// infrastructure variants are logged and replaced with a generic message.
#[derive(Debug, thiserror::Error)]
pub enum DappError {
    /// Malformed or missing input. The client must fix and resend.
    #[error("{0}")]
    Validation(String),

    /// Signature invalid or signed by the wrong account.
    #[error("{0}")]
    Authentication(String),

    /// Idempotency key already consumed, or a concurrent operation holds the key.
    #[error("{0}")]
    Conflict(String),

    /// Unknown order id, unbound user id.
    #[error("{0}")]
    NotFound(String),

    /// Partner rejected a request (`retryable == false`) or could not be reached.
    #[error("{message}")]
    Upstream { message: String, retryable: bool },

    /// An outbound call exceeded its timeout. Safe to retry.
    #[error("{0} timed out")]
    Timeout(String),

    /// A required secret or address is missing.
    #[error("{0} not configured")]
    Configuration(String),

    /// The on-chain transfer could not be submitted.
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// A payout was handed to the node but its fate is not known yet. The
    /// withdrawal stays blocked until the transaction is found or dropped.
    #[error("transfer {0} pending confirmation")]
    TransferPending(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl DappError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            retryable: true,
        }
    }

    /// Whether a client may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Upstream {
                retryable: true,
                ..
            } | Self::Timeout(_)
                | Self::TransferPending(_)
                | Self::Store(_)
        )
    }
}

pub type DappResult<T> = Result<T, DappError>;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<DappError> for ApiError {
    fn from(err: DappError) -> Self {
        match err {
            DappError::Validation(message) => Self::bad_request(message),
            DappError::Authentication(message) => Self::unauthorized(message),
            DappError::Conflict(message) => Self::conflict(message),
            DappError::NotFound(message) => Self::not_found(message),
            DappError::Upstream {
                message,
                retryable: false,
            } => Self::bad_request(message),
            DappError::Upstream {
                message,
                retryable: true,
            } => {
                tracing::warn!(error = %message, "Upstream unavailable");
                Self::new(StatusCode::BAD_GATEWAY, "Upstream service unavailable")
            }
            DappError::Timeout(what) => {
                tracing::warn!(operation = %what, "Outbound call timed out");
                Self::new(StatusCode::GATEWAY_TIMEOUT, "Upstream service timed out")
            }
            DappError::Configuration(what) => {
                tracing::error!(missing = %what, "Required configuration missing");
                Self::internal("Service not configured")
            }
            DappError::Transfer(detail) => {
                tracing::error!(error = %detail, "On-chain transfer failed");
                Self::internal("Transfer failed")
            }
            DappError::TransferPending(tx_hash) => {
                tracing::warn!(%tx_hash, "Withdrawal awaiting on-chain confirmation");
                Self::conflict("Withdrawal pending confirmation")
            }
            DappError::Store(e) => {
                tracing::error!(error = %e, "Store operation failed");
                Self::internal("Internal server error")
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "Rejected request body");
        Self::bad_request("Invalid request body")
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "Rejected query string");
        Self::bad_request("Invalid query parameters")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}
