// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Partner identity / asset service client.
//!
//! ## Token cache
//!
//! One bearer token is shared by the whole process. It lives in memory and
//! is mirrored under `partner:token` in the store so a restart (or a sibling
//! instance on the same store) can reuse it. A token is refreshed once it is
//! within [`TOKEN_REFRESH_SKEW_MS`] of expiry; refreshes are single-flighted
//! so a burst of requests triggers one token call.
//!
//! ## Response parsing
//!
//! Partner responses are loosely shaped. They are parsed into strict types
//! here: page envelopes come from `data`, else `result`; asset ids come from
//! `assetId`, else `id`, else `orderSn`. Scalars may arrive as strings or
//! numbers. A record that has no id, or is not an object at all, is dropped
//! on its own without failing the rest of the page.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::PartnerConfig;
use crate::error::DappError;
use crate::ledger::now_ms;
use crate::storage::{keys, KvStore};

/// Refresh the token when it has less than this left.
pub const TOKEN_REFRESH_SKEW_MS: i64 = 60_000;

const TOKEN_PATH: &str = "/common/auth/api/token";
const BIND_PATH: &str = "/common/digital/asset/bind/address";
const ASSET_QUERY_PATH: &str = "/common/digital/asset/assets/query/page";

/// Header carrying `"{tokenType} {accessToken}"`.
const AUTH_HEADER: &str = "accessToken";

#[derive(Debug, thiserror::Error)]
pub enum PartnerError {
    #[error("partner configuration missing: {0}")]
    MissingConfig(String),

    #[error("partner auth failed: {0}")]
    Auth(String),

    /// The partner answered and said no.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("partner request failed: {0}")]
    Request(String),

    #[error("partner request timed out")]
    Timeout,

    #[error("partner response was invalid: {0}")]
    InvalidResponse(String),
}

impl From<PartnerError> for DappError {
    fn from(err: PartnerError) -> Self {
        match err {
            PartnerError::MissingConfig(what) => DappError::Configuration(what),
            PartnerError::Rejected { message, .. } => DappError::rejected(message),
            PartnerError::Timeout => DappError::Timeout("partner API".into()),
            PartnerError::Auth(_) => DappError::Configuration("valid partner credentials".into()),
            other @ (PartnerError::Request(_) | PartnerError::InvalidResponse(_)) => {
                DappError::unreachable(other.to_string())
            }
        }
    }
}

fn request_error(e: reqwest::Error) -> PartnerError {
    if e.is_timeout() {
        PartnerError::Timeout
    } else {
        PartnerError::Request(e.to_string())
    }
}

// =============================================================================
// Token
// =============================================================================

/// Cached partner bearer credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PartnerToken {
    pub access_token: String,
    pub token_type: String,
    /// Expiry in ms since the Unix epoch.
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
}

impl PartnerToken {
    pub fn is_fresh(&self, now_ms: i64) -> bool {
        self.expires_at > now_ms + TOKEN_REFRESH_SKEW_MS
    }

    pub fn auth_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResult {
    access_token: String,
    token_type: String,
    #[serde(default)]
    expires_in: i64,
    #[serde(default)]
    client_name: Option<String>,
    #[serde(default)]
    permissions: Option<String>,
}

/// `{ success, message, code, result | data }`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    message: Option<Value>,
    #[serde(default = "none")]
    result: Option<T>,
    #[serde(default = "none")]
    data: Option<T>,
}

fn none<T>() -> Option<T> {
    None
}

impl<T> Envelope<T> {
    fn message_or(&self, fallback: &str) -> String {
        self.message
            .as_ref()
            .and_then(Value::as_str)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(fallback)
            .to_string()
    }
}

// =============================================================================
// Assets
// =============================================================================

/// One credit-bearing record from the partner asset ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetRecord {
    pub id: String,
    pub asset_type: Option<String>,
    /// `None` when the partner sent something that is not a number.
    pub amount: Option<f64>,
    pub create_time: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAssetRecord {
    #[serde(default)]
    asset_id: Option<Value>,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    order_sn: Option<Value>,
    #[serde(default)]
    amount: Option<Value>,
    #[serde(default)]
    asset_type: Option<Value>,
    #[serde(default)]
    create_time: Option<Value>,
    #[serde(default)]
    status: Option<Value>,
}

fn identifier(value: &Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn text(value: &Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    }
}

fn count(value: &Option<Value>) -> Option<u64> {
    match value {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

fn numeric(value: &Option<Value>) -> Option<f64> {
    let n = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|v| v.is_finite())
}

impl AssetRecord {
    fn from_raw(raw: RawAssetRecord) -> Option<Self> {
        let id = identifier(&raw.asset_id)
            .or_else(|| identifier(&raw.id))
            .or_else(|| identifier(&raw.order_sn))?;
        Some(Self {
            id,
            asset_type: text(&raw.asset_type),
            amount: numeric(&raw.amount),
            create_time: text(&raw.create_time),
            status: text(&raw.status),
        })
    }

    /// Records without a declared type count as CASE.
    pub fn is_case(&self) -> bool {
        self.asset_type
            .as_deref()
            .map_or(true, |t| t.eq_ignore_ascii_case("CASE"))
    }

    /// Strictly positive amount, if any.
    pub fn credit_amount(&self) -> Option<f64> {
        self.amount.filter(|a| *a > 0.0)
    }

    /// `createTime` in ms, or `fallback` when absent or unparseable.
    pub fn timestamp_or(&self, fallback: i64) -> i64 {
        self.create_time
            .as_deref()
            .and_then(parse_partner_time)
            .unwrap_or(fallback)
    }
}

/// Epoch ms digits, RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or a bare date.
fn parse_partner_time(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        return raw.parse().ok();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}

/// One page of the partner asset ledger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetPage {
    pub records: Vec<AssetRecord>,
    /// Records on the page as sent, including dropped ones.
    pub fetched: u32,
    pub pages: u32,
    pub current: u32,
    pub total: u64,
}

#[derive(Debug, Default, Deserialize)]
struct RawAssetPage {
    #[serde(default)]
    records: Option<Vec<Value>>,
    #[serde(default)]
    pages: Option<Value>,
    #[serde(default)]
    current: Option<Value>,
    #[serde(default)]
    total: Option<Value>,
}

impl AssetPage {
    fn from_raw(raw: RawAssetPage, requested: u32) -> Self {
        let raw_records = raw.records.unwrap_or_default();
        let fetched = raw_records.len() as u32;
        let records: Vec<AssetRecord> = raw_records
            .into_iter()
            .filter_map(|value| serde_json::from_value::<RawAssetRecord>(value).ok())
            .filter_map(AssetRecord::from_raw)
            .collect();
        if (records.len() as u32) < fetched {
            debug!(
                dropped = fetched - records.len() as u32,
                "Dropped unreadable partner asset records"
            );
        }
        let small = |v: &Option<Value>| count(v).and_then(|n| u32::try_from(n).ok());
        Self {
            records,
            fetched,
            pages: small(&raw.pages).unwrap_or(1).max(1),
            current: small(&raw.current).unwrap_or(requested),
            total: count(&raw.total).unwrap_or(0),
        }
    }
}

// =============================================================================
// PartnerApi
// =============================================================================

/// Operations the ledger needs from the partner service.
#[async_trait]
pub trait PartnerApi: Send + Sync {
    /// Register `address` for `user_id` with the partner. Succeeds only if the
    /// partner confirms the binding.
    async fn bind_address(&self, user_id: &str, address: &str) -> Result<(), PartnerError>;

    /// Fetch one page (1-based) of the asset ledger for a bound pair.
    async fn query_assets(
        &self,
        user_id: &str,
        address: &str,
        page: u32,
        page_size: u32,
    ) -> Result<AssetPage, PartnerError>;
}

/// HTTP client for the partner service.
#[derive(Clone)]
pub struct PartnerClient {
    config: PartnerConfig,
    http: Client,
    store: Arc<dyn KvStore>,
    cache: Arc<RwLock<Option<PartnerToken>>>,
    refresh: Arc<Mutex<()>>,
}

impl PartnerClient {
    pub fn new(
        config: PartnerConfig,
        timeout: Duration,
        store: Arc<dyn KvStore>,
    ) -> Result<Self, PartnerError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PartnerError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            http,
            store,
            cache: Arc::new(RwLock::new(None)),
            refresh: Arc::new(Mutex::new(())),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.config.username.is_some() && self.config.password.is_some()
    }

    /// A token valid for at least another minute.
    pub async fn access_token(&self) -> Result<PartnerToken, PartnerError> {
        if let Some(token) = self.cached(now_ms()).await {
            return Ok(token);
        }

        let _refresh = self.refresh.lock().await;

        // Another task may have refreshed while we waited.
        let now = now_ms();
        if let Some(token) = self.cached(now).await {
            return Ok(token);
        }
        if let Some(token) = self.load_persisted(now) {
            *self.cache.write().await = Some(token.clone());
            return Ok(token);
        }

        let token = self.fetch_token().await?;
        self.persist(&token);
        *self.cache.write().await = Some(token.clone());
        Ok(token)
    }

    async fn cached(&self, now: i64) -> Option<PartnerToken> {
        let cache = self.cache.read().await;
        cache.as_ref().filter(|t| t.is_fresh(now)).cloned()
    }

    fn load_persisted(&self, now: i64) -> Option<PartnerToken> {
        self.read_persisted().filter(|t| t.is_fresh(now))
    }

    fn read_persisted(&self) -> Option<PartnerToken> {
        let raw = match self.store.get(keys::PARTNER_TOKEN) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "Failed to read cached partner token");
                return None;
            }
        };
        serde_json::from_str(&raw).ok()
    }

    /// Forget `stale` in memory and in the store, unless a newer token has
    /// already replaced it.
    async fn evict(&self, stale: &PartnerToken) {
        let _refresh = self.refresh.lock().await;
        {
            let mut cache = self.cache.write().await;
            if cache
                .as_ref()
                .is_some_and(|t| t.access_token == stale.access_token)
            {
                *cache = None;
            }
        }
        if self
            .read_persisted()
            .is_some_and(|t| t.access_token == stale.access_token)
        {
            if let Err(e) = self.store.delete(keys::PARTNER_TOKEN) {
                warn!(error = %e, "Failed to drop rejected partner token");
            }
        }
    }

    fn persist(&self, token: &PartnerToken) {
        let result = serde_json::to_string(token)
            .map_err(crate::storage::StoreError::from)
            .and_then(|json| self.store.set(keys::PARTNER_TOKEN, &json));
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist partner token");
        }
    }

    async fn fetch_token(&self) -> Result<PartnerToken, PartnerError> {
        let (Some(username), Some(password)) = (&self.config.username, &self.config.password)
        else {
            return Err(PartnerError::MissingConfig("partner auth credentials".into()));
        };

        let response = self
            .http
            .post(format!("{}{TOKEN_PATH}", self.config.base_url))
            .json(&json!({
                "username": username,
                "password": password,
                "clientName": self.config.client_name,
            }))
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(PartnerError::Request(format!(
                "token endpoint returned {status}"
            )));
        }
        let envelope: Option<Envelope<TokenResult>> = read_json(response).await?;
        let (message, result) = match envelope {
            Some(env) => (env.message_or("Failed to fetch partner token"), env.result),
            None => ("Failed to fetch partner token".to_string(), None),
        };
        let result = match result {
            Some(result) if status.is_success() => result,
            _ => {
                warn!(upstream_status = status.as_u16(), %message, "Partner refused credentials");
                return Err(PartnerError::Auth(message));
            }
        };

        let lifetime_ms = result.expires_in.max(0).saturating_mul(1000);
        let token = PartnerToken {
            access_token: result.access_token,
            token_type: result.token_type,
            expires_at: now_ms().saturating_add(lifetime_ms),
            client_name: result.client_name,
            permissions: result.permissions,
        };
        info!(
            expires_in_secs = result.expires_in,
            "Obtained partner access token"
        );
        Ok(token)
    }

    async fn post_authorized(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<reqwest::Response, PartnerError> {
        let token = self.access_token().await?;
        let response = self.send_with(&token, path, body).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!(%path, "Partner rejected the cached token, refreshing");
        self.evict(&token).await;
        let token = self.access_token().await?;
        self.send_with(&token, path, body).await
    }

    async fn send_with(
        &self,
        token: &PartnerToken,
        path: &str,
        body: &Value,
    ) -> Result<reqwest::Response, PartnerError> {
        self.http
            .post(format!("{}{path}", self.config.base_url))
            .header(AUTH_HEADER, token.auth_header())
            .json(body)
            .send()
            .await
            .map_err(request_error)
    }
}

/// Body as JSON, or `None` if it is empty or not JSON.
async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<Option<T>, PartnerError> {
    let text = response.text().await.map_err(request_error)?;
    Ok(serde_json::from_str(&text).ok())
}

fn rejected(status: StatusCode, message: String) -> PartnerError {
    PartnerError::Rejected {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl PartnerApi for PartnerClient {
    async fn bind_address(&self, user_id: &str, address: &str) -> Result<(), PartnerError> {
        let response = self
            .post_authorized(
                BIND_PATH,
                &json!({
                    "userId": user_id,
                    "evmAddress": address,
                    "timestamp": now_ms(),
                }),
            )
            .await?;

        let status = response.status();
        let envelope: Option<Envelope<Value>> = read_json(response).await?;
        let confirmed = envelope
            .as_ref()
            .and_then(|env| env.result.as_ref())
            .is_some_and(|r| *r == Value::Bool(true));

        if status.is_success() && confirmed {
            Ok(())
        } else {
            let message = envelope
                .map(|env| env.message_or("Bind failed"))
                .unwrap_or_else(|| "Bind failed".to_string());
            warn!(%user_id, %address, upstream_status = status.as_u16(), %message, "Partner rejected bind");
            Err(rejected(status, message))
        }
    }

    async fn query_assets(
        &self,
        user_id: &str,
        address: &str,
        page: u32,
        page_size: u32,
    ) -> Result<AssetPage, PartnerError> {
        let response = self
            .post_authorized(
                ASSET_QUERY_PATH,
                &json!({
                    "userId": user_id,
                    "evmAddress": address,
                    "pageNumber": page,
                    "pageSize": page_size,
                }),
            )
            .await?;

        let status = response.status();
        let envelope: Option<Envelope<RawAssetPage>> = read_json(response).await?;

        if !status.is_success() {
            let message = envelope
                .map(|env| env.message_or("Asset query failed"))
                .unwrap_or_else(|| "Asset query failed".to_string());
            return Err(rejected(status, message));
        }

        let envelope = envelope.ok_or_else(|| {
            PartnerError::InvalidResponse("asset query body is not JSON".into())
        })?;
        let raw = envelope.data.or(envelope.result).unwrap_or_default();
        Ok(AssetPage::from_raw(raw, page))
    }
}
