// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::bindings::BindingRegistry;
use crate::blockchain::{ChainClient, ChainConfig, HotWallet, SignatureVerifier, TokenTransfer};
use crate::config::{AppConfig, StoreBackend};
use crate::error::{DappError, DappResult};
use crate::ledger::Ledger;
use crate::providers::{PartnerApi, PartnerClient, PartnerError};
use crate::storage::{KvStore, MemoryStore, RedbStore, StoreError};

/// Failures that prevent the server from starting at all.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to open ledger store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to build partner client: {0}")]
    Partner(#[from] PartnerError),
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn KvStore>,
    pub ledger: Ledger,
    pub bindings: BindingRegistry,
    pub partner: Arc<dyn PartnerApi>,
    pub verifier: SignatureVerifier,
    /// `None` when no hot wallet is configured; withdrawals then fail as not configured.
    pub transfer: Option<Arc<dyn TokenTransfer>>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn KvStore>,
        partner: Arc<dyn PartnerApi>,
        verifier: SignatureVerifier,
        transfer: Option<Arc<dyn TokenTransfer>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            ledger: Ledger::new(Arc::clone(&store)),
            bindings: BindingRegistry::new(Arc::clone(&store)),
            store,
            partner,
            verifier,
            transfer,
        }
    }

    /// Open the store and build every client the configuration allows.
    ///
    /// Missing secrets are not fatal here: the operation that needs them
    /// reports "not configured" at request time.
    pub fn from_config(config: AppConfig) -> Result<Self, StartupError> {
        let store: Arc<dyn KvStore> = match config.store_backend {
            StoreBackend::Redb => {
                let path = config.ledger_path();
                info!(path = %path.display(), "Opening ledger store");
                Arc::new(RedbStore::open(&path)?)
            }
            StoreBackend::Memory => {
                warn!("Using in-memory ledger store, balances are lost on restart");
                Arc::new(MemoryStore::new())
            }
        };

        let partner = PartnerClient::new(
            config.partner.clone(),
            config.outbound_timeout,
            Arc::clone(&store),
        )?;
        if !partner.is_configured() {
            warn!("Partner credentials not configured, bind and asset sync will fail");
        }

        let chain_config = ChainConfig::from_settings(&config.chain);
        let network = chain_config.network_name();
        let verifier = match ChainClient::new(chain_config, config.outbound_timeout) {
            Ok(chain) => SignatureVerifier::with_chain(chain),
            Err(e) => {
                warn!(error = %e, "Chain RPC unusable, contract wallet signatures disabled");
                SignatureVerifier::offline()
            }
        };

        let transfer = match HotWallet::from_settings(&config.chain, config.outbound_timeout) {
            Ok(Some(wallet)) => Some(Arc::new(wallet) as Arc<dyn TokenTransfer>),
            Ok(None) => {
                warn!("Hot wallet or CASE token address not configured, withdrawals disabled");
                None
            }
            Err(e) => {
                error!(error = %e, "Hot wallet unusable, withdrawals disabled");
                None
            }
        };

        if config.push_signer_address.is_none() {
            warn!("PUSH_SIGNER_ADDRESS not configured, push credits will be refused");
        }
        info!(%network, "Application state ready");

        Ok(Self::new(
            config,
            store,
            Arc::new(partner),
            verifier,
            transfer,
        ))
    }

    /// Address whose signature authorises push credits.
    pub fn push_signer(&self) -> DappResult<&str> {
        self.config
            .push_signer_address
            .as_deref()
            .ok_or_else(|| DappError::Configuration("PUSH_SIGNER_ADDRESS".into()))
    }

    pub fn hot_wallet(&self) -> DappResult<&Arc<dyn TokenTransfer>> {
        self.transfer
            .as_ref()
            .ok_or_else(|| DappError::Configuration("HOT_WALLET_PRIVATE_KEY".into()))
    }
}
