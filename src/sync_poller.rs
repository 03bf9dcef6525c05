// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Asset Sync Poller
//!
//! Background task that periodically runs the asset sync for every bound
//! address, so partner credits land without the frontend calling
//! `POST /assets/sync`.
//!
//! Enabled by `ASSET_SYNC_INTERVAL_SECS`. A failing address is logged and
//! skipped; the sweep continues with the next one. Syncs are idempotent, so
//! overlapping with a user-triggered sync is harmless.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken`, checked between sweeps and
//! between addresses.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::assets::sync_binding;
use crate::state::AppState;

/// Background sweep over all bound addresses.
pub struct SyncPoller {
    state: AppState,
    poll_interval: Duration,
}

/// Totals for one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    pub addresses: usize,
    pub failed: usize,
    pub new_records: u32,
}

impl SyncPoller {
    pub fn new(state: AppState, poll_interval: Duration) -> Self {
        Self {
            state,
            poll_interval,
        }
    }

    /// Run the poller loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(poller.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            "Asset sync poller starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Asset sync poller shutting down");
                return;
            }

            let summary = self.sweep(&shutdown).await;
            if summary.addresses > 0 {
                info!(
                    addresses = summary.addresses,
                    failed = summary.failed,
                    new_records = summary.new_records,
                    "Asset sync sweep finished"
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Asset sync poller shutting down");
                    return;
                }
            }
        }
    }

    /// Sync every bound address once.
    pub async fn sweep(&self, shutdown: &CancellationToken) -> SweepSummary {
        let mut summary = SweepSummary::default();

        let addresses = match self.state.bindings.bound_addresses() {
            Ok(addresses) => addresses,
            Err(e) => {
                warn!(error = %e, "Asset sync poller: cannot list bound addresses");
                return summary;
            }
        };

        for address in addresses {
            if shutdown.is_cancelled() {
                break;
            }
            summary.addresses += 1;

            let binding = match self.state.bindings.get_by_address(&address) {
                Ok(Some(binding)) => binding,
                Ok(None) => {
                    debug!(address = %address, "Asset sync poller: binding vanished");
                    continue;
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(address = %address, error = %e, "Asset sync poller: binding lookup failed");
                    continue;
                }
            };

            match sync_binding(&self.state, &binding.address, &binding).await {
                Ok(result) => summary.new_records += result.new_records,
                Err(e) => {
                    summary.failed += 1;
                    warn!(
                        address = %binding.address,
                        error = %e,
                        retryable = e.is_retryable(),
                        "Asset sync poller: sync failed"
                    );
                }
            }
        }

        summary
    }
}
