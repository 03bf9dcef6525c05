// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;

use case_dapp_server::{
    api::router,
    config::AppConfig,
    logging::{init_logging, LogFormat},
    state::AppState,
    sync_poller::SyncPoller,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    init_logging(LogFormat::from_env());

    let config = AppConfig::from_env();
    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!(host = %config.host, port = config.port, error = %e, "Invalid bind address");
            std::process::exit(1);
        }
    };
    let sync_interval = config.asset_sync_interval;

    let state = match AppState::from_config(config) {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "Failed to initialise application state");
            std::process::exit(1);
        }
    };

    let shutdown = CancellationToken::new();
    let poller = sync_interval.map(|interval| {
        tokio::spawn(SyncPoller::new(state.clone(), interval).run(shutdown.clone()))
    });

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "Failed to bind listener");
            std::process::exit(1);
        }
    };
    info!(%addr, "CASE dapp server listening (docs at /docs)");

    let app = router(state);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await;

    shutdown.cancel();
    if let Some(poller) = poller {
        let _ = poller.await;
    }

    if let Err(e) = served {
        error!(error = %e, "Server failed");
        std::process::exit(1);
    }
    info!("Server stopped");
}

/// Resolves on SIGINT or SIGTERM, and cancels `token` so background tasks stop too.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = token.cancelled() => {}
    }
    info!("Shutdown signal received");
    token.cancel();
}
