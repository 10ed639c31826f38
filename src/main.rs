// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;

use bankaccount_gateway::{api::router, config::Settings, logging::init_tracing, state::AppState};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(settings.log_format);

    let addr = match settings.bind_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!(error = %e, "Invalid bind address");
            std::process::exit(1);
        }
    };

    info!(
        issuer = %settings.issuer(),
        use_jwks = settings.use_jwks,
        production = settings.production,
        "Loaded configuration"
    );

    let state = match AppState::from_settings(settings) {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "Failed to initialise application state");
            std::process::exit(1);
        }
    };
    let app = router(state);

    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind listen address");
    info!(%addr, "Bank account gateway listening (docs at /api-doc/openapi.json)");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("HTTP server failed");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
