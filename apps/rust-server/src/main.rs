// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tally_server::{
    api::router,
    config::{Config, LogFormat, DEFAULT_LOG_FILTER},
    state::AppState,
    store::UserStore,
};

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(config.log_format);

    let addr = config.bind_address();
    let environment = config.environment;
    let state = AppState::new(config, UserStore::new());

    match state.seed_admin().await {
        Ok(Some(admin)) => info!(user_id = %admin.id, email = %admin.email, "seeded admin account"),
        Ok(None) => {}
        Err(e) => {
            error!(error = %e, "failed to seed admin account");
            std::process::exit(1);
        }
    }

    if !environment.is_production() {
        warn!("running in development mode: cookies are not marked Secure");
    }

    let app = router(state);
    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listen address");

    info!(%addr, ?environment, "Tally server listening (docs at /docs)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("HTTP server failed");
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
