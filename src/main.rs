// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use conference_auth::{
    api::router,
    auth::KeyResolver,
    config::{AuthSettings, LogFormat, ServerSettings, DEFAULT_LOG_FILTER},
    state::AppState,
};

fn init_tracing(format: LogFormat) -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init()?,
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server = ServerSettings::from_env()?;
    init_tracing(server.log_format)?;

    let auth = AuthSettings::from_env()?;
    let resolver: Arc<dyn KeyResolver> = Arc::new(auth.provider_directory()?);
    let authenticator = auth.authenticator(resolver.clone());

    let shutdown = CancellationToken::new();
    let state = AppState::new(resolver, authenticator).with_shutdown(shutdown.clone());
    let app = router(state);

    let addr = server.bind_address();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(
        address = %addr,
        issuer = %auth.issuer_url,
        client_id = %auth.client_id,
        "Conference auth server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl-C, cancelling in-flight provider requests.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
