use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use gitter_runner_core::{init_tracing, DeliveryLedger, Dispatcher, MultiGitter, METRICS};
use gitter_runner_github::{AppCredentials, GithubApp, DEFAULT_REQUEST_TIMEOUT};
use gitter_runnerd::{router, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::parse();
    init_tracing(config.json, config.log_level());

    let credentials = AppCredentials::from_pem(config.app_id.clone(), &config.private_key)
        .context("Failed to load GitHub App private key")?;
    let github = GithubApp::new(credentials, &config.github_api_url, DEFAULT_REQUEST_TIMEOUT)
        .context("Failed to set up GitHub client")?;

    let mut runner = MultiGitter::new(&config.multi_gitter_bin);
    if let Some(timeout) = config.run_timeout() {
        runner = runner.with_timeout(timeout);
    }

    let dispatcher = Dispatcher::new(
        Arc::new(github),
        Arc::new(runner),
        config.dispatcher_config(),
    );
    let state = AppState::new(
        dispatcher,
        DeliveryLedger::new(config.delivery_ttl()),
        config.webhook_secret.as_bytes(),
    );

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    info!(
        addr = %listener.local_addr()?,
        app_id = %config.app_id,
        api = %config.github_api_url,
        multi_gitter = %config.multi_gitter_bin.display(),
        "gitter-runnerd listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    METRICS.flush();
    info!("gitter-runnerd stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
