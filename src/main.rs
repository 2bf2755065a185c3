use std::net::SocketAddr;
use std::sync::Arc;

use rootcause::prelude::ResultExt;
use tokio::select;
use tokio::signal::unix::SignalKind;
use tokio::signal::unix::signal;
use tracing::Instrument;
use tracing::Span;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    config::{REQUIRED_VARS, ReconcileConfig},
    provider::cloudflare::CloudflareProvider,
    resolver::doh::DohResolver,
    types::AppState,
};

mod config;
mod provider;
mod reconcile;
mod resolver;
mod scheduler;
#[cfg(test)]
mod test_support;
mod types;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    if let Err(e) = run().await {
        error!(err = %e, "Application error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), rootcause::Report> {
    info!("Starting reconciler");

    config::ensure_env_vars(&REQUIRED_VARS)?;
    let interval = config::schedule_interval()?;
    let run_timeout = config::run_timeout()?;
    let config = ReconcileConfig::from_env();

    let client = reqwest::Client::new();
    let state = AppState {
        dns_provider: Arc::new(CloudflareProvider::new(
            client.clone(),
            config.api_token.clone(),
        )),
        resolver: Arc::new(DohResolver::new(client)),
        trigger_password: std::env::var("PASSWORD").ok().filter(|it| !it.is_empty()),
        run_guard: Arc::default(),
        run_timeout,
        config: Arc::new(config),
    };

    info!(
        zone = %state.config.zone_id,
        record = %state.config.record_name,
        probe = %state.config.probe_hostname,
        interval = ?interval,
        run_timeout = ?run_timeout,
        "Reconciling on a schedule"
    );

    let schedule = tokio::spawn(
        scheduler::run_interval(state.clone(), interval).instrument(Span::current()),
    );

    if state.trigger_password.is_some() {
        serve_trigger(state.clone()).await?;
    } else {
        info!("PASSWORD not set, HTTP trigger disabled");
        graceful_shutdown().await;
    }

    // Let an in-flight run finish before tearing the schedule down.
    let _idle = state.run_guard.lock().await;
    schedule.abort();
    info!("Stopped");

    Ok(())
}

async fn serve_trigger(state: AppState) -> Result<(), rootcause::Report> {
    let interface = std::env::var("INTERFACE").unwrap_or("0.0.0.0".to_string());
    let port: String = std::env::var("PORT").unwrap_or("3000".to_string());

    let app = scheduler::trigger_router(state);

    let listen_addr = format!("{}:{}", interface, port);
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .context("Failed to bind to listen address")
        .attach(format!("address: '{listen_addr}'"))?;

    info!(
        "HTTP trigger listening on {}",
        listener.local_addr().context("Getting local address")?
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async { graceful_shutdown().await }.instrument(Span::current()))
    .await
    .context("Server error")?;

    Ok(())
}

async fn graceful_shutdown() {
    let interrupt = tokio::signal::ctrl_c();
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!(err = %e, "Cannot listen for SIGTERM, only SIGINT will stop the process");
            let _ = interrupt.await;
            warn!("Received SIGINT");
            return;
        }
    };
    select! {
        _ = sigterm.recv() => warn!("Received SIGTERM"),
        _ = interrupt => warn!("Received SIGINT")
    }
}
