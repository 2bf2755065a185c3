use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    Router,
    extract::{ConnectInfo, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Basic},
};
use jiff::Timestamp;
use serde::Deserialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::{
    reconcile::{Outcome, reconcile_within},
    types::AppState,
};

/// A single firing of a schedule. Only `cron` is looked at, for logging.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub cron: String,
    pub scheduled_time: Timestamp,
}

impl ScheduledEvent {
    pub fn now(cron: impl Into<String>) -> Self {
        Self {
            cron: cron.into(),
            scheduled_time: Timestamp::now(),
        }
    }
}

/// Runs one reconcile to completion, unless another run is still in flight.
pub async fn scheduled(state: &AppState, event: ScheduledEvent) -> Option<Outcome> {
    info!(cron = %event.cron, at = %event.scheduled_time, "Trigger fired");

    let Ok(_guard) = state.run_guard.try_lock() else {
        warn!(cron = %event.cron, "Previous run still in progress, skipping trigger");
        return None;
    };

    let outcome = reconcile_within(
        state.run_timeout,
        &state.config,
        state.resolver.as_ref(),
        state.dns_provider.as_ref(),
    )
    .await;
    info!(outcome = %outcome, "Run finished");
    Some(outcome)
}

/// Fires immediately, then once per `interval` for as long as it is polled.
pub async fn run_interval(state: AppState, interval: Duration) {
    let cron = format!("@every {interval:?}");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        scheduled(&state, ScheduledEvent::now(cron.as_str())).await;
    }
}

#[derive(Deserialize, Debug)]
pub struct TriggerQuery {
    pub cron: Option<String>,
}

pub fn trigger_router(state: AppState) -> Router {
    Router::new()
        .route("/__scheduled", post(handle_trigger_request))
        .layer(middleware::from_fn_with_state(state.clone(), ensure_auth))
        .with_state(state)
}

async fn handle_trigger_request(
    State(state): State<AppState>,
    Query(query): Query<TriggerQuery>,
) -> Response {
    let event = ScheduledEvent::now(query.cron.unwrap_or("http".to_string()));

    match scheduled(&state, event).await {
        Some(outcome) => (StatusCode::OK, outcome.to_string()).into_response(),
        None => (
            StatusCode::CONFLICT,
            "skipped: run in progress".to_string(),
        )
            .into_response(),
    }
}

async fn ensure_auth(
    TypedHeader(header): TypedHeader<Authorization<Basic>>,
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> impl IntoResponse {
    let authorized = state
        .trigger_password
        .as_deref()
        .is_some_and(|password| header.password() == password);

    if !authorized {
        let client_ip = match req.headers().get("X-Forwarded-For") {
            Some(v) => v.to_str().unwrap_or("<invalid utf8>").to_string(),
            None => addr.ip().to_string(),
        };
        debug!(
            "Invalid password attempt for user {} from ip {client_ip}",
            header.username()
        );
        return (StatusCode::UNAUTHORIZED, "invalid password".to_string()).into_response();
    }
    next.run(req).await
}
