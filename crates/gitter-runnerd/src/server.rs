//! HTTP surface: `POST /webhook` and `GET /health`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use gitter_runner_core::{
    obs, DeliveryLedger, Dispatcher, PhaseOutcome, PullRequestEvent, METRICS, VERSION,
};

use crate::signature;

pub const EVENT_HEADER: &str = "x-github-event";
pub const DELIVERY_HEADER: &str = "x-github-delivery";
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Shared state behind every request.
#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<Dispatcher>,
    ledger: Arc<DeliveryLedger>,
    webhook_secret: Arc<[u8]>,
}

impl AppState {
    pub fn new(
        dispatcher: Dispatcher,
        ledger: DeliveryLedger,
        webhook_secret: impl Into<Vec<u8>>,
    ) -> Self {
        let secret: Vec<u8> = webhook_secret.into();
        Self {
            dispatcher: Arc::new(dispatcher),
            ledger: Arc::new(ledger),
            webhook_secret: Arc::from(secret),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn ledger(&self) -> &DeliveryLedger {
        &self.ledger
    }
}

/// Body of every webhook acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook", post(webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: VERSION.to_string(),
    })
}

fn reply(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(WebhookResponse {
            message: message.into(),
        }),
    )
        .into_response()
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let event_name = header(&headers, EVENT_HEADER).unwrap_or("unknown").to_string();
    let delivery_id = header(&headers, DELIVERY_HEADER)
        .map(str::to_string)
        .unwrap_or_else(|| format!("local-{}", uuid::Uuid::new_v4()));

    if let Err(e) = signature::verify(
        &state.webhook_secret,
        &body,
        header(&headers, SIGNATURE_HEADER),
    ) {
        tracing::warn!(delivery_id = %delivery_id, error = %e, "Rejected webhook delivery");
        return reply(StatusCode::UNAUTHORIZED, format!("Invalid signature: {e}"));
    }

    obs::emit_delivery_received(&delivery_id, &event_name);
    METRICS.inc_deliveries();

    if event_name != "pull_request" {
        return reply(StatusCode::OK, format!("Ignored {event_name} event"));
    }

    let event = match PullRequestEvent::from_webhook(&body, delivery_id.as_str()) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(
                delivery_id = %delivery_id,
                error = %e,
                "Unprocessable pull_request delivery"
            );
            return reply(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    if !state.ledger.first_delivery(&delivery_id) {
        obs::emit_delivery_duplicate(&delivery_id);
        METRICS.inc_duplicates();
        return reply(
            StatusCode::OK,
            format!("Ignored duplicate delivery {delivery_id}"),
        );
    }

    let message = format!(
        "Received {} event for pull request {}",
        event.action, event.number
    );

    // The phase runs on its own task so a dropped connection cannot cancel it.
    // An aborted phase releases its delivery id so a redelivery is processed.
    let task_state = state.clone();
    let task_delivery = delivery_id.clone();
    let handle = tokio::spawn(async move {
        let outcome = task_state.dispatcher.dispatch(&event).await;
        if matches!(outcome, PhaseOutcome::Aborted { .. }) {
            task_state.ledger.forget(&task_delivery);
        }
        outcome
    });
    match handle.await {
        Ok(outcome) => tracing::debug!(
            delivery_id = %delivery_id,
            outcome = outcome.label(),
            "Delivery processed"
        ),
        Err(e) => {
            state.ledger.forget(&delivery_id);
            tracing::error!(delivery_id = %delivery_id, error = %e, "Dispatch task failed");
        }
    }

    reply(StatusCode::OK, message)
}
