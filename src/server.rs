use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use clap::ValueEnum;
use log::{debug, error, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tower_http::timeout::TimeoutLayer;

use crate::config::Config;
use crate::providers::gitlab::{
    build_span, decode, JobNotification, PipelineNotification, SpanSource,
};
use crate::sink::EventSink;

pub const EVENT_HEADER: &str = "X-Gitlab-Event";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const USAGE: &str = "# GitLab Honeycomb Buildevents Webhooks Sink

GET /healthz: healthcheck

POST /api/message: receive GitLab pipeline and job webhooks
";

/// HTTP status reported when a webhook body cannot be turned into a span.
///
/// GitLab retries and eventually disables webhooks that keep failing, so the
/// default acknowledges every well-addressed delivery and only reports the
/// problem in the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Always answer `200 OK`
    #[default]
    AlwaysOk,
    /// `400` for undecodable bodies, `422` for unparseable timestamps
    ReportStatus,
}

impl FailurePolicy {
    fn respond(self, status: StatusCode, message: String) -> Response {
        match self {
            Self::AlwaysOk => (StatusCode::OK, message).into_response(),
            Self::ReportStatus => (status, message).into_response(),
        }
    }
}

/// Shared, read-only request context.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sink: Arc<dyn EventSink>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/healthz", get(healthz))
        .route("/api/message", post(message))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .with_state(state)
}

/// Serves the webhook sink until Ctrl-C.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Starting server on http://{addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {e}");
            }
            info!("Shutdown signal received");
        })
        .await
        .context("Server error")
}

async fn home() -> &'static str {
    USAGE
}

async fn healthz() -> &'static str {
    "OK"
}

async fn message(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let mut values = headers.get_all(EVENT_HEADER).iter();
    let event_type = match (values.next(), values.next()) {
        (None, _) => return bad_request(format!("Missing header: {EVENT_HEADER}")),
        (Some(_), Some(_)) => return bad_request(format!("Invalid header: {EVENT_HEADER}")),
        (Some(value), None) => value.to_str().unwrap_or_default(),
    };

    match event_type {
        "Pipeline Hook" => handle::<PipelineNotification>(&state, &body, "pipeline"),
        "Job Hook" => handle::<JobNotification>(&state, &body, "job"),
        other => bad_request(format!("Invalid event type: {other}")),
    }
}

fn handle<N>(state: &AppState, body: &[u8], kind: &str) -> Response
where
    N: SpanSource + DeserializeOwned,
{
    debug!("Received {kind} webhook: {}", String::from_utf8_lossy(body));

    let policy = state.config.failure_policy;

    let notification: N = match decode(body) {
        Ok(notification) => notification,
        Err(e) => {
            error!("Error unmarshalling request body: {e}");
            return policy.respond(
                StatusCode::BAD_REQUEST,
                "Error unmarshalling request body.".to_string(),
            );
        }
    };

    let (record, error) =
        build_span(&state.config, &notification, state.config.status_policy).into_parts();

    if let Some(record) = record {
        debug!(
            "Sending span {} of trace {} (parent {})",
            record.span_id().unwrap_or_default(),
            record.trace_id().unwrap_or_default(),
            record.parent_id().unwrap_or("none")
        );
        state.sink.send(record);
    }

    match error {
        Some(e) => policy.respond(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Error creating trace from {kind} object: {e}"),
        ),
        None => (StatusCode::OK, "Thanks!\n").into_response(),
    }
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, format!("{message}\n")).into_response()
}
