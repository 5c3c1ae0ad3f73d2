//! HTTP server receiving GitHub webhooks.
//!
//! Serves one `POST` route at the configured hook path. The event kind comes
//! from `X-GitHub-Event`; the payload is the JSON body, or the `payload`
//! field of a form body for hooks configured with the form content type.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{FromRequest, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::post;
use axum::{Form, Router};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::PayloadError;
use crate::github::{Event, Formatter};
use crate::network::Client;

/// Upper bound on a delivery body.
const MAX_BODY: usize = 4 * 1024 * 1024;

#[derive(Clone)]
struct HookState {
    client: Client,
    formatter: Arc<Formatter>,
}

#[derive(Deserialize)]
struct PayloadForm {
    payload: Option<String>,
}

/// Build the webhook router.
pub fn router(route: &str, client: Client, formatter: Formatter) -> Router {
    let state = HookState {
        client,
        formatter: Arc::new(formatter),
    };
    Router::new().route(route, post(hook)).with_state(state)
}

/// Serve `app` on `addr` until `shutdown` is cancelled.
pub async fn run_http_server(
    addr: SocketAddr,
    app: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Webhook listener started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

async fn hook(State(state): State<HookState>, request: Request) -> StatusCode {
    let event = match decode(request).await {
        Ok(Some(event)) => event,
        Ok(None) => return StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "Dropping webhook delivery");
            return StatusCode::BAD_REQUEST;
        }
    };

    let lines = state.formatter.lines(&event);
    debug!(lines = lines.len(), "Announcing webhook event");
    if lines.is_empty() {
        return StatusCode::OK;
    }

    // Flood control can hold lines for seconds; GitHub should not wait on it.
    let client = state.client;
    tokio::spawn(async move {
        for line in lines {
            if let Err(e) = client.write_line(line).await {
                warn!(error = %e, "Could not announce webhook event");
                break;
            }
        }
    });

    StatusCode::OK
}

async fn decode(request: Request) -> Result<Option<Event>, PayloadError> {
    let kind = event_kind(request.headers())?;

    let json = if is_json(request.headers()) {
        axum::body::to_bytes(request.into_body(), MAX_BODY)
            .await
            .map_err(|e| PayloadError::Body(e.to_string()))?
            .to_vec()
    } else {
        let Form(form) = Form::<PayloadForm>::from_request(request, &())
            .await
            .map_err(|e| PayloadError::Form(e.body_text()))?;
        form.payload.ok_or(PayloadError::MissingPayload)?.into_bytes()
    };

    Event::parse(&kind, &json)
}

fn event_kind(headers: &HeaderMap) -> Result<String, PayloadError> {
    headers
        .get("x-github-event")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .ok_or(PayloadError::MissingEvent)
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}
