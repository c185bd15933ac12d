//! Gateway HTTP server and session event loop.

use crate::config::{self, Settings};
use crate::gateway::auth;
use crate::gateway::error::GatewayError;
use crate::gateway::relay::InboundRelay;
use crate::gateway::send::send_handler;
use crate::qr::{QrPublisher, QrView};
use crate::session::{
    start_sidecar, SessionEvent, SessionProvider, SessionStatus, SidecarClient, SidecarProcess,
};
use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

const EVENT_QUEUE: usize = 64;

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// Chat account used by `/send`.
    pub provider: Arc<dyn SessionProvider>,
    /// When Some, `/send` requires `Authorization: Bearer <token>`.
    pub send_token: Option<String>,
    /// When Some, `/qr` requires `?token=` or a bearer header.
    pub qr_token: Option<String>,
    /// Reader for the last issued QR image.
    pub qr: QrView,
    /// Latest session lifecycle state, written by the event loop.
    pub status: watch::Receiver<SessionStatus>,
    pub port: u16,
}

/// Routes: `GET /` health, `GET /qr`, `POST /send`.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/qr", get(qr_handler))
        .route("/send", post(send_handler))
        .with_state(state)
}

/// Consume session events: QR challenges go to the publisher, group messages to the relay.
/// Each message is relayed on its own task so a slow webhook does not hold up later events.
pub fn spawn_event_loop(
    mut events_rx: mpsc::Receiver<SessionEvent>,
    publisher: QrPublisher,
    relay: Arc<InboundRelay>,
    status_tx: watch::Sender<SessionStatus>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            status_tx.send_modify(|s| *s = s.after(&event));
            match event {
                SessionEvent::QrIssued(challenge) => {
                    if let Err(e) = publisher.publish(&challenge) {
                        log::error!("qr: failed to publish login challenge: {}", e);
                    }
                }
                SessionEvent::Authenticated => {
                    log::info!("session: authenticated, session saved");
                }
                SessionEvent::Ready => {
                    log::info!("session: client ready");
                }
                SessionEvent::AuthFailed(msg) => {
                    log::error!("session: auth failure: {} (rescan the QR code)", msg);
                }
                SessionEvent::Disconnected(reason) => {
                    log::warn!("session: disconnected: {}", reason);
                }
                SessionEvent::Message(msg) => {
                    if !msg.is_group() {
                        continue;
                    }
                    let relay = relay.clone();
                    tokio::spawn(async move {
                        relay.relay(&msg).await;
                    });
                }
            }
        }
        log::debug!("session: event channel closed");
    })
}

/// Run the bridge: prepare the session directory, optionally launch the sidecar,
/// connect to it, and serve HTTP on `settings.bind:settings.port` until SIGINT/SIGTERM.
pub async fn run_gateway(settings: Settings) -> Result<()> {
    tokio::fs::create_dir_all(&settings.session_dir)
        .await
        .with_context(|| format!("creating session directory {}", settings.session_dir.display()))?;

    if !config::is_loopback_bind(&settings.bind) && settings.send_token.is_none() {
        log::warn!(
            "binding {} without SEND_TOKEN: anyone who can reach the port can send messages",
            settings.bind
        );
    }
    match settings.webhook_url {
        Some(ref url) => log::info!("relay: forwarding group messages to {}", url),
        None => log::info!("relay: no webhook url configured, incoming payloads are logged only"),
    }

    let sidecar_process = match settings.sidecar_command {
        Some(ref command) => Some(
            start_sidecar(
                command,
                &settings.sidecar_args,
                &settings.session_dir,
                &settings.client_id,
            )
            .await?,
        ),
        None => None,
    };
    if let Some(id) = sidecar_process.as_ref().and_then(SidecarProcess::id) {
        log::info!("session: sidecar process running with pid {}", id);
    }

    let client = Arc::new(SidecarClient::new(
        settings.sidecar_url.clone(),
        settings.sidecar_request_timeout,
    ));
    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
    let session_task = client.clone().start(events_tx);

    let publisher = QrPublisher::new();
    let qr = publisher.view();
    let (status_tx, status_rx) = watch::channel(SessionStatus::Starting);
    let provider: Arc<dyn SessionProvider> = client.clone();
    let relay = Arc::new(InboundRelay::new(
        provider.clone(),
        settings.webhook_url.clone(),
        settings.webhook_timeout,
    ));
    let event_task = spawn_event_loop(events_rx, publisher, relay, status_tx);

    let state = GatewayState {
        provider,
        send_token: settings.send_token.clone(),
        qr_token: settings.qr_token.clone(),
        qr,
        status: status_rx,
        port: settings.port,
    };
    let app = build_router(state);

    let bind_addr = format!("{}:{}", settings.bind, settings.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("listener http running on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(client, session_task, event_task, sidecar_process))
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// Stops the sidecar connection, waits for the event loop to drain, then stops the sidecar process.
async fn shutdown_signal(
    client: Arc<SidecarClient>,
    session_task: JoinHandle<()>,
    event_task: JoinHandle<()>,
    sidecar_process: Option<SidecarProcess>,
) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, stopping session and draining connections");

    client.stop();
    let _ = session_task.await;
    // The loop ends once the session task drops its sender.
    let _ = event_task.await;

    if let Some(mut process) = sidecar_process {
        if let Err(e) = process.stop().await {
            log::debug!("stopping sidecar on shutdown: {}", e);
        }
    }
    log::info!("session stopped");
}

#[derive(Debug, Deserialize)]
struct QrQuery {
    token: Option<String>,
}

/// GET /qr — the last issued login QR as PNG.
async fn qr_handler(
    State(state): State<GatewayState>,
    Query(query): Query<QrQuery>,
    headers: HeaderMap,
) -> Response {
    if let Err(e) =
        auth::require_query_or_bearer(state.qr_token.as_deref(), query.token.as_deref(), &headers)
    {
        return e.into_plain_response();
    }
    let Some(image) = state.qr.current() else {
        return GatewayError::QrNotGenerated.into_plain_response();
    };
    ([(header::CONTENT_TYPE, "image/png")], image.png.clone()).into_response()
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    let session = *state.status.borrow();
    Json(json!({
        "runtime": "running",
        "session": session.as_str(),
        "port": state.port,
    }))
}
