//! Sidecar session provider: JSON frames over a WebSocket to the browser-automation sidecar.
//!
//! The sidecar pushes lifecycle and message events; requests from the gateway carry a
//! `requestId` and are answered by a `response` frame with the same id.

use super::{
    ChatSummary, IncomingMessage, Media, OutgoingContent, SessionError, SessionEvent,
    SessionProvider,
};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const OUTBOUND_QUEUE: usize = 32;

type PendingMap = HashMap<String, oneshot::Sender<Result<serde_json::Value, SessionError>>>;

/// Request sent to the sidecar.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
enum SidecarRequest {
    GetChat {
        chat_id: String,
    },
    ListChats,
    DownloadMedia {
        message_id: String,
    },
    SendMessage {
        chat_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        media: Option<Media>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestFrame<'a> {
    request_id: &'a str,
    #[serde(flatten)]
    request: &'a SidecarRequest,
}

/// Frame received from the sidecar.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
enum SidecarFrame {
    Qr {
        qr: String,
    },
    Authenticated,
    Ready,
    AuthFailure {
        #[serde(default)]
        message: String,
    },
    Disconnected {
        #[serde(default)]
        reason: String,
    },
    Message {
        message: IncomingMessage,
    },
    Response {
        request_id: String,
        ok: bool,
        #[serde(default)]
        result: serde_json::Value,
        #[serde(default)]
        error: Option<String>,
    },
}

/// WebSocket client for the automation sidecar. Reconnects until stopped.
pub struct SidecarClient {
    url: String,
    request_timeout: Duration,
    writer: Mutex<Option<mpsc::Sender<Message>>>,
    pending: Mutex<PendingMap>,
    stop_tx: watch::Sender<bool>,
}

impl SidecarClient {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            url: url.into(),
            request_timeout,
            writer: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            stop_tx,
        }
    }

    /// Start the connect/read loop; events are forwarded to `events_tx`. Returns a handle to await on shutdown.
    pub fn start(self: Arc<Self>, events_tx: mpsc::Sender<SessionEvent>) -> JoinHandle<()> {
        log::info!("session: connecting to sidecar at {}", self.url);
        tokio::spawn(async move {
            run_connection_loop(self, events_tx).await;
        })
    }

    /// Stop the connection loop; pending requests fail.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    async fn request(&self, request: SidecarRequest) -> Result<serde_json::Value, SessionError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let frame = serde_json::to_string(&RequestFrame {
            request_id: &request_id,
            request: &request,
        })
        .map_err(|e| SessionError::Protocol(e.to_string()))?;

        // Pending entry goes in before the writer lookup: a disconnect either
        // clears the writer first or drains this entry in fail_pending.
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id.clone(), tx);
        let writer = self.writer.lock().await.clone();
        let sent = match writer {
            Some(writer) => writer.send(Message::Text(frame)).await.is_ok(),
            None => false,
        };
        if !sent {
            self.pending.lock().await.remove(&request_id);
            return Err(SessionError::NotConnected);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SessionError::Transport(
                "sidecar connection closed".to_string(),
            )),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err(SessionError::Timeout)
            }
        }
    }

    async fn resolve_response(
        &self,
        request_id: &str,
        ok: bool,
        result: serde_json::Value,
        error: Option<String>,
    ) {
        let Some(tx) = self.pending.lock().await.remove(request_id) else {
            log::debug!("session: response for unknown request {}", request_id);
            return;
        };
        let outcome = if ok {
            Ok(result)
        } else {
            Err(SessionError::Rejected(
                error.unwrap_or_else(|| "sidecar request failed".to_string()),
            ))
        };
        let _ = tx.send(outcome);
    }

    async fn fail_pending(&self) {
        let drained: Vec<_> = self.pending.lock().await.drain().collect();
        for (_, tx) in drained {
            let _ = tx.send(Err(SessionError::Transport(
                "sidecar connection closed".to_string(),
            )));
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, SessionError> {
    serde_json::from_value(value).map_err(|e| SessionError::Protocol(e.to_string()))
}

/// Map a sidecar push frame to a session event. Responses are not events.
fn frame_event(frame: SidecarFrame) -> Option<SessionEvent> {
    match frame {
        SidecarFrame::Qr { qr } => Some(SessionEvent::QrIssued(qr)),
        SidecarFrame::Authenticated => Some(SessionEvent::Authenticated),
        SidecarFrame::Ready => Some(SessionEvent::Ready),
        SidecarFrame::AuthFailure { message } => Some(SessionEvent::AuthFailed(message)),
        SidecarFrame::Disconnected { reason } => Some(SessionEvent::Disconnected(reason)),
        SidecarFrame::Message { message } => Some(SessionEvent::Message(message)),
        SidecarFrame::Response { .. } => None,
    }
}

async fn run_connection_loop(client: Arc<SidecarClient>, events_tx: mpsc::Sender<SessionEvent>) {
    let mut stop_rx = client.stop_tx.subscribe();
    while !*stop_rx.borrow() {
        let ws = tokio::select! {
            res = tokio_tungstenite::connect_async(client.url.as_str()) => res,
            _ = stop_rx.changed() => break,
        };
        let ws = match ws {
            Ok((ws, _)) => ws,
            Err(e) => {
                log::debug!("session: sidecar connect failed: {}", e);
                tokio::select! {
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                    _ = stop_rx.changed() => break,
                }
                continue;
            }
        };
        log::info!("session: connected to sidecar");

        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE);
        *client.writer.lock().await = Some(out_tx);
        let writer_task = tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let mut events_closed = false;
        loop {
            let next = tokio::select! {
                next = stream.next() => next,
                _ = stop_rx.changed() => break,
            };
            let text = match next {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    log::warn!("session: sidecar read error: {}", e);
                    break;
                }
            };
            let frame: SidecarFrame = match serde_json::from_str(&text) {
                Ok(f) => f,
                Err(e) => {
                    log::debug!("session: ignoring malformed sidecar frame: {}", e);
                    continue;
                }
            };
            if let SidecarFrame::Response {
                request_id,
                ok,
                result,
                error,
            } = frame
            {
                client.resolve_response(&request_id, ok, result, error).await;
                continue;
            }
            if let Some(event) = frame_event(frame) {
                if events_tx.send(event).await.is_err() {
                    log::debug!("session: event channel closed, stopping loop");
                    events_closed = true;
                    break;
                }
            }
        }

        client.writer.lock().await.take();
        writer_task.abort();
        client.fail_pending().await;
        if events_closed || *stop_rx.borrow() {
            break;
        }
        log::warn!("session: sidecar connection lost, reconnecting");
        let _ = events_tx
            .send(SessionEvent::Disconnected("sidecar connection lost".to_string()))
            .await;
        tokio::select! {
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            _ = stop_rx.changed() => break,
        }
    }
    log::info!("session: sidecar loop stopped");
}

#[async_trait]
impl SessionProvider for SidecarClient {
    async fn get_chat(&self, chat_id: &str) -> Result<ChatSummary, SessionError> {
        let result = self
            .request(SidecarRequest::GetChat {
                chat_id: chat_id.to_string(),
            })
            .await?;
        decode(result)
    }

    async fn list_chats(&self) -> Result<Vec<ChatSummary>, SessionError> {
        let result = self.request(SidecarRequest::ListChats).await?;
        decode(result)
    }

    async fn download_media(&self, message: &IncomingMessage) -> Result<Media, SessionError> {
        let result = self
            .request(SidecarRequest::DownloadMedia {
                message_id: message.id.clone(),
            })
            .await?;
        if result.is_null() {
            return Err(SessionError::Rejected(format!(
                "media for message {} is no longer available",
                message.id
            )));
        }
        decode(result)
    }

    async fn send(&self, chat_id: &str, content: OutgoingContent) -> Result<(), SessionError> {
        let (text, media) = match content {
            OutgoingContent::Text(t) => (Some(t), None),
            OutgoingContent::Media(m) => (None, Some(m)),
        };
        self.request(SidecarRequest::SendMessage {
            chat_id: chat_id.to_string(),
            text,
            media,
        })
        .await?;
        Ok(())
    }
}
