//! Shared fixtures: an in-memory session provider and a gateway bound to an ephemeral port.
#![allow(dead_code)]

use async_trait::async_trait;
use lib::gateway::{build_router, GatewayState};
use lib::qr::QrPublisher;
use lib::session::{
    ChatSummary, IncomingMessage, Media, OutgoingContent, SessionError, SessionProvider,
    SessionStatus,
};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Provider backed by a fixed chat list; records every send.
#[derive(Default)]
pub struct FakeProvider {
    pub chats: Vec<ChatSummary>,
    pub media: Option<Media>,
    pub fail_get_chat: bool,
    pub fail_list_chats: bool,
    pub fail_media_send: bool,
    pub sent: Mutex<Vec<(String, OutgoingContent)>>,
}

impl FakeProvider {
    pub fn with_groups(names: &[(&str, &str)]) -> Self {
        Self {
            chats: names
                .iter()
                .map(|(id, name)| ChatSummary {
                    id: id.to_string(),
                    name: name.to_string(),
                    is_group: id.ends_with("@g.us"),
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, OutgoingContent)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionProvider for FakeProvider {
    async fn get_chat(&self, chat_id: &str) -> Result<ChatSummary, SessionError> {
        if self.fail_get_chat {
            return Err(SessionError::Rejected("chat lookup failed".to_string()));
        }
        Ok(self
            .chats
            .iter()
            .find(|c| c.id == chat_id)
            .cloned()
            .unwrap_or_else(|| ChatSummary {
                id: chat_id.to_string(),
                name: String::new(),
                is_group: chat_id.ends_with("@g.us"),
            }))
    }

    async fn list_chats(&self) -> Result<Vec<ChatSummary>, SessionError> {
        if self.fail_list_chats {
            return Err(SessionError::NotConnected);
        }
        Ok(self.chats.clone())
    }

    async fn download_media(&self, message: &IncomingMessage) -> Result<Media, SessionError> {
        self.media
            .clone()
            .ok_or_else(|| SessionError::Rejected(format!("no media for {}", message.id)))
    }

    async fn send(&self, chat_id: &str, content: OutgoingContent) -> Result<(), SessionError> {
        if self.fail_media_send && matches!(content, OutgoingContent::Media(_)) {
            return Err(SessionError::Rejected("media upload failed".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), content));
        Ok(())
    }
}

pub fn group_message(id: &str, from: &str, body: &str) -> IncomingMessage {
    IncomingMessage {
        id: id.to_string(),
        from: from.to_string(),
        author: Some("15550001111@c.us".to_string()),
        notify_name: None,
        body: body.to_string(),
        has_media: false,
    }
}

pub struct TestGateway {
    pub base_url: String,
    pub publisher: QrPublisher,
    pub status_tx: watch::Sender<SessionStatus>,
    pub client: reqwest::Client,
}

/// Serve the gateway router on 127.0.0.1:<ephemeral>. The server task is left running when the test ends.
pub async fn start_gateway(
    provider: Arc<FakeProvider>,
    send_token: Option<&str>,
    qr_token: Option<&str>,
) -> TestGateway {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let port = listener.local_addr().expect("local_addr").port();
    let publisher = QrPublisher::new();
    let (status_tx, status_rx) = watch::channel(SessionStatus::Starting);
    let state = GatewayState {
        provider,
        send_token: send_token.map(str::to_string),
        qr_token: qr_token.map(str::to_string),
        qr: publisher.view(),
        status: status_rx,
        port,
    };
    let app = build_router(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    TestGateway {
        base_url: format!("http://127.0.0.1:{}", port),
        publisher,
        status_tx,
        client: reqwest::Client::new(),
    }
}
