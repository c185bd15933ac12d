//! Chat session provider: the account connection that owns login, chat lookup and message transport.
//!
//! The gateway talks to the provider through [`SessionProvider`] and receives lifecycle and
//! message events on an mpsc channel ([`SessionEvent`]). The production provider is
//! [`SidecarClient`], which drives a browser-automation sidecar over WebSocket.

mod process;
mod sidecar;

pub use process::{start_sidecar, SidecarProcess};
pub use sidecar::SidecarClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Origin identifiers of group conversations end with this suffix.
pub const GROUP_ID_SUFFIX: &str = "@g.us";

/// Filename used when a media attachment carries none.
pub const DEFAULT_MEDIA_FILENAME: &str = "file";

/// True if the origin identifier denotes a group conversation.
pub fn is_group_id(id: &str) -> bool {
    id.ends_with(GROUP_ID_SUFFIX)
}

/// A message received by the account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    /// Provider message id, used to download media.
    pub id: String,
    /// Origin conversation (group or direct chat).
    pub from: String,
    /// Participant who wrote the message; set for group messages.
    #[serde(default)]
    pub author: Option<String>,
    /// Sender's self-chosen display name.
    #[serde(default)]
    pub notify_name: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub has_media: bool,
}

impl IncomingMessage {
    pub fn is_group(&self) -> bool {
        is_group_id(&self.from)
    }

    /// Sender identifier: author, then notify name, then the origin id.
    pub fn sender(&self) -> &str {
        self.author
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.notify_name.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or(&self.from)
    }
}

/// A conversation known to the account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: String,
    /// Display name; may be empty.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_group: bool,
}

/// Media attachment as base64 data plus mime type and optional filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub data: String,
    #[serde(alias = "mimeType")]
    pub mimetype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl Media {
    /// Filename, or [`DEFAULT_MEDIA_FILENAME`] when absent or empty.
    pub fn filename_or_default(&self) -> &str {
        self.filename
            .as_deref()
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_MEDIA_FILENAME)
    }
}

/// One unit sent to a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutgoingContent {
    Text(String),
    Media(Media),
}

/// Lifecycle and message events emitted by a provider.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A new login challenge; render it as a QR code for the operator to scan.
    QrIssued(String),
    Authenticated,
    Ready,
    AuthFailed(String),
    Disconnected(String),
    Message(IncomingMessage),
}

/// Latest lifecycle state, reported by the health endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionStatus {
    #[default]
    Starting,
    QrPending,
    Authenticated,
    Ready,
    AuthFailed,
    Disconnected,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Starting => "starting",
            SessionStatus::QrPending => "qr_pending",
            SessionStatus::Authenticated => "authenticated",
            SessionStatus::Ready => "ready",
            SessionStatus::AuthFailed => "auth_failed",
            SessionStatus::Disconnected => "disconnected",
        }
    }

    /// Status after `event`; message events leave it unchanged.
    pub fn after(self, event: &SessionEvent) -> Self {
        match event {
            SessionEvent::QrIssued(_) => SessionStatus::QrPending,
            SessionEvent::Authenticated => SessionStatus::Authenticated,
            SessionEvent::Ready => SessionStatus::Ready,
            SessionEvent::AuthFailed(_) => SessionStatus::AuthFailed,
            SessionEvent::Disconnected(_) => SessionStatus::Disconnected,
            SessionEvent::Message(_) => self,
        }
    }
}

/// Failure of a provider operation.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session provider not connected")]
    NotConnected,
    #[error("session provider request timed out")]
    Timeout,
    #[error("{0}")]
    Rejected(String),
    #[error("session transport error: {0}")]
    Transport(String),
    #[error("unexpected session provider reply: {0}")]
    Protocol(String),
}

/// Operations the gateway needs from the chat account.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Look up one conversation by id.
    async fn get_chat(&self, chat_id: &str) -> Result<ChatSummary, SessionError>;

    /// All conversations known to the account, in provider order.
    async fn list_chats(&self) -> Result<Vec<ChatSummary>, SessionError>;

    /// Fetch the attachment of a message that has media.
    async fn download_media(&self, message: &IncomingMessage) -> Result<Media, SessionError>;

    /// Send one text or media message to a conversation.
    async fn send(&self, chat_id: &str, content: OutgoingContent) -> Result<(), SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(from: &str) -> IncomingMessage {
        IncomingMessage {
            id: "m1".to_string(),
            from: from.to_string(),
            author: None,
            notify_name: None,
            body: String::new(),
            has_media: false,
        }
    }

    #[test]
    fn group_ids_are_detected_by_suffix() {
        assert!(is_group_id("120363041234567890@g.us"));
        assert!(!is_group_id("15551234567@c.us"));
        assert!(!is_group_id("status@broadcast"));
        assert!(!is_group_id("@g.us.example"));
    }

    #[test]
    fn sender_prefers_author_then_notify_name() {
        let mut msg = message("123@g.us");
        assert_eq!(msg.sender(), "123@g.us");
        msg.notify_name = Some("Ana".to_string());
        assert_eq!(msg.sender(), "Ana");
        msg.author = Some("555@c.us".to_string());
        assert_eq!(msg.sender(), "555@c.us");
        msg.author = Some(String::new());
        assert_eq!(msg.sender(), "Ana");
    }

    #[test]
    fn media_filename_defaults() {
        let mut media = Media {
            data: "aGk=".to_string(),
            mimetype: "text/plain".to_string(),
            filename: None,
        };
        assert_eq!(media.filename_or_default(), "file");
        media.filename = Some("notes.txt".to_string());
        assert_eq!(media.filename_or_default(), "notes.txt");
    }

    #[test]
    fn media_accepts_camel_case_mime_key() {
        let media: Media =
            serde_json::from_str(r#"{"data":"aGk=","mimeType":"image/png"}"#).unwrap();
        assert_eq!(media.mimetype, "image/png");
        assert_eq!(media.filename, None);
    }

    #[test]
    fn status_follows_lifecycle_events() {
        let s = SessionStatus::default();
        let s = s.after(&SessionEvent::QrIssued("abc".to_string()));
        assert_eq!(s, SessionStatus::QrPending);
        let s = s.after(&SessionEvent::Authenticated);
        let s = s.after(&SessionEvent::Message(message("1@g.us")));
        assert_eq!(s, SessionStatus::Authenticated);
        assert_eq!(s.after(&SessionEvent::Ready).as_str(), "ready");
    }
}
