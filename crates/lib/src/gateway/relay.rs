//! Inbound relay: forwards group messages to the configured webhook.
//!
//! Delivery is best-effort and at-most-once. Every failure is logged and swallowed so one bad
//! message never stops the ones after it.

use crate::gateway::protocol::{InboundMessagePayload, MediaPayload};
use crate::session::{IncomingMessage, SessionError, SessionProvider};
use std::sync::Arc;
use std::time::Duration;

/// Default bound on a single webhook POST.
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("resolving message: {0}")]
    Session(#[from] SessionError),
    #[error("webhook request failed: {0}")]
    Webhook(#[from] reqwest::Error),
    #[error("webhook responded {0}")]
    Status(reqwest::StatusCode),
}

/// What happened to one incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Not from a group; nothing built, nothing sent.
    Ignored,
    /// POSTed to the webhook.
    Forwarded(InboundMessagePayload),
    /// No webhook configured; payload written to the log.
    Logged(InboundMessagePayload),
    /// Resolution, media download or delivery failed (already logged).
    Failed,
}

pub struct InboundRelay {
    provider: Arc<dyn SessionProvider>,
    client: reqwest::Client,
    webhook_url: Option<String>,
    timeout: Duration,
}

impl InboundRelay {
    pub fn new(
        provider: Arc<dyn SessionProvider>,
        webhook_url: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            client: reqwest::Client::new(),
            webhook_url,
            timeout,
        }
    }

    /// Build the webhook payload for a group message: group name (falling back to the group id),
    /// sender, text, and the downloaded media when the message has any.
    pub async fn build_payload(
        &self,
        msg: &IncomingMessage,
    ) -> Result<InboundMessagePayload, RelayError> {
        let chat = self.provider.get_chat(&msg.from).await?;
        let group = if chat.name.is_empty() {
            msg.from.clone()
        } else {
            chat.name
        };
        let media = if msg.has_media {
            Some(MediaPayload::from(self.provider.download_media(msg).await?))
        } else {
            None
        };
        Ok(InboundMessagePayload {
            group,
            sender: msg.sender().to_string(),
            text: msg.body.clone(),
            has_media: msg.has_media,
            media,
        })
    }

    async fn deliver(&self, url: &str, payload: &InboundMessagePayload) -> Result<(), RelayError> {
        let res = self
            .client
            .post(url)
            .json(payload)
            .timeout(self.timeout)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(RelayError::Status(res.status()));
        }
        Ok(())
    }

    /// Handle one incoming message. Never fails; see [`RelayOutcome`].
    pub async fn relay(&self, msg: &IncomingMessage) -> RelayOutcome {
        if !msg.is_group() {
            return RelayOutcome::Ignored;
        }
        let payload = match self.build_payload(msg).await {
            Ok(p) => p,
            Err(e) => {
                log::warn!("relay: error processing message {} from {}: {}", msg.id, msg.from, e);
                return RelayOutcome::Failed;
            }
        };
        let Some(url) = self.webhook_url.as_deref() else {
            match serde_json::to_string(&payload) {
                Ok(json) => log::info!("relay: webhook url not set; incoming payload: {}", json),
                Err(e) => log::warn!("relay: serializing payload: {}", e),
            }
            return RelayOutcome::Logged(payload);
        };
        match self.deliver(url, &payload).await {
            Ok(()) => {
                log::info!(
                    "relay: forwarded group message to webhook: {} {}",
                    payload.group,
                    payload.sender
                );
                RelayOutcome::Forwarded(payload)
            }
            Err(e) => {
                log::warn!(
                    "relay: delivering message {} from {} failed: {}",
                    msg.id,
                    payload.group,
                    e
                );
                RelayOutcome::Failed
            }
        }
    }
}
