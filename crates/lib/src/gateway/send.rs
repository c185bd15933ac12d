//! Outbound gateway: `POST /send` resolves a group by display name and sends text and/or media.

use crate::gateway::auth;
use crate::gateway::error::GatewayError;
use crate::gateway::protocol::{SendRequest, SendResponse, ValidSend};
use crate::gateway::server::GatewayState;
use crate::session::{is_group_id, ChatSummary, Media, OutgoingContent, SessionProvider};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

/// First group whose display name equals `name` exactly (case-sensitive), in provider order.
pub async fn find_group(
    provider: &dyn SessionProvider,
    name: &str,
) -> Result<ChatSummary, GatewayError> {
    let chats = provider
        .list_chats()
        .await
        .map_err(|e| GatewayError::Delivery(e.to_string()))?;
    let mut matches = chats
        .into_iter()
        .filter(|c| (c.is_group || is_group_id(&c.id)) && c.name == name);
    let first = matches.next().ok_or(GatewayError::GroupNotFound)?;
    let others = matches.count();
    if others > 0 {
        log::debug!(
            "send: {} groups named {:?}, using {}",
            others + 1,
            name,
            first.id
        );
    }
    Ok(first)
}

/// Send the text (if any) and then the media (if any) as separate messages.
/// Not atomic: when the media send fails after the text went out, the error says so.
pub async fn dispatch(
    provider: &dyn SessionProvider,
    chat_id: &str,
    message: Option<String>,
    media: Option<Media>,
) -> Result<(), GatewayError> {
    let Some(media) = media else {
        let Some(text) = message else {
            return Err(GatewayError::MissingFields(vec!["message/media"]));
        };
        return provider
            .send(chat_id, OutgoingContent::Text(text))
            .await
            .map_err(|e| GatewayError::Delivery(e.to_string()));
    };

    let media = Media {
        filename: Some(media.filename_or_default().to_string()),
        ..media
    };
    let text_sent = match message {
        Some(text) => {
            provider
                .send(chat_id, OutgoingContent::Text(text))
                .await
                .map_err(|e| GatewayError::Delivery(e.to_string()))?;
            true
        }
        None => false,
    };
    provider
        .send(chat_id, OutgoingContent::Media(media))
        .await
        .map_err(|e| {
            if text_sent {
                GatewayError::Delivery(format!("text delivered but media failed: {}", e))
            } else {
                GatewayError::Delivery(e.to_string())
            }
        })
}

async fn send(state: &GatewayState, req: ValidSend) -> Result<(), GatewayError> {
    let provider = state.provider.as_ref();
    let target = find_group(provider, &req.group_name).await?;
    dispatch(provider, &target.id, req.message, req.media).await?;
    log::info!("send: delivered to group {:?} ({})", req.group_name, target.id);
    Ok(())
}

/// POST /send — bearer auth, validation, group lookup, dispatch.
pub(crate) async fn send_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SendResponse>, GatewayError> {
    auth::require_bearer(state.send_token.as_deref(), &headers)?;
    let req: SendRequest = if body.is_empty() {
        SendRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| GatewayError::InvalidBody(e.to_string()))?
    };
    let req = req.validate()?;
    if let Err(e) = send(&state, req).await {
        if matches!(e, GatewayError::Delivery(_)) {
            log::error!("send: error sending message: {}", e);
        }
        return Err(e);
    }
    Ok(Json(SendResponse { success: true }))
}
