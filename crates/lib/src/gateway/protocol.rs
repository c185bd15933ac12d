//! Gateway HTTP wire types: the webhook payload and the `/send` request/response.

use crate::gateway::error::GatewayError;
use crate::session::Media;
use serde::{Deserialize, Serialize};

/// Body POSTed to the webhook for each qualifying group message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessagePayload {
    /// Group display name, or the raw group id when the name is unavailable.
    pub group: String,
    pub sender: String,
    pub text: String,
    pub has_media: bool,
    /// Present iff `has_media`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaPayload>,
}

/// Media embedded in a webhook payload; `filename` is always filled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPayload {
    pub data: String,
    #[serde(alias = "mimeType")]
    pub mimetype: String,
    pub filename: String,
}

impl From<Media> for MediaPayload {
    fn from(media: Media) -> Self {
        let filename = media.filename_or_default().to_string();
        Self {
            data: media.data,
            mimetype: media.mimetype,
            filename,
        }
    }
}

/// POST /send body: `{ groupName, message?, media? }`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub media: Option<Media>,
}

/// A `/send` request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidSend {
    pub group_name: String,
    pub message: Option<String>,
    pub media: Option<Media>,
}

impl SendRequest {
    /// Require a non-empty group name and at least one of message text or media.
    /// Empty strings count as missing.
    pub fn validate(self) -> Result<ValidSend, GatewayError> {
        let group_name = self.group_name.filter(|g| !g.is_empty());
        let message = self.message.filter(|m| !m.is_empty());
        let mut missing = Vec::new();
        if group_name.is_none() {
            missing.push("groupName");
        }
        if message.is_none() && self.media.is_none() {
            missing.push("message/media");
        }
        match group_name {
            Some(group_name) if missing.is_empty() => Ok(ValidSend {
                group_name,
                message,
                media: self.media,
            }),
            _ => Err(GatewayError::MissingFields(missing)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResponse {
    pub success: bool,
}
