//! Gateway request errors and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Missing or mismatched bearer/query token.
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Invalid request body: {0}")]
    InvalidBody(String),
    #[error("Missing {}", .0.join(" and "))]
    MissingFields(Vec<&'static str>),
    #[error("Group not found in your account")]
    GroupNotFound,
    #[error("QR not generated yet, check logs")]
    QrNotGenerated,
    /// Chat lookup or message send failed.
    #[error("{0}")]
    Delivery(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::InvalidBody(_) | GatewayError::MissingFields(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::GroupNotFound | GatewayError::QrNotGenerated => StatusCode::NOT_FOUND,
            GatewayError::Delivery(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Plain-text rendering, used by the QR endpoint.
    pub fn into_plain_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// JSON rendering: `{ "error": message }`, plus `missing` for validation errors.
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            GatewayError::MissingFields(fields) => {
                json!({ "error": self.to_string(), "missing": fields })
            }
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(GatewayError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            GatewayError::MissingFields(vec!["groupName"]).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(GatewayError::GroupNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(GatewayError::QrNotGenerated.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            GatewayError::Delivery("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn missing_fields_message_lists_fields() {
        let err = GatewayError::MissingFields(vec!["groupName", "message/media"]);
        assert_eq!(err.to_string(), "Missing groupName and message/media");
    }
}
