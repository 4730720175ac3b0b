use serde::Serialize;

use super::ApiError;
use crate::api::ErrorResponse;

const JSON_CONTENT_TYPE: &str = "application/json";
const PLAIN_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Sent on every response, including errors and preflights.
pub const CORS_HEADERS: [(&str, &str); 3] = [
    ("access-control-allow-origin", "*"),
    ("access-control-allow-methods", "GET, POST, PUT, DELETE, OPTIONS"),
    ("access-control-allow-headers", "Content-Type, Authorization"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl HttpResponse {
    pub fn json<T: Serialize>(status: u16, payload: &T) -> Self {
        match serde_json::to_string(payload) {
            Ok(body) => Self {
                status,
                content_type: JSON_CONTENT_TYPE,
                body,
            },
            Err(err) => Self::internal_server_error(&format!("response encoding failed: {err}")),
        }
    }

    pub fn ok_json<T: Serialize>(payload: &T) -> Self {
        Self::json(200, payload)
    }

    pub fn plain(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: PLAIN_CONTENT_TYPE,
            body: body.to_string(),
        }
    }

    pub fn no_content() -> Self {
        Self::plain(204, "")
    }

    pub fn not_found() -> Self {
        Self::plain(404, "Not Found")
    }

    pub fn method_not_allowed() -> Self {
        Self::plain(405, "Method Not Allowed")
    }

    pub fn bad_request(message: &str) -> Self {
        Self::from_error(&ApiError::BadRequest(message.to_string()))
    }

    pub fn internal_server_error(message: &str) -> Self {
        let mut payload = ErrorResponse::new("Internal server error");
        payload.message = Some(message.to_string());
        // Hand-built so an encoding failure cannot recurse.
        let body = serde_json::to_string(&payload).unwrap_or_else(|_| {
            "{\"success\":false,\"error\":\"Internal server error\"}".to_string()
        });
        Self {
            status: 500,
            content_type: JSON_CONTENT_TYPE,
            body,
        }
    }

    pub fn from_error(error: &ApiError) -> Self {
        match error {
            ApiError::BadRequest(message) => Self::json(400, &ErrorResponse::new(message.clone())),
            ApiError::OutletNotFound(code) => {
                let mut payload = ErrorResponse::new(error.to_string());
                payload.outlet_code = Some(code.clone());
                Self::json(404, &payload)
            }
            ApiError::BackupNotFound(id) => {
                let mut payload = ErrorResponse::new(error.to_string());
                payload.backup_id = Some(id.clone());
                Self::json(404, &payload)
            }
            ApiError::Storage(message) => Self::internal_server_error(message),
            ApiError::RuntimeUnavailable => Self::internal_server_error(&error.to_string()),
        }
    }

    pub fn from_result<T: Serialize>(result: Result<T, ApiError>) -> Self {
        match result {
            Ok(payload) => Self::ok_json(&payload),
            Err(err) => Self::from_error(&err),
        }
    }
}
