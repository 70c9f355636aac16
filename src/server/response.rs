//! JSON envelopes and error mapping
//!
//! Success: `{"status": 200, "message": "...", "data": ...}` (`data` omitted when empty)
//! Error:   `{"error": "...", "code": 400, "details": "..."}` (`details` omitted when empty)

use crate::objects::{CreatedObject, ObjectError, ObjectLink};
use crate::router::RouteError;
use crate::server::multipart::MultipartError;
use crate::storage::PresignedLink;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::Full;
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde::Serialize;

/// Success envelope
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub status: u16,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// Error envelope
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Link payload returned by create and bulk fetch routes
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LinkData {
    #[serde(rename = "objectID")]
    pub object_id: String,
    pub link: String,
    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,
}

impl LinkData {
    fn new(object_id: String, link: PresignedLink) -> Self {
        Self {
            object_id,
            link: link.url,
            expires_at: link.expires_at,
        }
    }
}

impl From<CreatedObject> for LinkData {
    fn from(created: CreatedObject) -> Self {
        Self::new(created.object_id, created.link)
    }
}

impl From<ObjectLink> for LinkData {
    fn from(link: ObjectLink) -> Self {
        Self::new(link.object_id, link.link)
    }
}

/// A request failure with its HTTP status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn with_details(mut self, details: impl ToString) -> Self {
        self.details = Some(details.to_string());
        self
    }

    /// Map an object operation failure; `message` describes the failed action
    pub fn from_object_error(err: &ObjectError, message: &str) -> Self {
        let status = match err {
            ObjectError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            e if e.is_not_found() => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, message).with_details(err)
    }

    /// Label for the error counter
    pub fn kind(&self) -> &'static str {
        match self.status {
            StatusCode::BAD_REQUEST => "bad_request",
            StatusCode::NOT_FOUND => "not_found",
            StatusCode::METHOD_NOT_ALLOWED => "method_not_allowed",
            StatusCode::PAYLOAD_TOO_LARGE => "payload_too_large",
            _ => "internal",
        }
    }

    pub fn into_response(self) -> Response<Full<Bytes>> {
        let body = ErrorResponse {
            error: self.message,
            code: self.status.as_u16(),
            details: self.details,
        };
        json_response(self.status, &body)
    }
}

impl From<RouteError> for ApiError {
    fn from(err: RouteError) -> Self {
        match &err {
            RouteError::NotFound(_) => ApiError::new(StatusCode::NOT_FOUND, "Not found"),
            RouteError::MethodNotAllowed { .. } => {
                ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
            }
            RouteError::InvalidPath(_) => ApiError::bad_request("Invalid object id"),
        }
        .with_details(err)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::bad_request("Invalid form").with_details(err)
    }
}

/// Serialize a success envelope
pub fn success<T: Serialize>(
    message: &'static str,
    data: Option<T>,
) -> Response<Full<Bytes>> {
    let body = SuccessResponse {
        status: StatusCode::OK.as_u16(),
        message,
        data,
    };
    json_response(StatusCode::OK, &body)
}

/// Error response for a routing failure; 405 carries an `Allow` header
pub fn route_error_response(err: RouteError) -> Response<Full<Bytes>> {
    let allow = match &err {
        RouteError::MethodNotAllowed { allow, .. } => Some(*allow),
        _ => None,
    };
    let mut response = ApiError::from(err).into_response();
    if let Some(allow) = allow {
        response
            .headers_mut()
            .insert(ALLOW, HeaderValue::from_static(allow));
    }
    response
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let (status, payload) = match serde_json::to_vec(body) {
        Ok(payload) => (status, Bytes::from(payload)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize response");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Bytes::from_static(br#"{"error":"Internal server error","code":500}"#),
            )
        }
    };

    let mut response = Response::new(Full::new(payload));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
