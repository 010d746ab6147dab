//! RFC9457-style API error wrapper.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use peermux_core::BridgeError;

/// Problem-details body returned for JSON endpoints.
#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    /// Machine-readable kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// Short human-readable title.
    pub title: String,
    /// HTTP status code.
    pub status: u16,
    /// Optional detail text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Structured API error.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    title: &'static str,
    detail: Option<String>,
}

impl ApiError {
    const fn new(status: StatusCode, kind: &'static str, title: &'static str) -> Self {
        Self {
            status,
            kind,
            title,
            detail: None,
        }
    }

    /// Attach a human-readable detail.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// 500 with detail.
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "about:blank#internal",
            "internal server error",
        )
        .with_detail(detail)
    }

    /// 400 with detail.
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "about:blank#bad-request",
            "bad request",
        )
        .with_detail(detail)
    }

    /// 401 with detail.
    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "about:blank#unauthorized",
            "authentication required",
        )
        .with_detail(detail)
    }

    /// 404 with detail.
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "about:blank#not-found",
            "resource not found",
        )
        .with_detail(detail)
    }

    /// 409 with detail.
    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "about:blank#conflict", "conflict").with_detail(detail)
    }

    /// 503 with detail.
    pub fn service_unavailable(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "about:blank#unavailable",
            "service unavailable",
        )
        .with_detail(detail)
    }

    /// 504 with detail.
    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::GATEWAY_TIMEOUT,
            "about:blank#timeout",
            "upstream timeout",
        )
        .with_detail(detail)
    }
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::NotConnected { client } => {
                Self::service_unavailable(format!("client {client} is not connected"))
            }
            BridgeError::Timeout { operation } => {
                Self::timeout(format!("operation '{operation}' timed out"))
            }
            BridgeError::BadRequest { detail } => Self::bad_request(detail),
            BridgeError::Conflict { detail } => Self::conflict(detail),
            BridgeError::NotFound { hash } => Self::not_found(format!("hash {hash} not found")),
            BridgeError::Unsupported { operation } => {
                Self::bad_request(format!("operation '{operation}' not supported"))
            }
            BridgeError::Protocol { detail } => Self::internal(detail),
            BridgeError::Transport { source } => Self::internal(source.to_string()),
            BridgeError::Unavailable { what } => {
                Self::service_unavailable(format!("{what} unavailable"))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ProblemDetails {
            kind: self.kind.to_string(),
            title: self.title.to_string(),
            status: self.status.as_u16(),
            detail: self.detail,
        };
        (self.status, Json(body)).into_response()
    }
}
