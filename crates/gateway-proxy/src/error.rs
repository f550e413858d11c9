use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use thiserror::Error;

/// Request-level failures, each mapped to a fixed client response.
///
/// `Display` is for logs. Clients only ever see [`GatewayError::client_message`],
/// which never carries upstream detail.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("origin rejected by policy")]
    PolicyDenied,

    #[error("malformed request: {0}")]
    MalformedRequest(&'static str),

    #[error("request body exceeds the configured limit")]
    PayloadTooLarge,

    #[error("no route for path")]
    RouteNotFound,

    #[error("method not allowed on route")]
    MethodNotAllowed,

    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("upstream did not answer in time")]
    UpstreamTimeout,

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::PolicyDenied => StatusCode::FORBIDDEN,
            GatewayError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::RouteNotFound => StatusCode::NOT_FOUND,
            GatewayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn client_message(&self) -> &'static str {
        match self {
            GatewayError::PolicyDenied => "origin not allowed",
            GatewayError::MalformedRequest(_) => "malformed request",
            GatewayError::PayloadTooLarge => "payload too large",
            GatewayError::RouteNotFound => "not found",
            GatewayError::MethodNotAllowed => "method not allowed",
            GatewayError::UpstreamUnreachable(_) => "upstream unavailable",
            GatewayError::UpstreamTimeout => "upstream timed out",
            GatewayError::Internal(_) => "internal error",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.client_message() });
        (self.status(), Json(body)).into_response()
    }
}
