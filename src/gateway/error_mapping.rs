//! Mapping of gateway and gRPC failures to HTTP responses.

use bytes::Bytes;
use http::header::{ALLOW, CONTENT_TYPE};
use http::{HeaderValue, Method, Response, StatusCode};
use http_body_util::Full;
use serde::{Deserialize, Serialize};
use tonic::{Code, Status};

/// Everything that can go wrong while serving one gateway request.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No route has this path.
    #[error("no route for {method} {path}")]
    RouteNotFound { method: Method, path: String },

    /// The path exists, but not for this method.
    #[error("method {method} not allowed for {path}")]
    MethodNotAllowed {
        method: Method,
        path: String,
        /// Methods the path does accept, sent back in `Allow`.
        allowed: Vec<Method>,
    },

    /// The body exceeded the configured limit.
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// The body stream failed before it was complete.
    #[error("failed to read request body: {0}")]
    ReadBody(String),

    /// The body is not a JSON object.
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    /// Merged path, query, and body fields do not fit the request message.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The upstream call returned a non-OK status.
    #[error("rpc failed: {}", .0.message())]
    Rpc(#[from] Status),

    /// The response message could not be rendered as JSON.
    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

/// JSON error payload returned to HTTP callers.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
    /// Numeric gRPC status code.
    pub code: i32,
    pub message: String,
}

/// HTTP status for a gRPC status code.
pub fn http_status(code: Code) -> StatusCode {
    match code {
        Code::Ok => StatusCode::OK,
        // nginx's "client closed request"
        Code::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::REQUEST_TIMEOUT),
        Code::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        Code::InvalidArgument => StatusCode::BAD_REQUEST,
        Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::AlreadyExists => StatusCode::CONFLICT,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        Code::FailedPrecondition => StatusCode::BAD_REQUEST,
        Code::Aborted => StatusCode::CONFLICT,
        Code::OutOfRange => StatusCode::BAD_REQUEST,
        Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl GatewayError {
    /// gRPC code reported in the error body.
    pub fn grpc_code(&self) -> Code {
        match self {
            GatewayError::RouteNotFound { .. } => Code::NotFound,
            GatewayError::MethodNotAllowed { .. } => Code::Unimplemented,
            GatewayError::PayloadTooLarge { .. } => Code::ResourceExhausted,
            GatewayError::ReadBody(_) => Code::Cancelled,
            GatewayError::InvalidBody(_) | GatewayError::InvalidRequest(_) => {
                Code::InvalidArgument
            }
            GatewayError::Rpc(status) => status.code(),
            GatewayError::Encode(_) => Code::Internal,
        }
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::ReadBody(_) => StatusCode::BAD_REQUEST,
            GatewayError::InvalidBody(_) | GatewayError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::Rpc(status) => http_status(status.code()),
            GatewayError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show the caller. Server-side failures get a fixed
    /// text so backend details stay in the logs.
    pub fn public_message(&self) -> String {
        let status = self.status_code();
        if !status.is_server_error() {
            return match self {
                GatewayError::Rpc(status) => status.message().to_string(),
                other => other.to_string(),
            };
        }

        match status {
            StatusCode::SERVICE_UNAVAILABLE => "service unavailable",
            StatusCode::GATEWAY_TIMEOUT => "upstream timeout",
            StatusCode::NOT_IMPLEMENTED => "not implemented",
            _ => "internal error",
        }
        .to_string()
    }

    /// Renders the error as a JSON response.
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let message = self.public_message();
        let body = ErrorBody {
            error: message.clone(),
            code: self.grpc_code() as i32,
            message,
        };

        let mut response = json_response(
            self.status_code(),
            serde_json::to_vec(&body).unwrap_or_default(),
        );

        if let GatewayError::MethodNotAllowed { allowed, .. } = &self {
            let allow = allowed
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            if let Ok(value) = HeaderValue::from_str(&allow) {
                response.headers_mut().insert(ALLOW, value);
            }
        }

        response
    }
}

/// Builds an `application/json` response.
pub fn json_response(status: StatusCode, body: Vec<u8>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
