//! Server error types.

use hyper::StatusCode;
use serde_json::{json, Value};
use thiserror::Error;
use wfengine_core::{CoreError, ErrorClass};

/// HTTP status for each error class.
const CLASS_STATUS: &[(ErrorClass, StatusCode)] = &[
    (ErrorClass::NotFound, StatusCode::NOT_FOUND),
    (ErrorClass::ClientError, StatusCode::BAD_REQUEST),
    (ErrorClass::Internal, StatusCode::INTERNAL_SERVER_ERROR),
];

/// Returns the HTTP status for an error class.
pub fn status_for(class: ErrorClass) -> StatusCode {
    CLASS_STATUS
        .iter()
        .find(|(c, _)| *c == class)
        .map(|(_, status)| *status)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no route for {0}")]
    RouteNotFound(String),

    #[error("method {method} not allowed for {path}")]
    MethodNotAllowed {
        method: String,
        path: String,
        /// Methods the route accepts, as an `Allow` header value.
        allow: &'static str,
    },

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),
}

impl ServerError {
    /// Returns the wire code reported in error bodies and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::Core(e) => e.code().as_str(),
            ServerError::Json(_) | ServerError::InvalidRequest(_) => "BAD_REQUEST",
            ServerError::RouteNotFound(_) => "NOT_FOUND",
            ServerError::MethodNotAllowed { .. } => "METHOD_NOT_ALLOWED",
            ServerError::BodyTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            ServerError::Io(_) | ServerError::Http(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the HTTP status this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Core(e) => status_for(e.class()),
            ServerError::Json(_) | ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ServerError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::Io(_) | ServerError::Http(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the JSON error body.
    pub fn to_body(&self) -> Value {
        json!({
            "code": self.code(),
            "message": self.to_string(),
        })
    }
}
