//! Error types for the server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::error::WorkbenchError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Workbench(#[from] WorkbenchError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message, kind) = match &self {
            ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), "validation_error"),
            ServerError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), "record_not_found"),
            ServerError::Internal(msg) => {
                tracing::error!(detail = %msg, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "An internal error occurred".to_string(), "internal")
            }
            ServerError::Io(e) => {
                tracing::error!(detail = %e, "IO error");
                (StatusCode::INTERNAL_SERVER_ERROR, "A file system error occurred".to_string(), "io_error")
            }
            ServerError::Workbench(e) => match e {
                WorkbenchError::RecordNotFound { .. } => (StatusCode::NOT_FOUND, e.to_string(), e.kind()),
                WorkbenchError::Validation(_)
                | WorkbenchError::Schema(_)
                | WorkbenchError::DataAccess(_)
                | WorkbenchError::ArtifactLoad(_)
                | WorkbenchError::Fit(_) => (StatusCode::BAD_REQUEST, e.to_string(), e.kind()),
                WorkbenchError::Timeout(_) | WorkbenchError::Io(_) | WorkbenchError::Serialization(_) => {
                    tracing::error!(detail = %e, kind = e.kind(), "Internal server error");
                    (StatusCode::INTERNAL_SERVER_ERROR, "An internal error occurred".to_string(), e.kind())
                }
            },
        };

        let body = Json(json!({
            "error": true,
            "kind": kind,
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ServerError::from(WorkbenchError::not_found("model", 3)), StatusCode::NOT_FOUND),
            (ServerError::from(WorkbenchError::Schema("no revenue".into())), StatusCode::BAD_REQUEST),
            (ServerError::from(WorkbenchError::Serialization("bad".into())), StatusCode::INTERNAL_SERVER_ERROR),
            (ServerError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
