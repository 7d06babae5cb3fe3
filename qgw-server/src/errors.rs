//! `ServerError` wraps `qgw_core::Error` (and the server's own parsing
//! failures) behind `actix_web::ResponseError`, so handlers can return
//! `Result<_, ServerError>` directly and let actix render the response.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    Compile(#[from] qgw_core::Error),

    #[error("malformed request body: {0}")]
    BadRequest(String),

    #[error("saved query {0} not found")]
    SavedQueryNotFound(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Compile(qgw_core::Error::SchemaTimeout) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Compile(_) | ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::SavedQueryNotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (template, cause) = match self {
            ServerError::Compile(inner) => ("compile error: {{message}}".to_string(), Some(inner.to_string())),
            other => (other.to_string(), None),
        };
        HttpResponse::build(self.status_code()).json(json!({
            "type": "ERROR",
            "template": template,
            "cause": cause,
        }))
    }
}
