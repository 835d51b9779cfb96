//! Crate-wide error type.
//!
//! Mirrors the error kinds named in the error-handling design: validation,
//! precondition, conflict, transient engine failures, schema-evolution
//! fallback, and an internal catch-all. Every fallible operation in this
//! crate returns `Result<T, Error>`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation: {0}")]
    Validation(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Transient engine failure: {0}")]
    TransientEngine(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Flow contains cycles. DAG must be acyclic.")]
    Cyclic,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Stable machine-readable code, independent of the human message.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Kube(_) => "KUBE_ERROR",
            Error::Store(_) => "STORE_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Validation(_) => "VALIDATION",
            Error::Precondition(_) => "PRECONDITION",
            Error::Conflict(_) => "CONFLICT",
            Error::TransientEngine(_) => "TRANSIENT_ENGINE",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Cyclic => "CYCLIC",
            Error::Config(_) => "CONFIG",
            Error::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Validation(_) | Error::Cyclic => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Precondition(_) => StatusCode::PRECONDITION_FAILED,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::TransientEngine(_) => StatusCode::OK,
            Error::Kube(_) | Error::Store(_) | Error::Serialization(_) | Error::Config(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = json!({
            "error": self.code(),
            "message": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}
