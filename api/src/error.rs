use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

/// Error kinds produced by the core engine. These carry engine-level
/// semantics; the HTTP boundary maps them to status codes in `AppError`.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("embedding provider unavailable after retries")]
    EmbeddingUnavailable,

    #[error("embedding provider returned {got} dimensions, expected {expected}")]
    EmbeddingShape { expected: usize, got: usize },

    #[error("extraction produced no usable content")]
    ExtractionEmpty,

    #[error("validation failed: {0}")]
    ValidationFailure(String),

    #[error("query must not be empty")]
    EmptyQuery,

    #[error("not found")]
    NotFound,

    #[error("authentication failed")]
    AuthFailure,

    #[error("store conflict")]
    StoreConflict,

    #[error("snapshot missing")]
    SnapshotMiss,
}

pub enum AppError {
    Engine(EngineError),
    Forbidden(&'static str),
    Internal(eyre::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    msg: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, code, msg) = match self {
            AppError::Engine(EngineError::ValidationFailure(reason)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION", Some(reason))
            }
            AppError::Engine(EngineError::EmptyQuery) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "EMPTY_QUERY", None)
            }
            AppError::Engine(EngineError::AuthFailure) => {
                (StatusCode::UNAUTHORIZED, "AUTH", None)
            }
            AppError::Forbidden(reason) => (StatusCode::FORBIDDEN, "FORBIDDEN", Some(reason.into())),
            AppError::Engine(EngineError::NotFound) => (StatusCode::NOT_FOUND, "NOT_FOUND", None),
            AppError::Engine(EngineError::EmbeddingUnavailable) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "EMBEDDING_UNAVAILABLE",
                None,
            ),
            AppError::Engine(EngineError::EmbeddingShape { expected, got }) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "EMBEDDING_SHAPE",
                Some(format!("expected {expected} dims, got {got}")),
            ),
            AppError::Engine(EngineError::ExtractionEmpty) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "EXTRACTION_EMPTY",
                None,
            ),
            AppError::Engine(EngineError::StoreConflict) => {
                (StatusCode::CONFLICT, "STORE_CONFLICT", None)
            }
            AppError::Engine(EngineError::SnapshotMiss) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "SNAPSHOT_MISS", None)
            }
            AppError::Engine(EngineError::TransientNetwork(reason)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "TRANSIENT_NETWORK",
                Some(reason),
            ),
            AppError::Internal(err) => {
                tracing::error!(?err, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    internal_message(&err),
                )
            }
        };

        let body = ErrorResponse {
            code: code.to_string(),
            msg,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(debug_assertions)]
fn internal_message(err: &eyre::Error) -> Option<String> {
    Some(err.to_string())
}

#[cfg(not(debug_assertions))]
fn internal_message(_err: &eyre::Error) -> Option<String> {
    None
}

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        AppError::Engine(e)
    }
}

impl From<eyre::Error> for AppError {
    fn from(e: eyre::Error) -> Self {
        AppError::Internal(e)
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::NotFound => AppError::Engine(EngineError::NotFound),
            other => AppError::Internal(other.into()),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::Engine(EngineError::NotFound),
            other => AppError::Internal(other.into()),
        }
    }
}

impl From<&'static str> for AppError {
    fn from(e: &'static str) -> Self {
        AppError::Engine(EngineError::ValidationFailure(e.into()))
    }
}

impl From<diesel_async::pooled_connection::deadpool::PoolError> for AppError {
    fn from(e: diesel_async::pooled_connection::deadpool::PoolError) -> Self {
        AppError::Internal(eyre::eyre!(e.to_string()))
    }
}
