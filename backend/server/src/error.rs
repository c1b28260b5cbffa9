use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tokio::time::error::Elapsed;
use tracing::error;

use crate::routes::ApiResponse;

/// Failures of the counter and session stores.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The named counter row does not exist. Distinct from a count of zero.
    #[error("No counter found with ID {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Invalid session")]
    InvalidSession,
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl From<redis::RedisError> for CoreError {
    fn from(e: redis::RedisError) -> Self {
        CoreError::StoreUnavailable(e.to_string())
    }
}

impl From<Elapsed> for CoreError {
    fn from(_: Elapsed) -> Self {
        CoreError::StoreUnavailable("deadline elapsed".to_string())
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload")]
    MalformedPayload,

    #[error("Verification failed")]
    VerificationFailed,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Database error")]
    Database(#[source] CoreError),

    #[error("Internal error: {0}")]
    InternalError(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl From<CoreError> for AppError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidSession => AppError::Unauthorized,
            other => AppError::Database(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::MalformedPayload | AppError::VerificationFailed => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Database { .. } | AppError::InternalError { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if let AppError::Database(ref source) = self {
            error!("Store failure: {source}");
        }

        (status, Json(ApiResponse::error(self.to_string()))).into_response()
    }
}
