use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ApiResponse;

/// Errors surfaced by the booking engine and mapped to HTTP statuses at the edge.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Pricing(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    /// A freshly generated coupon code collided with an existing one.
    #[error("coupon code already exists")]
    DuplicateCode,
    #[error("payment processor error: {0}")]
    ExternalService(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl BookingError {
    pub fn status(&self) -> StatusCode {
        match self {
            BookingError::Validation(_) => StatusCode::BAD_REQUEST,
            BookingError::Pricing(_) => StatusCode::UNPROCESSABLE_ENTITY,
            BookingError::Conflict(_) | BookingError::DuplicateCode => StatusCode::CONFLICT,
            BookingError::NotFound(_) => StatusCode::NOT_FOUND,
            BookingError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            BookingError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            BookingError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            BookingError::Database(e) => {
                tracing::error!("Database error: {}", e);
                "Internal server error".to_string()
            }
            BookingError::ExternalService(e) => {
                tracing::error!("Payment processor error: {}", e);
                "Payment processor unavailable, try again later".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}
