use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use velora_core::error::{CartSessionError, ReservationError};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match self {
            ApiError::BadRequest(msg) | ApiError::NotFound(msg) | ApiError::Conflict(msg) => msg,
            ApiError::Internal(err) => {
                tracing::error!("Internal Server Error: {:#}", err);
                "Internal Server Error".to_string()
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<ReservationError> for ApiError {
    fn from(err: ReservationError) -> Self {
        match err {
            ReservationError::InsufficientInventory { .. } => ApiError::Conflict(err.to_string()),
            ReservationError::NotFound(_) => ApiError::NotFound(err.to_string()),
            ReservationError::InvalidQuantity(_) => ApiError::BadRequest(err.to_string()),
            ReservationError::Store(_) => ApiError::Internal(err.into()),
        }
    }
}

impl From<CartSessionError> for ApiError {
    fn from(err: CartSessionError) -> Self {
        match err {
            CartSessionError::CartNotFound(_) | CartSessionError::ItemNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            CartSessionError::InvalidQuantity(_) => ApiError::BadRequest(err.to_string()),
            CartSessionError::Reservation(inner) => ApiError::from(inner),
            CartSessionError::SessionCreation(_)
            | CartSessionError::SessionMigration { .. }
            | CartSessionError::Storage(_) => ApiError::Internal(err.into()),
        }
    }
}
