use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use super::models::ErrorResponse;
use crate::error::MonetaError;

/// Where clients are sent after asking for an item kind that does not exist.
pub const INVALID_KIND_REDIRECT: &str = "/catalog/featured";

#[derive(Debug)]
pub enum ApiError {
    Service(MonetaError),
    BadRequest(String),
}

impl From<MonetaError> for ApiError {
    fn from(err: MonetaError) -> Self {
        ApiError::Service(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, redirect) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message, None),
            ApiError::Service(err) => match err {
                MonetaError::NotFound(message) => (StatusCode::NOT_FOUND, message, None),
                MonetaError::Forbidden(message) => (StatusCode::FORBIDDEN, message, None),
                err @ MonetaError::InvalidItemKind(_) => (
                    StatusCode::BAD_REQUEST,
                    err.to_string(),
                    Some(INVALID_KIND_REDIRECT.to_string()),
                ),
                MonetaError::Validation(message) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, message, None)
                }
                MonetaError::Storage(err) => {
                    log::error!("💥 Storage failure: {:?}", err);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal error".to_string(),
                        None,
                    )
                }
            },
        };
        (status, Json(ErrorResponse { message, redirect })).into_response()
    }
}
