use actix_web::http::StatusCode;
use actix_web::{error::BlockingError, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::query::DbError;

#[derive(Error, Debug)]
pub(crate) enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Invalid or missing token")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Service temporarily unavailable")]
    Unavailable,

    #[error("Internal server error")]
    Internal,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "reason": self.to_string() }))
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        log::error!("database error: {}", err);
        ApiError::Internal
    }
}

impl From<BlockingError> for ApiError {
    fn from(err: BlockingError) -> Self {
        log::error!("blocking pool error: {}", err);
        ApiError::Internal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_variants() {
        assert_eq!(
            ApiError::BadRequest("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::NotFound("Meal").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Unavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::Internal.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn body_carries_a_reason() {
        let err = ApiError::NotFound("Meal");
        assert_eq!(err.to_string(), "Meal not found");
    }
}
