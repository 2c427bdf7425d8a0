use actix_web::error::BlockingError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use err_derive::Error;
use log::*;
use serde::Serialize;

use crate::auth::AuthError;

/// Every way a request can fail, as seen by the caller.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(display = "unprocessable")]
    InvalidInput,
    #[error(display = "resource not found")]
    NotFound,
    #[error(display = "{}", _0)]
    Auth(AuthError),
    #[error(display = "internal failure: {}", _0)]
    Internal(anyhow::Error),
}

#[derive(Serialize, Debug, PartialEq)]
struct ErrorBody {
    success: bool,
    error: u16,
    message: &'static str,
}

impl ApiError {
    fn message(&self) -> &'static str {
        match self {
            ApiError::InvalidInput => "unprocessable",
            ApiError::NotFound => "resource not found",
            ApiError::Auth(AuthError::InsufficientPermission(_)) => "forbidden",
            ApiError::Auth(_) => "not authorized",
            ApiError::Internal(_) => "internal server error",
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Auth(AuthError::InsufficientPermission(_)) => StatusCode::FORBIDDEN,
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let ApiError::Internal(e) = self {
            error!("Internal failure: {:?}", e);
        }
        let status = self.status_code();
        HttpResponse::build(status).json(ErrorBody {
            success: false,
            error: status.as_u16(),
            message: self.message(),
        })
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl From<BlockingError> for ApiError {
    fn from(err: BlockingError) -> Self {
        ApiError::Internal(anyhow::anyhow!("{}", err))
    }
}

pub async fn not_found() -> Result<HttpResponse, ApiError> {
    Err(ApiError::NotFound)
}
