//! HTTP-facing errors
//!
//! Every error body has the shape `{"error": "<message>"}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::dao::DaoError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// No resource matches the request
    #[error("not found")]
    NotFound,

    /// The store failed or the request could not be turned into a query
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DaoError> for ApiError {
    fn from(err: DaoError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}
