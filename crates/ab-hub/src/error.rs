//! # API Errors
//!
//! Every handler returns [`ApiResult`]. Errors render as
//!
//! ```text
//! {"error": {"code": "invalid_criterion", "http_code": 400, "message": "..."}}
//! ```

use crate::query::QueryError;
use crate::store::StoreError;
use crate::tickets::WorkflowError;
use ab_core::{AccountError, StatusError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    // ==================
    // Client Errors (4xx)
    // ==================
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Status(#[from] StatusError),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    // ==================
    // Server Errors (5xx)
    // ==================
    #[error("{0}")]
    Store(StoreError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Query(QueryError::MalformedRequest(_)) => StatusCode::BAD_REQUEST,
            ApiError::Query(QueryError::InvalidCriterion(_)) => StatusCode::BAD_REQUEST,
            ApiError::Query(QueryError::StoreQueryFailed(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Status(StatusError::Unknown { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Status(StatusError::Transition { .. }) => StatusCode::CONFLICT,
            ApiError::Account(AccountError::NameTaken(_)) => StatusCode::CONFLICT,
            ApiError::Account(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Workflow(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error kind.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Query(QueryError::MalformedRequest(_)) => "malformed_request",
            ApiError::Query(QueryError::InvalidCriterion(_)) => "invalid_criterion",
            ApiError::Query(QueryError::StoreQueryFailed(_)) => "store_query_failed",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Status(StatusError::Unknown { .. }) => "unknown_status",
            ApiError::Status(StatusError::Transition { .. }) => "invalid_transition",
            ApiError::Account(_) => "invalid_account",
            ApiError::Workflow(_) => "invalid_ticket",
            ApiError::Store(_) => "store_error",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ApiError::NotFound(format!("{what} not found")),
            other => ApiError::Store(other),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub http_code: u16,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

impl From<&ApiError> for ErrorResponse {
    fn from(err: &ApiError) -> Self {
        Self {
            error: ErrorBody {
                code: err.code(),
                http_code: err.status_code().as_u16(),
                message: err.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        }
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}
