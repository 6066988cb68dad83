//! Error taxonomy shared across the service.
//!
//! Each layer (filter, lock, cache, allocator, link store, ...) defines its
//! own narrow error enum; [`AppError`] is the HTTP-boundary taxonomy from
//! spec §7 that every layer error eventually folds into.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// The five error kinds from spec §7. `Authorization` is handled by the
/// surrounding collaborator (auth middleware) and is not produced here.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed input: bad URL, invalid validType, endTime before startTime.
    #[error("invalid request: {0}")]
    RequestParam(String),

    /// Link does not exist, or is in the recycle bin.
    #[error("not found")]
    ResourceNotFound,

    /// Link exists but is in a non-servable state, or a business rule was
    /// violated (group link count exceeded, duplicate shortUri, allocator
    /// exhausted its retry budget, invalid recycle-bin transition).
    #[error("service state: {0}")]
    ServiceState(#[from] ServiceStateError),

    /// KV / broker / DB transport failure, or a lock could not be acquired
    /// or released.
    #[error("external dependency failure: {0}")]
    External(String),
}

/// The `ServiceState` sub-kinds named in spec §7.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStateError {
    #[error("link has expired")]
    LinkExpired,
    #[error("link is forbidden")]
    LinkForbidden,
    #[error("link is disabled")]
    LinkDisabled,
    #[error("link is reserved")]
    LinkReserved,
    #[error("group link count exceeded")]
    GroupLinkCountExceeded,
    #[error("short uri already exists")]
    AlreadyExists,
    #[error("too many attempts generating a unique short uri")]
    TooManyAttempts,
    #[error("invalid status transition")]
    InvalidStatus,
    #[error("origin domain is not in the whitelist")]
    DisallowedDomain,
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::RequestParam(err.to_string())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::RequestParam(_) => (StatusCode::BAD_REQUEST, "request_param"),
            AppError::ResourceNotFound => (StatusCode::NOT_FOUND, "not_found"),
            AppError::ServiceState(ServiceStateError::LinkExpired) => {
                (StatusCode::GONE, "link_expired")
            }
            AppError::ServiceState(_) => (StatusCode::OK, "service_state"),
            AppError::External(_) => (StatusCode::INTERNAL_SERVER_ERROR, "external"),
        };
        let body = ErrorBody {
            code,
            message: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}
