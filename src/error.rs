use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

/// Where the presentation layer sends an identity that cannot see any dashboard.
pub const ENTRY_ROUTE: &str = "/auth";

/// AppError
///
/// The single error taxonomy surfaced at the HTTP boundary. `LookupFailure`,
/// `InvalidSession` and `NoAccess` are kept apart on purpose: the client must be
/// able to tell "the database is down" from "you signed out" from "you hold no role".
#[derive(Debug, Error)]
pub enum AppError {
    /// Storage or network unreachable while reading rows.
    #[error("lookup failed: {0}")]
    LookupFailure(String),

    /// Identity missing, expired, malformed or revoked.
    #[error("invalid session: {0}")]
    InvalidSession(String),

    /// Identity is valid but holds zero role assignments.
    #[error("no role has been assigned to this account")]
    NoAccess,

    /// The primary role lacks the capability required by the action.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The hosted identity provider rejected or failed a delegated call.
    #[error("identity provider error: {0}")]
    Upstream(String),
}

/// Result alias used by the repository, resolver and handlers.
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Machine-readable state name sent to the presentation layer.
    pub fn state(&self) -> &'static str {
        match self {
            AppError::LookupFailure(_) => "lookup_failure",
            AppError::InvalidSession(_) => "invalid_session",
            AppError::NoAccess => "no_access",
            AppError::Forbidden(_) => "forbidden",
            AppError::Validation(_) => "validation",
            AppError::NotFound(_) => "not_found",
            AppError::Upstream(_) => "upstream",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::LookupFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InvalidSession(_) => StatusCode::UNAUTHORIZED,
            AppError::NoAccess | AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Terminal states that must send the client back to the entry page
    /// instead of rendering anything role-specific.
    pub fn redirect(&self) -> Option<&'static str> {
        match self {
            AppError::InvalidSession(_) | AppError::NoAccess => Some(ENTRY_ROUTE),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for AppError {
    /// Constraint violations are caused by the request (an unknown course or
    /// student, an out-of-range value) and answer 400. Anything else means
    /// storage could not be read.
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(database_error) = &err
            && (database_error.is_foreign_key_violation() || database_error.is_check_violation())
        {
            return AppError::Validation(database_error.message().to_string());
        }

        AppError::LookupFailure(err.to_string())
    }
}

/// ErrorResponse
///
/// JSON body for every non-2xx answer.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorResponse {
    pub state: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        Self {
            state: err.state().to_string(),
            message: err.to_string(),
            redirect: err.redirect().map(str::to_string),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::LookupFailure(detail) = &self {
            tracing::error!(detail = %detail, "lookup failure surfaced to client");
        }
        let status = self.status();
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}
