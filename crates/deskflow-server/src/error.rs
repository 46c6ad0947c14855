use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use deskflow_shared::constants::*;
use deskflow_shared::{CredentialError, SharedError};
use deskflow_store::StoreError;
use thiserror::Error;

use crate::response::Envelope;

/// Why a request could not be authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    MissingToken,
    InvalidToken,
    TokenExpired,
    UnknownAccount,
    WrongPassword,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Invalid query parameter: {0}")]
    InvalidQuery(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0:?}")]
    Unauthorized(AuthFailure),

    #[error("Password has not been set for this account")]
    PasswordNotSet,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Request did not finish in time")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Map a store error, naming the entity in not-found messages.
    pub fn from_store(entity: &str, e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ServiceError::NotFound(entity.to_string()),
            StoreError::Validation(msg) | StoreError::InvalidReference(msg) => {
                ServiceError::Validation(msg)
            }
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            StoreError::DocumentStore(msg) => ServiceError::Storage(msg),
            StoreError::DeadlineExceeded => ServiceError::Timeout,
            other => ServiceError::Storage(other.to_string()),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) | ServiceError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Unauthorized(_) | ServiceError::PasswordNotSet => {
                StatusCode::UNAUTHORIZED
            }
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::Timeout => StatusCode::REQUEST_TIMEOUT,
            ServiceError::Storage(_) | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Envelope `error_code` and `response_message`.
    pub fn code_and_message(&self) -> (&'static str, &'static str) {
        match self {
            ServiceError::Validation(_) => {
                (ERROR_CODE_INVALID_BODY_REQUEST, RESPONSE_MESSAGE_INVALID_BODY_REQ)
            }
            ServiceError::InvalidQuery(_) => {
                (ERROR_CODE_INVALID_QUERY_PARAMS, RESPONSE_MESSAGE_INVALID_QUERY_PARAMS)
            }
            ServiceError::NotFound(_) => (ERROR_CODE_DATA_NOT_FOUND, RESPONSE_MESSAGE_DATA_NOT_FOUND),
            ServiceError::Conflict(_) => {
                (ERROR_CODE_DATA_ALREADY_EXIST, RESPONSE_MESSAGE_DATA_ALREADY_EXIST)
            }
            ServiceError::Unauthorized(AuthFailure::MissingToken) => {
                (ERROR_CODE_AUTH_TOKEN_EMPTY, RESPONSE_MESSAGE_AUTH_TOKEN_EMPTY)
            }
            ServiceError::Unauthorized(AuthFailure::TokenExpired) => {
                (ERROR_CODE_AUTH_TOKEN_EXPIRED, RESPONSE_MESSAGE_AUTH_TOKEN_EXPIRED)
            }
            ServiceError::Unauthorized(AuthFailure::InvalidToken) => {
                (ERROR_CODE_INVALID_AUTH_TOKEN, RESPONSE_MESSAGE_INVALID_AUTH_TOKEN)
            }
            ServiceError::Unauthorized(AuthFailure::UnknownAccount) => {
                (ERROR_CODE_INVALID_AUTH_TOKEN, "invalid email")
            }
            ServiceError::Unauthorized(AuthFailure::WrongPassword) => {
                (ERROR_CODE_INVALID_AUTH_TOKEN, "invalid password")
            }
            ServiceError::PasswordNotSet => (ERROR_CODE_INVALID_AUTH_TOKEN, "password not set"),
            ServiceError::Forbidden(_) => {
                (ERROR_CODE_FORBIDDEN_ACCESS, RESPONSE_MESSAGE_FORBIDDEN_ACCESS)
            }
            ServiceError::Storage(_) => (ERROR_CODE_DATABASE_ERROR, RESPONSE_MESSAGE_DATABASE_ERROR),
            ServiceError::Timeout => (ERROR_CODE_TIMEOUT, RESPONSE_MESSAGE_TIMEOUT),
            ServiceError::Internal(_) => (ERROR_CODE_GENERAL_ERROR, RESPONSE_MESSAGE_GENERAL_ERROR),
        }
    }

    /// Detail lines for the envelope's `errors` array.  Internal details
    /// stay in the logs.
    fn details(&self) -> Vec<String> {
        match self {
            ServiceError::Storage(_) | ServiceError::Internal(_) => Vec::new(),
            other => vec![other.to_string()],
        }
    }
}

impl From<CredentialError> for ServiceError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::Expired => ServiceError::Unauthorized(AuthFailure::TokenExpired),
            CredentialError::Malformed | CredentialError::BadSignature => {
                ServiceError::Unauthorized(AuthFailure::InvalidToken)
            }
            CredentialError::Encoding(msg) => ServiceError::Internal(msg),
        }
    }
}

impl From<SharedError> for ServiceError {
    fn from(e: SharedError) -> Self {
        match e {
            SharedError::Credential(inner) => inner.into(),
            other => ServiceError::Validation(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ServiceError {
    fn from(e: JsonRejection) -> Self {
        ServiceError::Validation(e.body_text())
    }
}

impl From<MultipartRejection> for ServiceError {
    fn from(e: MultipartRejection) -> Self {
        ServiceError::Validation(e.body_text())
    }
}

impl From<MultipartError> for ServiceError {
    fn from(e: MultipartError) -> Self {
        ServiceError::Validation(e.body_text())
    }
}

impl From<PathRejection> for ServiceError {
    fn from(e: PathRejection) -> Self {
        ServiceError::InvalidQuery(e.body_text())
    }
}

impl From<QueryRejection> for ServiceError {
    fn from(e: QueryRejection) -> Self {
        ServiceError::InvalidQuery(e.body_text())
    }
}

impl From<tokio::task::JoinError> for ServiceError {
    fn from(e: tokio::task::JoinError) -> Self {
        ServiceError::Internal(format!("blocking task failed: {e}"))
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        let (code, message) = self.code_and_message();
        let body = Envelope::<()>::failure(status, code, message, self.details());

        (status, axum::Json(body)).into_response()
    }
}
