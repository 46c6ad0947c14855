//! JSON envelope wrapped around every API response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use deskflow_shared::constants::{ERROR_CODE_SUCCESS, RESPONSE_MESSAGE_SUCCESS};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub status_code: u16,
    pub success: bool,
    pub error_code: String,
    pub response_message: String,
    pub errors: Vec<String>,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            status_code: StatusCode::OK.as_u16(),
            success: true,
            error_code: ERROR_CODE_SUCCESS.to_string(),
            response_message: RESPONSE_MESSAGE_SUCCESS.to_string(),
            errors: Vec::new(),
            data: Some(data),
        }
    }

    pub fn failure(status: StatusCode, code: &str, message: &str, errors: Vec<String>) -> Self {
        Self {
            status_code: status.as_u16(),
            success: false,
            error_code: code.to_string(),
            response_message: message.to_string(),
            errors,
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, axum::Json(self)).into_response()
    }
}
