//! Error responses

use axum::{http::StatusCode, Json};
use serde::Serialize;
use tablecheck_core::TableCheckError;
use uuid::Uuid;

/// Error body: `{ "error": "..." }`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// HTTP status for a domain error
pub fn status_for(error: &TableCheckError) -> StatusCode {
    match error {
        TableCheckError::Validation(_) => StatusCode::BAD_REQUEST,
        TableCheckError::Navigation(_) => StatusCode::CONFLICT,
        TableCheckError::NotFound(_) => StatusCode::NOT_FOUND,
        TableCheckError::Connection(_) => StatusCode::BAD_GATEWAY,
        TableCheckError::Query(_)
        | TableCheckError::Config(_)
        | TableCheckError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn api_error(error: TableCheckError) -> ApiError {
    let status = status_for(&error);
    if status.is_server_error() {
        tracing::error!(status = status.as_u16(), error = %error, "Request failed");
    } else {
        tracing::debug!(status = status.as_u16(), error = %error, "Request rejected");
    }
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

pub fn session_not_found(id: Uuid) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("Session not found: {}", id),
        }),
    )
}

pub fn internal_error(message: String) -> ApiError {
    tracing::error!(error = %message, "Internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { error: message }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (TableCheckError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (TableCheckError::Navigation("x".into()), StatusCode::CONFLICT),
            (TableCheckError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (TableCheckError::Connection("x".into()), StatusCode::BAD_GATEWAY),
            (
                TableCheckError::Query("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(status_for(&error), expected, "{:?}", error);
        }
    }

    #[test]
    fn test_error_body() {
        let (status, Json(body)) = api_error(TableCheckError::Validation("bad".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "Validation error: bad");
    }
}
