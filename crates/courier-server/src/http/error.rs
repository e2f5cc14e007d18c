//! HTTP error mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use courier_core::domain::{ErrorKind, ParseIdError};
use courier_core::TaskError;

/// Error body: `{"code": "...", "message": "..."}`.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] TaskError);

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError(TaskError::validation(message))
    }

    pub fn kind(&self) -> ErrorKind {
        self.0.kind()
    }

    pub fn status_code(&self) -> StatusCode {
        status_for(self.kind())
    }

    pub fn error_code(&self) -> &'static str {
        self.kind().code()
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidState => StatusCode::CONFLICT,
        ErrorKind::StepFailure | ErrorKind::TransientIo | ErrorKind::FatalScheduler => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<ParseIdError> for ApiError {
    fn from(e: ParseIdError) -> Self {
        ApiError::validation(e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::validation(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "request failed");
        }
        let body = serde_json::json!({
            "code": self.error_code(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{TaskId, TaskStatus};
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::Validation, StatusCode::BAD_REQUEST)]
    #[case(ErrorKind::NotFound, StatusCode::NOT_FOUND)]
    #[case(ErrorKind::InvalidState, StatusCode::CONFLICT)]
    #[case(ErrorKind::StepFailure, StatusCode::INTERNAL_SERVER_ERROR)]
    #[case(ErrorKind::FatalScheduler, StatusCode::INTERNAL_SERVER_ERROR)]
    fn status_code_mapping(#[case] kind: ErrorKind, #[case] expected: StatusCode) {
        assert_eq!(status_for(kind), expected);
    }

    #[tokio::test]
    async fn json_response_format() {
        let id: TaskId = "01ARZ3NDEKTSV4RRFFQ69G5FAV".parse().unwrap();
        let err = ApiError::from(TaskError::InvalidState {
            id,
            status: TaskStatus::Completed,
            reason: "only failed tasks can be restarted",
        });
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let body = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "INVALID_STATE");
        assert_eq!(
            json["message"],
            format!("Task {id} is completed: only failed tasks can be restarted")
        );
    }
}
