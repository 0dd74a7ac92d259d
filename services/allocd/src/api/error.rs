use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use containerops_alloc::AllocError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub r#type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    pub code: String,
    pub retryable: bool,
}

impl ProblemDetails {
    fn new(status: StatusCode, code: impl Into<String>, detail: impl Into<String>) -> Self {
        let code = code.into();
        let title = status
            .canonical_reason()
            .unwrap_or("Unknown Error")
            .to_string();
        Self {
            r#type: format!("https://containerops.dev/problems/{code}"),
            title,
            status: status.as_u16(),
            detail: detail.into(),
            code,
            retryable: false,
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub problem: Box<ProblemDetails>,
}

impl ApiError {
    fn with_status(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        let problem = Box::new(ProblemDetails::new(status, code, message));
        Self { status, problem }
    }

    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, code, message)
    }
}

impl From<AllocError> for ApiError {
    fn from(err: AllocError) -> Self {
        let status = match &err {
            AllocError::InvalidAddress { .. }
            | AllocError::InvalidPool(_)
            | AllocError::InvalidNamespace(_)
            | AllocError::InvalidKey(_)
            | AllocError::InvalidHostname { .. } => StatusCode::BAD_REQUEST,
            AllocError::AddressConflict { .. }
            | AllocError::PoolExhausted { .. }
            | AllocError::OutOfPool { .. } => StatusCode::CONFLICT,
            AllocError::LockTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AllocError::CorruptState { .. } | AllocError::Storage { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let mut api_err = Self::with_status(status, err.code(), err.to_string());
        api_err.problem.retryable = err.is_retryable();
        api_err
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.problem)).into_response();
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                AllocError::InvalidPool("bad".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                AllocError::PoolExhausted {
                    namespace: "mesh".to_string(),
                    pool: "10.0.0.0/30".to_string(),
                },
                StatusCode::CONFLICT,
            ),
            (
                AllocError::LockTimeout {
                    namespace: "mesh".to_string(),
                    waited: Duration::from_secs(30),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AllocError::CorruptState {
                    path: "/state/networks/mesh/ipam.json".into(),
                    reason: "eof".to_string(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let retryable = err.is_retryable();
            let api_err = ApiError::from(err);
            assert_eq!(api_err.status, expected);
            assert_eq!(api_err.problem.retryable, retryable);
        }
    }
}
