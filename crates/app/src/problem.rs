use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use acme_storage::QueryError;

/// Detail shown when a failure is escalated to the generic error boundary.
pub const GENERIC_FAILURE: &str = "Something went wrong!";

#[derive(Debug, Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    problem_type: &'static str,
    title: &'static str,
    detail: String,
}

/// RFC 7807 error body.
#[derive(Debug)]
pub struct ProblemResponse {
    status: StatusCode,
    body: ProblemDetails,
}

impl ProblemResponse {
    pub fn new<S: Into<String>>(status: StatusCode, problem_type: &'static str, detail: S) -> Self {
        Self {
            status,
            body: ProblemDetails {
                problem_type,
                title: status.canonical_reason().unwrap_or("error"),
                detail: detail.into(),
            },
        }
    }

    /// Generic boundary response; never carries internal error detail.
    pub fn internal(problem_type: &'static str) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            problem_type,
            GENERIC_FAILURE,
        )
    }
}

/// Logs a failed page query and hides it behind the generic boundary body.
pub fn load_failed(page: &'static str, err: QueryError) -> ProblemResponse {
    error!(stage = "page", page, error = %err, "failed to load page data");
    ProblemResponse::internal("page_load_failed")
}

impl IntoResponse for ProblemResponse {
    fn into_response(self) -> Response {
        let mut response = Json(self.body).into_response();
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}
