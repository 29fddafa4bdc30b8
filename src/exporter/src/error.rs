use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::query::{BoxError, QueryError};

/// Failure of one job run. Every variant is terminal for the request.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job not specified")]
    MissingParameter,
    #[error("Job not found: {0}")]
    JobNotFound(String),
    #[error("Failed to render query template: {0}")]
    Template(#[from] minijinja::Error),
    #[error("Query failed: {0}")]
    Query(#[source] QueryError),
    #[error("Query timed out after {0:?}")]
    QueryTimeout(Duration),
    #[error("Failed to translate row: {0}")]
    RowTranslation(#[source] BoxError),
    #[error("Failed to write output: {0}")]
    Write(#[from] std::io::Error),
}

impl JobError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingParameter => StatusCode::BAD_REQUEST,
            Self::JobNotFound(_) => StatusCode::NOT_FOUND,
            Self::QueryTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Template(_) | Self::Query(_) | Self::RowTranslation(_) | Self::Write(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short message sent to the scraper; details stay in the logs.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::MissingParameter => "job not specified",
            Self::JobNotFound(_) => "job not found",
            Self::QueryTimeout(_) => "query timed out",
            Self::Template(_) | Self::Query(_) | Self::RowTranslation(_) | Self::Write(_) => {
                "failed to run job"
            }
        }
    }
}

impl From<QueryError> for JobError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Callback(source) => Self::RowTranslation(source),
            other => Self::Query(other),
        }
    }
}

impl IntoResponse for JobError {
    fn into_response(self) -> Response {
        (self.status_code(), self.public_message()).into_response()
    }
}
