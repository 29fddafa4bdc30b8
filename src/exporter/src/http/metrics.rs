use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use axum::{
    extract::{RawQuery, State},
    http::header,
    response::{IntoResponse, Response},
};
use tracing::{error, info, warn};

use super::HttpState;
use crate::exposition::CONTENT_TYPE;
use crate::runner::JobRequest;

/// Build a [`JobRequest`] from a raw query string.
///
/// `job` and `timeout` are reserved; every other parameter feeds the query
/// template. When a parameter repeats, its first value wins. A timeout that
/// does not parse, or parses to zero, is left unset.
pub fn parse_request(raw_query: &str) -> JobRequest {
    let mut request = JobRequest::default();
    let mut seen_timeout = false;

    for (key, value) in url::form_urlencoded::parse(raw_query.as_bytes()) {
        match key.as_ref() {
            "job" => {
                if request.job.is_none() {
                    request.job = Some(value.into_owned());
                }
            }
            "timeout" => {
                if !seen_timeout {
                    seen_timeout = true;
                    request.timeout = parse_timeout(&value);
                }
            }
            _ => {
                request
                    .params
                    .entry(key.into_owned())
                    .or_insert_with(|| value.into_owned());
            }
        }
    }

    request
}

fn parse_timeout(value: &str) -> Option<Duration> {
    match humantime::parse_duration(value) {
        Ok(timeout) if !timeout.is_zero() => Some(timeout),
        Ok(_) => None,
        Err(e) => {
            warn!(timeout = value, error = %e, "Ignoring unparsable timeout");
            None
        }
    }
}

/// Run the job named by the `job` parameter and return its samples.
///
/// The body is fully buffered, so a failed run never sends partial output.
pub async fn metrics_handler(
    State(state): State<HttpState>,
    RawQuery(raw_query): RawQuery,
) -> Response {
    let request = parse_request(raw_query.as_deref().unwrap_or_default());
    let started = Instant::now();
    let mut body = Vec::new();

    match state.runner.run(&request, &mut body).await {
        Ok(summary) => {
            info!(
                job = request.job.as_deref().unwrap_or_default(),
                rows = summary.rows,
                samples = summary.samples,
                partitions = summary.stats.num_partitions,
                missing_partitions = summary.stats.num_missing_partitions(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Job completed"
            );
            ([(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response()
        }
        Err(err) => {
            let job = request.job.as_deref().unwrap_or_default();
            if err.status_code().is_server_error() {
                error!(job, error = %err, "Job failed");
            } else {
                warn!(job, error = %err, "Rejected job request");
            }
            err.into_response()
        }
    }
}
