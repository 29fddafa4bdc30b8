use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};

use super::HttpState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    /// Names of the configured jobs.
    pub jobs: Vec<String>,
}

pub async fn health_handler(State(state): State<HttpState>) -> (StatusCode, Json<HealthResponse>) {
    let uptime = state.service_start_time.elapsed().as_secs();

    let response = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        jobs: state
            .runner
            .jobs()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect(),
    };

    (StatusCode::OK, Json(response))
}
