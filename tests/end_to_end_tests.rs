//! Scrapes served from CSV tables through the DataFusion backend.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use common::config::{
    JobConfig, MetricConfig, MetricType, StoreConfig, TableConfig, TableFormat,
};
use exporter::http::{HttpState, create_router};
use exporter::{JobRunner, JobTable};
use querier::DataFusionClient;
use tower::ServiceExt;

fn write_requests_csv(dir: &Path) -> String {
    let path = dir.join("requests.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "_time,region,host,status,hits,bytes").unwrap();
    writeln!(file, "1000,eu,web-1,200,3,100").unwrap();
    writeln!(file, "1000,us,web-2,500,4,200").unwrap();
    writeln!(file, "2000,eu,web-1,200,5,300").unwrap();
    path.to_string_lossy().into_owned()
}

fn metric(name: &str, metric_type: MetricType, help: &str) -> MetricConfig {
    MetricConfig {
        name: name.to_string(),
        help: help.to_string(),
        metric_type,
        extra_labels: BTreeMap::new(),
    }
}

fn jobs() -> JobTable {
    let by_region = JobConfig {
        query: "SELECT MAX(_time) AS _time, region, SUM(hits) AS hits, SUM(bytes) AS bytes \
                FROM requests WHERE region = '{{ region }}' GROUP BY region"
            .to_string(),
        ignore_dims: Vec::new(),
        rename_dims: [("region".to_string(), "zone".to_string())].into(),
        metrics: [
            (
                "hits".to_string(),
                metric("requests_total", MetricType::Counter, "Requests served"),
            ),
            (
                "bytes".to_string(),
                metric("bytes_sent", MetricType::Gauge, "Bytes sent"),
            ),
        ]
        .into(),
    };
    let per_host = JobConfig {
        query: "SELECT _time, region, host, hits FROM requests WHERE _time = 1000".to_string(),
        ignore_dims: vec!["host".to_string()],
        rename_dims: BTreeMap::new(),
        metrics: [(
            "hits".to_string(),
            metric("hits", MetricType::Gauge, ""),
        )]
        .into(),
    };
    let by_status = JobConfig {
        query: "SELECT status, SUM(hits) AS hits FROM requests GROUP BY status".to_string(),
        ignore_dims: Vec::new(),
        rename_dims: BTreeMap::new(),
        metrics: [(
            "hits".to_string(),
            metric("hits", MetricType::Gauge, ""),
        )]
        .into(),
    };
    let configs = [
        ("by_region".to_string(), by_region),
        ("per_host".to_string(), per_host),
        ("by_status".to_string(), by_status),
    ]
    .into();
    JobTable::from_configs(&configs).unwrap()
}

async fn router(dir: &Path) -> axum::Router {
    let store = StoreConfig {
        time_column: "_time".to_string(),
        target_partitions: Some(2),
        tables: vec![TableConfig {
            name: "requests".to_string(),
            path: write_requests_csv(dir),
            format: TableFormat::Csv,
        }],
    };
    let client = DataFusionClient::from_config(&store).await.unwrap();
    let runner = JobRunner::new(Arc::new(jobs()), Arc::new(client));
    create_router(HttpState::new(Arc::new(runner)), "/metrics")
}

async fn scrape(router: axum::Router, uri: &str) -> (StatusCode, String) {
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

fn sample_lines(body: &str) -> Vec<&str> {
    body.lines().filter(|line| !line.starts_with('#')).collect()
}

#[tokio::test]
async fn test_templated_aggregate_job() {
    let dir = tempfile::tempdir().unwrap();
    let (status, body) = scrape(router(dir.path()).await, "/metrics?job=by_region&region=eu").await;

    assert_eq!(status, StatusCode::OK);
    let samples = sample_lines(&body);
    assert!(samples.contains(&"requests_total{zone=\"eu\"} 8.000000 2000"));
    assert!(samples.contains(&"bytes_sent{zone=\"eu\"} 400.000000 2000"));
    assert!(body.contains("# HELP requests_total Requests served\n# TYPE requests_total counter\n"));
    assert!(!body.contains("zone=\"us\""));

    let total = samples
        .iter()
        .find(|line| line.starts_with("query_exporter_partitions_total{job=\"by_region\"}"))
        .unwrap();
    assert!(!total.starts_with("query_exporter_partitions_total{job=\"by_region\"} 0.000000"));
    assert!(samples.iter().any(|line| line
        .starts_with("query_exporter_partitions_missing{job=\"by_region\"} 0.000000 ")));
}

#[tokio::test]
async fn test_ignored_dimensions_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let (status, body) = scrape(router(dir.path()).await, "/metrics?job=per_host").await;

    assert_eq!(status, StatusCode::OK);
    let samples = sample_lines(&body);
    assert!(samples.contains(&"hits{region=\"eu\"} 3.000000 1000"));
    assert!(samples.contains(&"hits{region=\"us\"} 4.000000 1000"));
    assert!(!body.contains("web-1"));
    assert!(!body.contains("host="));
}

#[tokio::test]
async fn test_integer_grouping_column_is_a_label() {
    let dir = tempfile::tempdir().unwrap();
    let (status, body) = scrape(router(dir.path()).await, "/metrics?job=by_status").await;

    assert_eq!(status, StatusCode::OK);
    let samples: Vec<&str> = sample_lines(&body)
        .into_iter()
        .filter(|line| line.starts_with("hits"))
        .collect();
    assert_eq!(samples.len(), 2);
    assert!(samples.iter().any(|line| line.starts_with("hits{status=\"200\"} 8.000000 ")));
    assert!(samples.iter().any(|line| line.starts_with("hits{status=\"500\"} 4.000000 ")));
}

#[tokio::test]
async fn test_undefined_template_parameter_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (status, body) = scrape(router(dir.path()).await, "/metrics?job=by_region&day=1").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "failed to run job");
}

#[tokio::test]
async fn test_unknown_and_missing_job() {
    let dir = tempfile::tempdir().unwrap();
    let router = router(dir.path()).await;

    let (status, body) = scrape(router.clone(), "/metrics?job=nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "job not found");

    let (status, body) = scrape(router, "/metrics").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "job not specified");
}
