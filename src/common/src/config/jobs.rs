//! Job declarations and the directory-of-files job loader.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Format, Toml, Yaml},
};
use serde::{Deserialize, Serialize};

use super::ConfigError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Counter,
    Gauge,
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricType::Counter => f.write_str("counter"),
            MetricType::Gauge => f.write_str("gauge"),
        }
    }
}

/// A Prometheus series family fed from one result column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricConfig {
    pub name: String,
    #[serde(default)]
    pub help: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    /// Labels added to every sample of this metric, after the ones mapped
    /// from dimensions.
    #[serde(default, alias = "extraLabels", alias = "extralabels")]
    pub extra_labels: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Query template, rendered with the request parameters.
    pub query: String,
    /// Dimensions dropped from the labels.
    #[serde(default, alias = "ignoreDims", alias = "ignoredims")]
    pub ignore_dims: Vec<String>,
    /// Dimension to label renames. Dimensions not listed keep their name.
    #[serde(default, alias = "renameDims", alias = "renamedims")]
    pub rename_dims: BTreeMap<String, String>,
    /// Result column to metric.
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricConfig>,
}

/// Load every `*.toml`, `*.yaml` and `*.yml` file in `dir` as one job named
/// after the file stem.
pub fn load_job_dir(dir: &Path) -> Result<BTreeMap<String, JobConfig>, ConfigError> {
    let read_dir = |source| ConfigError::ReadJobsDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_dir)? {
        let path = entry.map_err(read_dir)?.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut jobs = BTreeMap::new();
    for path in paths {
        let figment = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Figment::from(Toml::file(&path)),
            Some("yaml") | Some("yml") => Figment::from(Yaml::file(&path)),
            _ => {
                log::debug!("Skipping non-job file {}", path.display());
                continue;
            }
        };

        let name = job_name(&path)?;
        let job = figment
            .extract::<JobConfig>()
            .map_err(|source| ConfigError::JobFile {
                path: path.clone(),
                source: Box::new(source),
            })?;

        log::debug!("Loaded job '{name}' from {}", path.display());
        if jobs.insert(name.clone(), job).is_some() {
            return Err(ConfigError::DuplicateJob(name));
        }
    }

    Ok(jobs)
}

fn job_name(path: &Path) -> Result<String, ConfigError> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ConfigError::InvalidJobFileName(PathBuf::from(path)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_config_accepts_camel_case_keys() {
        let yaml = r#"
query: "SELECT * FROM requests"
ignoreDims: [host]
renameDims:
  client_ip: ip
metrics:
  count:
    name: requests_total
    type: counter
    extraLabels:
      source: edge
"#;
        let job: JobConfig = Figment::from(Yaml::string(yaml)).extract().unwrap();

        assert_eq!(job.ignore_dims, vec!["host".to_string()]);
        assert_eq!(job.rename_dims.get("client_ip").unwrap(), "ip");
        let metric = job.metrics.get("count").unwrap();
        assert_eq!(metric.metric_type, MetricType::Counter);
        assert_eq!(metric.help, "");
        assert_eq!(metric.extra_labels.get("source").unwrap(), "edge");
    }

    #[test]
    fn test_unknown_metric_type_is_rejected() {
        let toml = r#"
query = "SELECT 1"
[metrics.latency]
name = "latency"
type = "histogram"
"#;
        let result = Figment::from(Toml::string(toml)).extract::<JobConfig>();
        assert!(result.is_err());
    }

    #[test]
    fn test_load_job_dir_reads_toml_and_yaml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("daily.toml"),
            r#"
query = "SELECT region, count FROM daily"
[metrics.count]
name = "daily_count"
type = "gauge"
"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("hourly.yml"),
            "query: SELECT 1\nignore_dims: [host]\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("README.md"), "not a job").unwrap();

        let jobs = load_job_dir(dir.path()).unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(
            jobs.get("daily").unwrap().metrics.get("count").unwrap().name,
            "daily_count"
        );
        assert_eq!(jobs.get("hourly").unwrap().ignore_dims, vec!["host"]);
    }

    #[test]
    fn test_load_job_dir_rejects_duplicate_stems() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("daily.toml"), "query = \"SELECT 1\"").unwrap();
        std::fs::write(dir.path().join("daily.yaml"), "query: SELECT 2").unwrap();

        let err = load_job_dir(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateJob(name) if name == "daily"));
    }

    #[test]
    fn test_load_job_dir_reports_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.toml"), "ignore_dims = [\"x\"]").unwrap();

        let err = load_job_dir(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::JobFile { .. }));
    }

    #[test]
    fn test_load_job_dir_missing_directory() {
        let err = load_job_dir(Path::new("/nonexistent/query-exporter/jobs")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadJobsDir { .. }));
    }
}
