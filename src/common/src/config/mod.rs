use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml, Yaml},
};

pub mod jobs;

pub use jobs::{JobConfig, MetricConfig, MetricType, load_job_dir};

/// Configuration file read when no path is given on the command line.
pub const DEFAULT_CONFIG_FILE: &str = "query-exporter.toml";

/// Prefix of environment variables overriding configuration keys.
pub const ENV_PREFIX: &str = "QUERY_EXPORTER__";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("Failed to read jobs directory {path}: {source}")]
    ReadJobsDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to load job file {path}: {source}")]
    JobFile {
        path: PathBuf,
        #[source]
        source: Box<figment::Error>,
    },
    #[error("Job file name is not valid UTF-8: {0}")]
    InvalidJobFileName(PathBuf),
    #[error("Job '{0}' is defined more than once")]
    DuplicateJob(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP server binds to
    pub listen_addr: String,
    /// Path serving the exposition output
    pub path: String,
    /// Deadline applied to requests without a usable `timeout` parameter
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: String::from("0.0.0.0:9188"),
            path: String::from("/metrics"),
            default_timeout: Duration::from_secs(3 * 60),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableFormat {
    Csv,
    Parquet,
    Json,
}

/// A table registered with the embedded query backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    /// File or directory holding the table data
    pub path: String,
    pub format: TableFormat,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Column carrying the row timestamp
    pub time_column: String,
    /// Number of partitions each query is split into (backend default if unset)
    pub target_partitions: Option<usize>,
    pub tables: Vec<TableConfig>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            time_column: String::from("_time"),
            target_partitions: None,
            tables: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Configuration {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Query backend configuration
    #[serde(default)]
    pub store: StoreConfig,
    /// Directory with one job definition per file
    #[serde(default)]
    pub jobs_dir: Option<PathBuf>,
    /// Jobs declared inline
    #[serde(default)]
    pub jobs: BTreeMap<String, JobConfig>,
}

impl Configuration {
    /// Load defaults, then `query-exporter.toml` if present, then the
    /// environment.
    pub fn load() -> Result<Self, ConfigError> {
        let figment = Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file(DEFAULT_CONFIG_FILE));
        Self::extract(figment)
    }

    /// Like [`Configuration::load`] but reads `path`, as YAML when it ends in
    /// `.yaml`/`.yml` and as TOML otherwise.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let figment = Figment::from(Serialized::defaults(Configuration::default()));
        let figment = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => figment.merge(Yaml::file(path)),
            _ => figment.merge(Toml::file(path)),
        };
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    /// All job declarations: the inline ones plus those in `jobs_dir`.
    pub fn resolve_jobs(&self) -> Result<BTreeMap<String, JobConfig>, ConfigError> {
        let mut jobs = self.jobs.clone();

        if let Some(dir) = &self.jobs_dir {
            log::info!("Loading jobs from {}", dir.display());
            for (name, job) in load_job_dir(dir)? {
                if jobs.insert(name.clone(), job).is_some() {
                    return Err(ConfigError::DuplicateJob(name));
                }
            }
        }

        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_configuration() {
        let config = Configuration::default();

        assert_eq!(config.server.listen_addr, "0.0.0.0:9188");
        assert_eq!(config.server.path, "/metrics");
        assert_eq!(config.server.default_timeout, Duration::from_secs(180));
        assert_eq!(config.store.time_column, "_time");
        assert!(config.jobs.is_empty());
        assert!(config.jobs_dir.is_none());
    }

    #[test]
    fn test_configless_operation() {
        Jail::expect_with(|_jail| {
            let config = Configuration::load().unwrap();

            assert_eq!(config.server.path, "/metrics");
            assert!(config.resolve_jobs().unwrap().is_empty());
            Ok(())
        });
    }

    #[test]
    fn test_load_embedded_jobs_from_toml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
[server]
listen_addr = "127.0.0.1:9999"
default_timeout = "30s"

[[store.tables]]
name = "requests"
path = "data/requests.csv"
format = "csv"

[jobs.daily]
query = "SELECT region, count FROM requests"
ignore_dims = ["host"]
rename_dims = { client_ip = "ip" }

[jobs.daily.metrics.count]
name = "requests_total"
help = "Requests served"
type = "counter"
extra_labels = { source = "edge" }
"#,
            )?;

            let config = Configuration::load().unwrap();

            assert_eq!(config.server.listen_addr, "127.0.0.1:9999");
            assert_eq!(config.server.default_timeout, Duration::from_secs(30));
            assert_eq!(config.store.tables.len(), 1);
            assert_eq!(config.store.tables[0].format, TableFormat::Csv);

            let daily = config.jobs.get("daily").unwrap();
            assert_eq!(daily.ignore_dims, vec!["host"]);
            assert_eq!(daily.rename_dims.get("client_ip").unwrap(), "ip");
            let metric = daily.metrics.get("count").unwrap();
            assert_eq!(metric.name, "requests_total");
            assert_eq!(metric.metric_type, MetricType::Counter);
            Ok(())
        });
    }

    #[test]
    fn test_load_from_yaml_path() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "exporter.yml",
                r#"
server:
  path: /export
jobs:
  hourly:
    query: "SELECT 1"
    ignoredims: [host]
"#,
            )?;

            let config = Configuration::load_from_path(Path::new("exporter.yml")).unwrap();

            assert_eq!(config.server.path, "/export");
            assert_eq!(config.jobs.get("hourly").unwrap().ignore_dims, vec!["host"]);
            Ok(())
        });
    }

    #[test]
    fn test_env_var_override() {
        Jail::expect_with(|jail| {
            jail.set_env("QUERY_EXPORTER__SERVER__LISTEN_ADDR", "127.0.0.1:1234");
            jail.set_env("QUERY_EXPORTER__STORE__TIME_COLUMN", "ts");

            let config = Configuration::load().unwrap();

            assert_eq!(config.server.listen_addr, "127.0.0.1:1234");
            assert_eq!(config.store.time_column, "ts");
            Ok(())
        });
    }

    #[test]
    fn test_resolve_jobs_merges_jobs_dir() {
        Jail::expect_with(|jail| {
            std::fs::create_dir(jail.directory().join("jobs")).unwrap();
            jail.create_file("jobs/hourly.toml", "query = \"SELECT 2\"")?;
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
jobs_dir = "jobs"

[jobs.daily]
query = "SELECT 1"
"#,
            )?;

            let config = Configuration::load().unwrap();
            let jobs = config.resolve_jobs().unwrap();

            assert_eq!(jobs.len(), 2);
            assert_eq!(jobs.get("daily").unwrap().query, "SELECT 1");
            assert_eq!(jobs.get("hourly").unwrap().query, "SELECT 2");
            Ok(())
        });
    }

    #[test]
    fn test_resolve_jobs_rejects_job_defined_twice() {
        Jail::expect_with(|jail| {
            std::fs::create_dir(jail.directory().join("jobs")).unwrap();
            jail.create_file("jobs/daily.toml", "query = \"SELECT 2\"")?;
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
jobs_dir = "jobs"

[jobs.daily]
query = "SELECT 1"
"#,
            )?;

            let config = Configuration::load().unwrap();
            let err = config.resolve_jobs().unwrap_err();

            assert!(matches!(err, ConfigError::DuplicateJob(name) if name == "daily"));
            Ok(())
        });
    }
}
