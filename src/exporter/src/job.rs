//! Validated job definitions and the job table.

use std::collections::{BTreeMap, HashMap};

use common::config::JobConfig;

use crate::metric::{MetricDescriptor, is_valid_label_name, is_valid_metric_name};

#[derive(Debug, thiserror::Error)]
pub enum JobDefinitionError {
    #[error("Job '{job}' has an empty query")]
    EmptyQuery { job: String },
    #[error("Job '{job}': column '{column}' maps to invalid metric name '{name}'")]
    InvalidMetricName {
        job: String,
        column: String,
        name: String,
    },
    #[error("Job '{job}': invalid label name '{label}' in {location}")]
    InvalidLabelName {
        job: String,
        label: String,
        location: String,
    },
    #[error("Job '{job}': dimension '{dim}' is renamed to '{label}', which column '{column}' already sets as an extra label")]
    ConflictingLabel {
        job: String,
        dim: String,
        label: String,
        column: String,
    },
    #[error("Job '{job}': metric '{name}' is declared with different type or help by columns '{first}' and '{second}'")]
    ConflictingMetric {
        job: String,
        name: String,
        first: String,
        second: String,
    },
    #[error("Job '{job}': columns '{first}' and '{second}' feed the same series of metric '{name}'; give them different extra labels")]
    DuplicateSeries {
        job: String,
        name: String,
        first: String,
        second: String,
    },
}

/// A named query plus the rules turning its rows into samples.
#[derive(Clone, Debug)]
pub struct Job {
    name: String,
    query: String,
    /// Dimension to label name; an empty label name drops the dimension.
    rename_dims: HashMap<String, String>,
    /// Result column to metric.
    metrics: HashMap<String, MetricDescriptor>,
}

impl Job {
    pub fn from_config(name: &str, config: &JobConfig) -> Result<Self, JobDefinitionError> {
        validate(name, config)?;

        let metrics = config
            .metrics
            .iter()
            .map(|(column, metric)| (column.clone(), MetricDescriptor::from(metric)))
            .collect();

        Ok(Self {
            name: name.to_string(),
            query: config.query.clone(),
            rename_dims: fold_ignored_dims(&config.rename_dims, &config.ignore_dims),
            metrics,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Effective rename table, ignored dimensions included as `""`.
    pub fn rename_dims(&self) -> &HashMap<String, String> {
        &self.rename_dims
    }

    /// Label name for `dimension`, or `None` when it is dropped.
    pub fn label_name<'a>(&'a self, dimension: &'a str) -> Option<&'a str> {
        match self.rename_dims.get(dimension) {
            Some(label) if label.is_empty() => None,
            Some(label) => Some(label),
            None => Some(dimension),
        }
    }

    pub fn metric_for_column(&self, column: &str) -> Option<&MetricDescriptor> {
        self.metrics.get(column)
    }

    /// Result columns read as metric values, in sorted order.
    pub fn value_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = self.metrics.keys().map(String::as_str).collect();
        columns.sort_unstable();
        columns
    }
}

/// Fold the ignore list into the rename table as mappings to `""`, so the
/// rename table alone decides whether a dimension is dropped, renamed or
/// kept.
pub fn fold_ignored_dims(
    rename_dims: &BTreeMap<String, String>,
    ignore_dims: &[String],
) -> HashMap<String, String> {
    let mut folded: HashMap<String, String> = rename_dims
        .iter()
        .map(|(dim, label)| (dim.clone(), label.clone()))
        .collect();
    for dim in ignore_dims {
        folded.insert(dim.clone(), String::new());
    }
    folded
}

fn validate(job: &str, config: &JobConfig) -> Result<(), JobDefinitionError> {
    if config.query.trim().is_empty() {
        return Err(JobDefinitionError::EmptyQuery {
            job: job.to_string(),
        });
    }

    for (dim, label) in &config.rename_dims {
        if !label.is_empty() && !is_valid_label_name(label) {
            return Err(JobDefinitionError::InvalidLabelName {
                job: job.to_string(),
                label: label.clone(),
                location: format!("rename of dimension '{dim}'"),
            });
        }
    }

    let mut by_name: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (column, metric) in &config.metrics {
        if !is_valid_metric_name(&metric.name) {
            return Err(JobDefinitionError::InvalidMetricName {
                job: job.to_string(),
                column: column.clone(),
                name: metric.name.clone(),
            });
        }
        if let Some(label) = metric.extra_labels.keys().find(|l| !is_valid_label_name(l)) {
            return Err(JobDefinitionError::InvalidLabelName {
                job: job.to_string(),
                label: label.clone(),
                location: format!("extra labels of column '{column}'"),
            });
        }
        if let Some((dim, label)) = config
            .rename_dims
            .iter()
            .find(|(_, label)| metric.extra_labels.contains_key(label.as_str()))
        {
            return Err(JobDefinitionError::ConflictingLabel {
                job: job.to_string(),
                dim: dim.clone(),
                label: label.clone(),
                column: column.clone(),
            });
        }
        by_name
            .entry(metric.name.as_str())
            .or_default()
            .push(column.as_str());
    }

    // Several columns may feed one metric as long as they agree on its
    // metadata and their series stay distinct.
    for (name, columns) in by_name {
        let (first, rest) = match columns.split_first() {
            Some(split) => split,
            None => continue,
        };
        let reference = &config.metrics[*first];
        for (i, column) in rest.iter().enumerate() {
            let metric = &config.metrics[*column];
            if metric.metric_type != reference.metric_type || metric.help != reference.help {
                return Err(JobDefinitionError::ConflictingMetric {
                    job: job.to_string(),
                    name: name.to_string(),
                    first: first.to_string(),
                    second: column.to_string(),
                });
            }
            let earlier = std::iter::once(first).chain(&rest[..i]);
            for other in earlier {
                if config.metrics[*other].extra_labels == metric.extra_labels {
                    return Err(JobDefinitionError::DuplicateSeries {
                        job: job.to_string(),
                        name: name.to_string(),
                        first: other.to_string(),
                        second: column.to_string(),
                    });
                }
            }
        }
    }

    Ok(())
}

/// Immutable name to [`Job`] table built once at startup.
#[derive(Clone, Debug, Default)]
pub struct JobTable {
    jobs: HashMap<String, Job>,
}

impl JobTable {
    pub fn from_configs(configs: &BTreeMap<String, JobConfig>) -> Result<Self, JobDefinitionError> {
        let jobs = configs
            .iter()
            .map(|(name, config)| Ok((name.clone(), Job::from_config(name, config)?)))
            .collect::<Result<_, JobDefinitionError>>()?;
        Ok(Self { jobs })
    }

    pub fn get(&self, name: &str) -> Option<&Job> {
        self.jobs.get(name)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Job names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.jobs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
