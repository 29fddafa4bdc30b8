//! Runs one job end to end: resolve, template, query, translate, write.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use common::query::{BoxError, FlatRow, PartitionStats, QueryClient};

use crate::completeness::write_completeness;
use crate::error::JobError;
use crate::exposition::write_sample;
use crate::job::{Job, JobTable};
use crate::template::render_query;
use crate::translate::RowTranslator;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// Parameters of one scrape.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JobRequest {
    pub job: Option<String>,
    /// Per request deadline; `None` uses the runner's default.
    pub timeout: Option<Duration>,
    /// Template parameters.
    pub params: BTreeMap<String, String>,
}

impl JobRequest {
    pub fn new(job: impl Into<String>) -> Self {
        Self {
            job: Some(job.into()),
            ..Default::default()
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub rows: u64,
    pub samples: u64,
    pub stats: PartitionStats,
}

#[derive(Clone)]
pub struct JobRunner {
    jobs: Arc<JobTable>,
    client: Arc<dyn QueryClient>,
    default_timeout: Duration,
}

impl std::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunner")
            .field("jobs", &self.jobs.names())
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

impl JobRunner {
    pub fn new(jobs: Arc<JobTable>, client: Arc<dyn QueryClient>) -> Self {
        Self {
            jobs,
            client,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Run the requested job and write its exposition text to `out`.
    ///
    /// On error `out` may hold a partial body; callers buffer it and only
    /// send it when the run succeeds.
    #[tracing::instrument(skip(self, out), fields(job = request.job.as_deref().unwrap_or_default()))]
    pub async fn run<W: Write + Send>(
        &self,
        request: &JobRequest,
        out: &mut W,
    ) -> Result<RunSummary, JobError> {
        let name = request
            .job
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or(JobError::MissingParameter)?;
        let job = self
            .jobs
            .get(name)
            .ok_or_else(|| JobError::JobNotFound(name.to_string()))?;

        let query = render_query(job.query(), &request.params)?;
        let timeout = request.timeout.unwrap_or(self.default_timeout);

        match tokio::time::timeout(timeout, self.execute(job, &query, out)).await {
            Ok(result) => result,
            Err(_) => Err(JobError::QueryTimeout(timeout)),
        }
    }

    async fn execute<W: Write + Send>(
        &self,
        job: &Job,
        query: &str,
        out: &mut W,
    ) -> Result<RunSummary, JobError> {
        let result = self
            .client
            .query_values(query, true, &job.value_columns())
            .await?;
        let translator = RowTranslator::new(job, &result.metadata);
        if translator.matched_columns() == 0 {
            tracing::warn!(
                fields = ?result.metadata.field_names,
                "No result column maps to a metric"
            );
        }

        let mut rows = 0u64;
        let mut samples = 0u64;
        let mut on_row = |row: FlatRow| -> Result<bool, BoxError> {
            rows += 1;
            for sample in translator.translate(&row)? {
                write_sample(out, &sample)?;
                samples += 1;
            }
            Ok(true)
        };

        // Any callback failure surfaces as RowTranslation.
        let stats = result.rows.iterate(&mut on_row).await?;

        write_completeness(out, job.name(), &stats, chrono::Utc::now().timestamp_millis())?;

        Ok(RunSummary {
            rows,
            samples,
            stats,
        })
    }
}
