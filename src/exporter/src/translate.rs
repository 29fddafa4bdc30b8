//! Row to sample translation.

use common::query::{FlatRow, QueryMetadata, TimeUnit};

use crate::job::Job;
use crate::metric::{Labels, MetricDescriptor, Sample};

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("Row has {actual} values but the result has {expected} fields")]
    ValueCountMismatch { expected: usize, actual: usize },
}

/// Translates the rows of one query execution for one job.
///
/// The column to metric lookup is resolved once from the result metadata;
/// every row then fans out into one sample per column that maps to a metric.
#[derive(Debug)]
pub struct RowTranslator<'a> {
    job: &'a Job,
    columns: Vec<Option<&'a MetricDescriptor>>,
    time_unit: TimeUnit,
}

impl<'a> RowTranslator<'a> {
    pub fn new(job: &'a Job, metadata: &QueryMetadata) -> Self {
        let columns = metadata
            .field_names
            .iter()
            .map(|field| job.metric_for_column(field))
            .collect();

        Self {
            job,
            columns,
            time_unit: metadata.time_unit,
        }
    }

    /// Number of result columns that map to a metric.
    pub fn matched_columns(&self) -> usize {
        self.columns.iter().filter(|c| c.is_some()).count()
    }

    /// Labels of `row` after dropping and renaming dimensions.
    pub fn labels(&self, row: &FlatRow) -> Labels {
        row.key
            .iter()
            .filter_map(|(dim, value)| {
                self.job
                    .label_name(dim)
                    .map(|label| (label.to_string(), value.to_string()))
            })
            .collect()
    }

    pub fn translate(&self, row: &FlatRow) -> Result<Vec<Sample<'a>>, TranslateError> {
        if row.values.len() != self.columns.len() {
            return Err(TranslateError::ValueCountMismatch {
                expected: self.columns.len(),
                actual: row.values.len(),
            });
        }

        let labels = self.labels(row);
        let timestamp_ms = self.time_unit.to_millis(row.ts);

        let samples = self
            .columns
            .iter()
            .zip(&row.values)
            .filter_map(|(metric, value)| {
                metric.map(|metric| Sample {
                    metric,
                    labels: labels.clone(),
                    value: *value,
                    timestamp_ms,
                })
            })
            .collect();

        Ok(samples)
    }
}
