//! Partition completeness gauges appended after every job's samples.

use std::io::{self, Write};

use common::query::PartitionStats;
use once_cell::sync::Lazy;

use crate::exposition::write_sample;
use crate::metric::{Labels, MetricDescriptor, MetricType, Sample};

pub static PARTITIONS_TOTAL: Lazy<MetricDescriptor> = Lazy::new(|| {
    MetricDescriptor::new(
        "query_exporter_partitions_total",
        "Number of store partitions consulted by the job's query.",
        MetricType::Gauge,
    )
});

pub static PARTITIONS_MISSING: Lazy<MetricDescriptor> = Lazy::new(|| {
    MetricDescriptor::new(
        "query_exporter_partitions_missing",
        "Number of store partitions that did not answer the job's query.",
        MetricType::Gauge,
    )
});

/// The two completeness samples for `job`, labeled with the job name only.
pub fn completeness_samples(job: &str, stats: &PartitionStats, now_ms: i64) -> [Sample<'static>; 2] {
    let labels = Labels::from([("job".to_string(), job.to_string())]);
    [
        Sample {
            metric: &*PARTITIONS_TOTAL,
            labels: labels.clone(),
            value: stats.num_partitions as f64,
            timestamp_ms: now_ms,
        },
        Sample {
            metric: &*PARTITIONS_MISSING,
            labels,
            value: stats.num_missing_partitions() as f64,
            timestamp_ms: now_ms,
        },
    ]
}

pub fn write_completeness<W: Write + ?Sized>(
    out: &mut W,
    job: &str,
    stats: &PartitionStats,
    now_ms: i64,
) -> io::Result<()> {
    for sample in completeness_samples(job, stats, now_ms) {
        write_sample(out, &sample)?;
    }
    Ok(())
}
