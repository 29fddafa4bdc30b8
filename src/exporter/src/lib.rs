//! Translation of query results into the Prometheus text exposition format.
//!
//! A [`runner::JobRunner`] resolves a named [`job::Job`], renders its query
//! template, runs the query through an injected
//! [`common::query::QueryClient`], turns every result row into samples and
//! writes them out, followed by the partition completeness gauges.

pub mod completeness;
pub mod error;
pub mod exposition;
pub mod http;
pub mod job;
pub mod metric;
pub mod runner;
pub mod template;
pub mod translate;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::JobError;
pub use job::{Job, JobTable};
pub use runner::{JobRequest, JobRunner, RunSummary};
