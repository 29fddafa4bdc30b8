//! DataFusion backed query client.
//!
//! Tables are registered from local CSV, Parquet or newline delimited JSON
//! files. Each output partition of a query's physical plan counts as one
//! store partition for completeness reporting.

mod client;
mod error;
mod rows;

pub use client::DataFusionClient;
pub use error::QuerierError;
