//! Contract between the exporter and the query backend.
//!
//! A backend hands back a [`QueryResult`]: the column layout of the result
//! set plus a [`RowIterator`] that pushes one [`FlatRow`] at a time into a
//! caller-supplied callback. Once iteration finishes the iterator reports
//! how many of the store's partitions answered.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Per-row callback. `Ok(true)` asks for the next row, `Ok(false)` stops
/// iteration, `Err` aborts it.
pub type RowCallback<'a> = dyn FnMut(FlatRow) -> Result<bool, BoxError> + Send + 'a;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Query planning failed: {0}")]
    Planning(String),
    #[error("Query execution failed: {0}")]
    Execution(String),
    #[error("Row callback failed: {0}")]
    Callback(#[source] BoxError),
}

/// Unit of the integer timestamps carried by [`FlatRow::ts`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TimeUnit {
    Second,
    #[default]
    Millisecond,
    Microsecond,
    Nanosecond,
}

impl TimeUnit {
    pub fn to_millis(self, ts: i64) -> i64 {
        match self {
            TimeUnit::Second => ts.saturating_mul(1_000),
            TimeUnit::Millisecond => ts,
            TimeUnit::Microsecond => ts / 1_000,
            TimeUnit::Nanosecond => ts / 1_000_000,
        }
    }
}

/// Scalar value of one dimension in a row's grouping key.
#[derive(Clone, Debug, PartialEq)]
pub enum DimValue {
    Str(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for DimValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DimValue::Str(s) => f.write_str(s),
            DimValue::Int(v) => write!(f, "{v}"),
            DimValue::UInt(v) => write!(f, "{v}"),
            DimValue::Float(v) => write_float(f, *v),
            DimValue::Bool(v) => write!(f, "{v}"),
            DimValue::Null => Ok(()),
        }
    }
}

/// Shortest round-trip form, switching to an exponent below 1e-4 and from
/// 1e21 upwards (`1e+21`, `1.5e-07`).
fn write_float(f: &mut fmt::Formatter<'_>, v: f64) -> fmt::Result {
    if v.is_nan() {
        return f.write_str("NaN");
    }
    if v.is_infinite() {
        return f.write_str(if v > 0.0 { "+Inf" } else { "-Inf" });
    }
    if v == 0.0 {
        return write!(f, "{v}");
    }

    let scientific = format!("{v:e}");
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some((mantissa, exponent)) => (mantissa, exponent.parse::<i32>().unwrap_or_default()),
        None => return write!(f, "{v}"),
    };
    if (-4..21).contains(&exponent) {
        write!(f, "{v}")
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        write!(f, "{mantissa}e{sign}{:02}", exponent.unsigned_abs())
    }
}

impl From<&str> for DimValue {
    fn from(value: &str) -> Self {
        DimValue::Str(value.to_string())
    }
}

impl From<String> for DimValue {
    fn from(value: String) -> Self {
        DimValue::Str(value)
    }
}

impl From<i64> for DimValue {
    fn from(value: i64) -> Self {
        DimValue::Int(value)
    }
}

impl From<u64> for DimValue {
    fn from(value: u64) -> Self {
        DimValue::UInt(value)
    }
}

impl From<f64> for DimValue {
    fn from(value: f64) -> Self {
        DimValue::Float(value)
    }
}

impl From<bool> for DimValue {
    fn from(value: bool) -> Self {
        DimValue::Bool(value)
    }
}

/// One row of a query result: grouping key, values aligned with
/// [`QueryMetadata::field_names`], and a timestamp in
/// [`QueryMetadata::time_unit`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlatRow {
    pub key: BTreeMap<String, DimValue>,
    pub values: Vec<f64>,
    pub ts: i64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryMetadata {
    pub field_names: Vec<String>,
    pub time_unit: TimeUnit,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PartitionStats {
    pub num_partitions: u64,
    pub num_successful_partitions: u64,
}

impl PartitionStats {
    pub fn num_missing_partitions(&self) -> u64 {
        self.num_partitions
            .saturating_sub(self.num_successful_partitions)
    }
}

pub struct QueryResult {
    pub metadata: QueryMetadata,
    pub rows: Box<dyn RowIterator>,
}

impl fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryResult")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait RowIterator: Send {
    /// Drive `on_row` over every row and return the partition stats of the
    /// execution. An error from `on_row` is returned as
    /// [`QueryError::Callback`].
    async fn iterate(
        self: Box<Self>,
        on_row: &mut RowCallback<'_>,
    ) -> Result<PartitionStats, QueryError>;
}

/// A query backend shared by all concurrent requests.
#[async_trait]
pub trait QueryClient: Send + Sync {
    /// Plan `query` and return its metadata and row iterator. `fresh`
    /// asks the backend to bypass cached or stale partial results.
    async fn query(&self, query: &str, fresh: bool) -> Result<QueryResult, QueryError>;

    /// Like [`QueryClient::query`], naming the result columns the caller
    /// reads as values. Backends that derive column roles from the result
    /// schema report only these as fields and keep every other column,
    /// numeric ones included, as a dimension. The default ignores the hint.
    async fn query_values(
        &self,
        query: &str,
        fresh: bool,
        value_columns: &[&str],
    ) -> Result<QueryResult, QueryError> {
        let _ = value_columns;
        self.query(query, fresh).await
    }
}
