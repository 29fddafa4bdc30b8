//! Record batch to [`FlatRow`] conversion.

use chrono::{DateTime, Utc};
use common::query::{DimValue, FlatRow, TimeUnit};
use datafusion::arrow::array::{Array, ArrayRef, AsArray};
use datafusion::arrow::compute::cast;
use datafusion::arrow::datatypes::{
    DataType, Float64Type, Int64Type, Schema, TimeUnit as ArrowTimeUnit,
};
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::common::ScalarValue;
use datafusion::error::Result;

/// Role of every column in a result schema.
///
/// The time column provides the row timestamp. Numeric columns become value
/// fields in schema order, restricted to `value_columns` when given; every
/// other column is a grouping dimension.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ColumnLayout {
    time: Option<usize>,
    time_unit: TimeUnit,
    fields: Vec<usize>,
    field_names: Vec<String>,
    dims: Vec<(usize, String)>,
}

impl ColumnLayout {
    pub fn new(schema: &Schema, time_column: &str, value_columns: Option<&[&str]>) -> Self {
        let mut layout = Self {
            time: None,
            time_unit: TimeUnit::Millisecond,
            fields: Vec::new(),
            field_names: Vec::new(),
            dims: Vec::new(),
        };

        for (i, field) in schema.fields().iter().enumerate() {
            if layout.time.is_none() && field.name() == time_column {
                if let Some(unit) = timestamp_unit(field.data_type()) {
                    layout.time = Some(i);
                    layout.time_unit = unit;
                    continue;
                }
                log::warn!(
                    "Time column '{}' has unsupported type {}, treating it as a dimension",
                    field.name(),
                    field.data_type()
                );
            }

            let is_value = value_columns
                .is_none_or(|columns| columns.contains(&field.name().as_str()));
            if is_value && field.data_type().is_numeric() {
                layout.fields.push(i);
                layout.field_names.push(field.name().clone());
            } else {
                layout.dims.push((i, field.name().clone()));
            }
        }

        layout
    }

    pub fn time_unit(&self) -> TimeUnit {
        self.time_unit
    }

    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    /// Convert every row of `batch`. Rows without a timestamp get
    /// `default_ts`, which must be in [`Self::time_unit`].
    pub fn rows(&self, batch: &RecordBatch, default_ts: i64) -> Result<Vec<FlatRow>> {
        let time = self
            .time
            .map(|i| cast(batch.column(i), &DataType::Int64))
            .transpose()?;
        let fields = self
            .fields
            .iter()
            .map(|&i| cast(batch.column(i), &DataType::Float64))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        (0..batch.num_rows())
            .map(|row| {
                let ts = match &time {
                    Some(times) if times.is_valid(row) => times.as_primitive::<Int64Type>().value(row),
                    _ => default_ts,
                };
                let values = fields
                    .iter()
                    .map(|values| {
                        if values.is_null(row) {
                            f64::NAN
                        } else {
                            values.as_primitive::<Float64Type>().value(row)
                        }
                    })
                    .collect();
                let key = self
                    .dims
                    .iter()
                    .map(|(i, name)| Ok((name.clone(), dim_value(batch.column(*i), row)?)))
                    .collect::<Result<_>>()?;

                Ok(FlatRow { key, values, ts })
            })
            .collect()
    }
}

fn timestamp_unit(data_type: &DataType) -> Option<TimeUnit> {
    match data_type {
        DataType::Timestamp(ArrowTimeUnit::Second, _) => Some(TimeUnit::Second),
        DataType::Timestamp(ArrowTimeUnit::Millisecond, _) => Some(TimeUnit::Millisecond),
        DataType::Timestamp(ArrowTimeUnit::Microsecond, _) => Some(TimeUnit::Microsecond),
        DataType::Timestamp(ArrowTimeUnit::Nanosecond, _) => Some(TimeUnit::Nanosecond),
        // Plain integers are epoch milliseconds.
        t if t.is_integer() => Some(TimeUnit::Millisecond),
        _ => None,
    }
}

/// `now` expressed in `unit` since the epoch.
pub(crate) fn timestamp_in(now: DateTime<Utc>, unit: TimeUnit) -> i64 {
    match unit {
        TimeUnit::Second => now.timestamp(),
        TimeUnit::Millisecond => now.timestamp_millis(),
        TimeUnit::Microsecond => now.timestamp_micros(),
        TimeUnit::Nanosecond => now.timestamp_nanos_opt().unwrap_or(i64::MAX),
    }
}

fn dim_value(array: &ArrayRef, row: usize) -> Result<DimValue> {
    Ok(scalar_to_dim(ScalarValue::try_from_array(array, row)?))
}

fn scalar_to_dim(scalar: ScalarValue) -> DimValue {
    if scalar.is_null() {
        return DimValue::Null;
    }
    match scalar {
        ScalarValue::Utf8(Some(s))
        | ScalarValue::LargeUtf8(Some(s))
        | ScalarValue::Utf8View(Some(s)) => DimValue::Str(s),
        ScalarValue::Boolean(Some(b)) => DimValue::Bool(b),
        ScalarValue::Int8(Some(v)) => DimValue::Int(v.into()),
        ScalarValue::Int16(Some(v)) => DimValue::Int(v.into()),
        ScalarValue::Int32(Some(v)) => DimValue::Int(v.into()),
        ScalarValue::Int64(Some(v)) => DimValue::Int(v),
        ScalarValue::UInt8(Some(v)) => DimValue::UInt(v.into()),
        ScalarValue::UInt16(Some(v)) => DimValue::UInt(v.into()),
        ScalarValue::UInt32(Some(v)) => DimValue::UInt(v.into()),
        ScalarValue::UInt64(Some(v)) => DimValue::UInt(v),
        ScalarValue::Float32(Some(v)) => DimValue::Float(v.into()),
        ScalarValue::Float64(Some(v)) => DimValue::Float(v),
        ScalarValue::Dictionary(_, inner) => scalar_to_dim(*inner),
        other => DimValue::Str(other.to_string()),
    }
}
