use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use common::config::{StoreConfig, TableConfig, TableFormat};
use common::query::{
    PartitionStats, QueryClient, QueryError, QueryMetadata, QueryResult, RowCallback, RowIterator,
};
use datafusion::execution::TaskContext;
use datafusion::physical_plan::ExecutionPlan;
use datafusion::prelude::{
    CsvReadOptions, NdJsonReadOptions, ParquetReadOptions, SessionConfig, SessionContext,
};
use futures::StreamExt;

use crate::error::QuerierError;
use crate::rows::{ColumnLayout, timestamp_in};

/// Query client running SQL against tables registered in a DataFusion
/// session.
#[derive(Clone)]
pub struct DataFusionClient {
    session_context: Arc<SessionContext>,
    time_column: String,
}

impl Debug for DataFusionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataFusionClient")
            .field("time_column", &self.time_column)
            .finish_non_exhaustive()
    }
}

impl DataFusionClient {
    /// Build a session and register every configured table.
    pub async fn from_config(config: &StoreConfig) -> Result<Self, QuerierError> {
        let mut session_config = SessionConfig::new();
        if let Some(partitions) = config.target_partitions {
            session_config = session_config.with_target_partitions(partitions);
        }
        let session_context = SessionContext::new_with_config(session_config);

        for table in &config.tables {
            register_table(&session_context, table).await?;
        }

        Ok(Self::from_context(session_context, config.time_column.clone()))
    }

    pub fn from_context(session_context: SessionContext, time_column: impl Into<String>) -> Self {
        Self {
            session_context: Arc::new(session_context),
            time_column: time_column.into(),
        }
    }
}

async fn register_table(ctx: &SessionContext, table: &TableConfig) -> Result<(), QuerierError> {
    let result = match table.format {
        TableFormat::Csv => {
            ctx.register_csv(table.name.as_str(), &table.path, CsvReadOptions::new())
                .await
        }
        TableFormat::Parquet => {
            ctx.register_parquet(table.name.as_str(), &table.path, ParquetReadOptions::default())
                .await
        }
        TableFormat::Json => {
            ctx.register_json(table.name.as_str(), &table.path, NdJsonReadOptions::default())
                .await
        }
    };

    result.map_err(|source| QuerierError::FailedToRegisterTable {
        table: table.name.clone(),
        path: table.path.clone(),
        source,
    })?;

    log::info!(
        "Registered {:?} table '{}' from {}",
        table.format,
        table.name,
        table.path
    );
    Ok(())
}

impl DataFusionClient {
    /// Plan `query`. With `value_columns`, only those numeric columns are
    /// value fields and every other numeric column is a dimension.
    async fn plan(
        &self,
        query: &str,
        fresh: bool,
        value_columns: Option<&[&str]>,
    ) -> Result<QueryResult, QueryError> {
        // Tables are read from their files on every execution, so every
        // query is fresh.
        tracing::debug!(query, fresh, "Planning query");
        let started = chrono::Utc::now();

        let df = self
            .session_context
            .sql(query)
            .await
            .map_err(|e| QueryError::Planning(e.to_string()))?;
        let plan = df
            .create_physical_plan()
            .await
            .map_err(|e| QueryError::Planning(e.to_string()))?;

        let layout = ColumnLayout::new(&plan.schema(), &self.time_column, value_columns);
        let metadata = QueryMetadata {
            field_names: layout.field_names().to_vec(),
            time_unit: layout.time_unit(),
        };
        let default_ts = timestamp_in(started, layout.time_unit());

        Ok(QueryResult {
            metadata,
            rows: Box::new(PartitionedRows {
                plan,
                task_ctx: self.session_context.task_ctx(),
                layout,
                default_ts,
            }),
        })
    }
}

#[async_trait]
impl QueryClient for DataFusionClient {
    /// Every numeric column is a value field.
    async fn query(&self, query: &str, fresh: bool) -> Result<QueryResult, QueryError> {
        self.plan(query, fresh, None).await
    }

    async fn query_values(
        &self,
        query: &str,
        fresh: bool,
        value_columns: &[&str],
    ) -> Result<QueryResult, QueryError> {
        self.plan(query, fresh, Some(value_columns)).await
    }
}

/// Streams a physical plan one output partition at a time.
struct PartitionedRows {
    plan: Arc<dyn ExecutionPlan>,
    task_ctx: Arc<TaskContext>,
    layout: ColumnLayout,
    default_ts: i64,
}

#[async_trait]
impl RowIterator for PartitionedRows {
    async fn iterate(
        self: Box<Self>,
        on_row: &mut RowCallback<'_>,
    ) -> Result<PartitionStats, QueryError> {
        let partition_count = self
            .plan
            .properties()
            .output_partitioning()
            .partition_count();
        let mut stats = PartitionStats::default();

        for partition in 0..partition_count {
            stats.num_partitions += 1;

            let mut stream = match self.plan.execute(partition, self.task_ctx.clone()) {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(partition, error = %e, "Partition failed to start");
                    continue;
                }
            };

            let mut succeeded = true;
            while let Some(batch) = stream.next().await {
                let rows = match batch.and_then(|batch| self.layout.rows(&batch, self.default_ts)) {
                    Ok(rows) => rows,
                    Err(e) => {
                        tracing::warn!(partition, error = %e, "Partition failed");
                        succeeded = false;
                        break;
                    }
                };
                for row in rows {
                    if !on_row(row).map_err(QueryError::Callback)? {
                        stats.num_successful_partitions += 1;
                        return Ok(stats);
                    }
                }
            }

            if succeeded {
                stats.num_successful_partitions += 1;
            }
        }

        Ok(stats)
    }
}
