//! In-memory query clients for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use common::query::{
    FlatRow, PartitionStats, QueryClient, QueryError, QueryMetadata, QueryResult, RowCallback,
    RowIterator,
};

/// Answers every query with the same canned result and records what it
/// was asked.
#[derive(Debug, Default)]
pub struct StaticQueryClient {
    metadata: QueryMetadata,
    rows: Vec<FlatRow>,
    stats: PartitionStats,
    queries: Mutex<Vec<(String, bool)>>,
}

impl StaticQueryClient {
    pub fn new(metadata: QueryMetadata, rows: Vec<FlatRow>, stats: PartitionStats) -> Self {
        Self {
            metadata,
            rows,
            stats,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Queries received so far, with their `fresh` flag.
    pub fn queries(&self) -> Vec<(String, bool)> {
        self.queries
            .lock()
            .map(|queries| queries.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl QueryClient for StaticQueryClient {
    async fn query(&self, query: &str, fresh: bool) -> Result<QueryResult, QueryError> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push((query.to_string(), fresh));
        }
        Ok(QueryResult {
            metadata: self.metadata.clone(),
            rows: Box::new(VecRows {
                rows: self.rows.clone(),
                stats: self.stats,
            }),
        })
    }
}

struct VecRows {
    rows: Vec<FlatRow>,
    stats: PartitionStats,
}

#[async_trait]
impl RowIterator for VecRows {
    async fn iterate(
        self: Box<Self>,
        on_row: &mut RowCallback<'_>,
    ) -> Result<PartitionStats, QueryError> {
        for row in self.rows {
            if !on_row(row).map_err(QueryError::Callback)? {
                break;
            }
        }
        Ok(self.stats)
    }
}

/// Fails every query at planning time.
#[derive(Debug, Default)]
pub struct FailingQueryClient;

#[async_trait]
impl QueryClient for FailingQueryClient {
    async fn query(&self, query: &str, _fresh: bool) -> Result<QueryResult, QueryError> {
        Err(QueryError::Planning(format!("cannot plan '{query}'")))
    }
}

/// Never answers.
#[derive(Debug, Default)]
pub struct StalledQueryClient;

#[async_trait]
impl QueryClient for StalledQueryClient {
    async fn query(&self, _query: &str, _fresh: bool) -> Result<QueryResult, QueryError> {
        std::future::pending().await
    }
}
