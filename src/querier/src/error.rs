use datafusion::error::DataFusionError;

#[derive(Debug, thiserror::Error)]
pub enum QuerierError {
    #[error("Failed to register table '{table}' from '{path}': {source}")]
    FailedToRegisterTable {
        table: String,
        path: String,
        #[source]
        source: DataFusionError,
    },
}
