use crate::domain::model::{LoadOutcome, NormalizedTable};
use crate::domain::ports::{WarehouseConnector, WarehouseSession};
use crate::utils::error::{EtlError, Result};

fn into_load_failure(err: EtlError) -> EtlError {
    match err {
        EtlError::LoadFailure { .. } => err,
        other => EtlError::load_failure(other),
    }
}

/// Writes a normalized table into the warehouse, one session per load.
pub struct WarehouseLoader<W: WarehouseConnector> {
    connector: W,
}

impl<W: WarehouseConnector> WarehouseLoader<W> {
    pub fn new(connector: W) -> Self {
        Self { connector }
    }

    /// Opens a session, writes `table` into `table_name` (auto-creating it) and closes the
    /// session again. The close runs whether or not the write succeeded, and before any
    /// error is returned.
    pub async fn load(&self, table: &NormalizedTable, table_name: &str) -> Result<LoadOutcome> {
        tracing::info!("💾 Loading data to Snowflake table: {}", table_name);

        let mut session = self.connector.connect().await.map_err(|e| {
            tracing::error!("Snowflake loading error: {}", e);
            into_load_failure(e)
        })?;

        let written = session.write_table(table, table_name, true).await;
        let closed = session.close().await;

        match (written, closed) {
            (Ok(outcome), Ok(())) => {
                tracing::info!(
                    "📦 Loaded {} rows in {} chunks",
                    outcome.rows_loaded,
                    outcome.chunks_processed
                );
                Ok(outcome)
            }
            (Ok(outcome), Err(close_err)) => {
                // 資料已寫入，登出失敗只記錄
                tracing::warn!("Failed to close Snowflake session: {}", close_err);
                Ok(outcome)
            }
            (Err(write_err), closed) => {
                if let Err(close_err) = closed {
                    tracing::warn!("Failed to close Snowflake session: {}", close_err);
                }
                tracing::error!("Snowflake loading error: {}", write_err);
                Err(into_load_failure(write_err))
            }
        }
    }
}
