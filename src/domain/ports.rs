use crate::domain::model::{Credential, LoadOutcome, NormalizedTable};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
}

/// One warehouse connection. Acquired per load and closed before the load returns.
#[async_trait]
pub trait WarehouseSession: Send + Sync {
    /// Bulk-writes `table`, creating `table_name` from the table's columns when `auto_create`.
    async fn write_table(
        &mut self,
        table: &NormalizedTable,
        table_name: &str,
        auto_create: bool,
    ) -> Result<LoadOutcome>;

    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
pub trait WarehouseConnector: Send + Sync {
    type Session: WarehouseSession;

    async fn connect(&self) -> Result<Self::Session>;
}

/// The data-moving stages. Query resolution happens before `authenticate`.
#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn authenticate(&self) -> Result<Credential>;
    async fn extract(&self, credential: &Credential, sql: &str) -> Result<String>;
    async fn transform(&self, raw: &str) -> Result<NormalizedTable>;
    async fn load(&self, table: &NormalizedTable, table_name: &str) -> Result<LoadOutcome>;
}
