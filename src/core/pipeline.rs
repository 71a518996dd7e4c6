use crate::adapters::amc::AmcExtractor;
use crate::adapters::snowflake::SnowflakeConnector;
use crate::config::AppConfig;
use crate::core::loader::WarehouseLoader;
use crate::core::transform::Transformer;
use crate::domain::model::{Credential, LoadOutcome, NormalizedTable};
use crate::domain::ports::{Pipeline, WarehouseConnector};
use crate::utils::error::Result;
use reqwest::Client;

/// AMC → normalized table → Snowflake.
pub struct AmcSnowflakePipeline<W: WarehouseConnector> {
    extractor: AmcExtractor,
    transformer: Transformer,
    loader: WarehouseLoader<W>,
}

impl AmcSnowflakePipeline<SnowflakeConnector> {
    pub fn new(config: &AppConfig) -> Self {
        let client = Client::new();
        let connector = SnowflakeConnector::new(client.clone(), &config.snowflake);
        Self::with_connector(client, config, connector)
    }
}

impl<W: WarehouseConnector> AmcSnowflakePipeline<W> {
    /// Uses `connector` for the warehouse instead of Snowflake.
    pub fn with_connector(client: Client, config: &AppConfig, connector: W) -> Self {
        Self {
            extractor: AmcExtractor::new(client, &config.amc),
            transformer: Transformer::new(),
            loader: WarehouseLoader::new(connector),
        }
    }
}

#[async_trait::async_trait]
impl<W: WarehouseConnector> Pipeline for AmcSnowflakePipeline<W> {
    async fn authenticate(&self) -> Result<Credential> {
        self.extractor.auth().get_token().await
    }

    async fn extract(&self, credential: &Credential, sql: &str) -> Result<String> {
        self.extractor.extract_with(credential, sql).await
    }

    async fn transform(&self, raw: &str) -> Result<NormalizedTable> {
        self.transformer.transform(raw)
    }

    async fn load(&self, table: &NormalizedTable, table_name: &str) -> Result<LoadOutcome> {
        self.loader.load(table, table_name).await
    }
}
