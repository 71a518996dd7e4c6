use crate::adapters::snowflake::SnowflakeConnector;
use crate::adapters::storage::LocalStorage;
use crate::config::AppConfig;
use crate::core::catalog::QueryCatalog;
use crate::core::pipeline::AmcSnowflakePipeline;
use crate::domain::model::{DateRange, EtlRequest, PipelineResult};
use crate::domain::ports::{Pipeline, Storage};
use crate::utils::error::{EtlError, Result};
use std::fmt;
use std::future::Future;
use std::time::Instant;

/// Stages of a run, in order. A failure at any stage ends the run there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Resolving,
    Authenticating,
    Extracting,
    Transforming,
    Loading,
    Done,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Resolving => "Resolving",
            PipelineStage::Authenticating => "Authenticating",
            PipelineStage::Extracting => "Extracting",
            PipelineStage::Transforming => "Transforming",
            PipelineStage::Loading => "Loading",
            PipelineStage::Done => "Done",
        };
        f.write_str(name)
    }
}

async fn run_stage<T, F>(stage: PipelineStage, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tracing::debug!("➡️ {}", stage);
    let started = Instant::now();
    match fut.await {
        Ok(value) => {
            tracing::debug!("{} finished in {:?}", stage, started.elapsed());
            Ok(value)
        }
        Err(e) => {
            tracing::warn!("Pipeline failed while {}: {}", stage, e);
            Err(e)
        }
    }
}

pub struct EtlEngine<S: Storage, P: Pipeline> {
    catalog: QueryCatalog<S>,
    pipeline: P,
}

impl EtlEngine<LocalStorage, AmcSnowflakePipeline<SnowflakeConnector>> {
    /// Production wiring: catalog from the queries directory, AMC source, Snowflake sink.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let storage = LocalStorage::new(config.queries_dir()?);
        Ok(Self::new(
            QueryCatalog::new(storage),
            AmcSnowflakePipeline::new(config),
        ))
    }
}

impl<S: Storage, P: Pipeline> EtlEngine<S, P> {
    pub fn new(catalog: QueryCatalog<S>, pipeline: P) -> Self {
        Self { catalog, pipeline }
    }

    pub async fn run_request(&self, request: &EtlRequest) -> Result<PipelineResult> {
        let query_name = request.query_name.as_deref().unwrap_or_default();
        self.run(query_name, &request.date_range()).await
    }

    /// Runs one job end to end and loads into a table named after the query.
    pub async fn run(&self, query_name: &str, range: &DateRange) -> Result<PipelineResult> {
        if query_name.trim().is_empty() {
            return Err(EtlError::invalid_request("Query name is required"));
        }

        tracing::info!("🚀 Starting ETL process for query: {}", query_name);
        let started = Instant::now();

        let sql = run_stage(
            PipelineStage::Resolving,
            self.catalog.resolve(query_name, range),
        )
        .await?;
        let credential =
            run_stage(PipelineStage::Authenticating, self.pipeline.authenticate()).await?;
        let raw = run_stage(
            PipelineStage::Extracting,
            self.pipeline.extract(&credential, &sql),
        )
        .await?;
        let table = run_stage(PipelineStage::Transforming, self.pipeline.transform(&raw)).await?;
        let load_details = run_stage(
            PipelineStage::Loading,
            self.pipeline.load(&table, query_name),
        )
        .await?;

        // records_processed 以轉換後的筆數為準，不採用倉儲回報的 rows_loaded
        let result = PipelineResult::success(query_name, table.len(), load_details);
        tracing::info!(
            "✅ {}: {} records processed for '{}' in {:?}",
            PipelineStage::Done,
            result.records_processed,
            query_name,
            started.elapsed()
        );
        Ok(result)
    }
}
