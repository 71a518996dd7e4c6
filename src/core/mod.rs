pub mod catalog;
pub mod etl;
pub mod loader;
pub mod pipeline;
pub mod transform;

pub use crate::domain::model::{
    CellValue, Credential, DateRange, EtlRequest, LoadOutcome, NormalizedTable, PipelineResult,
    QueryDefinition, Row,
};
pub use crate::domain::ports::{Pipeline, Storage, WarehouseConnector, WarehouseSession};
pub use crate::utils::error::Result;
