pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
#[cfg(feature = "server")]
pub mod http;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::CliConfig;

pub use adapters::{LocalStorage, SnowflakeConnector};
pub use config::AppConfig;
pub use core::{
    catalog::QueryCatalog, etl::EtlEngine, loader::WarehouseLoader,
    pipeline::AmcSnowflakePipeline, transform::Transformer,
};
pub use utils::error::{EtlError, Result};
